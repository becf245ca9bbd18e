//
// src/proxy/mod.rs
//
mod error;
mod forward;
mod proxy;

pub use error::GatewayError;
pub use forward::{ClientContext, ForwardError, Forwarder, UpstreamRequest};
pub use proxy::{Proxy, ProxyBuilder};
