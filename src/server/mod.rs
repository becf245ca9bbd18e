pub mod admin;
pub mod builder;
pub mod handler;
pub mod listener;

pub use admin::AdminHandler;
pub use builder::ServerBuilder;
pub use handler::RequestHandler;

use std::net::SocketAddr;

/// Remote address of the connection a request arrived on, stored in the
/// request extensions by `ServerBuilder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);
