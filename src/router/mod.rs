// src/router/mod.rs
mod matcher;
mod pattern;

pub use matcher::RouteMatcher;
pub use pattern::PathPattern;
