//! Reverse proxying to upstream backends.

mod reverse_proxy;

pub use reverse_proxy::{ProxyBody, ReverseProxy};
