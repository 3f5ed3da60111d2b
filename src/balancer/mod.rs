//! Backend pool management and balancing strategies.

mod backend;
mod core;
pub mod strategy;

pub use backend::Backend;
pub use core::LoadBalancer;

use thiserror::Error;

/// Errors produced by the balancer core and its strategies.
#[derive(Debug, Error)]
pub enum BalancerError {
    #[error("no backends available")]
    NoBackends,

    #[error("no healthy backends available")]
    NoHealthyBackends,

    #[error("unknown balancing strategy: {0}")]
    UnknownStrategy(String),

    #[error("invalid backend URL for '{id}': {source}")]
    InvalidBackendUrl {
        id: String,
        #[source]
        source: hyper::http::uri::InvalidUri,
    },

    #[error("no enabled backends configured")]
    NoEnabledBackends,
}
