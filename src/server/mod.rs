//! HTTP surface: listener, routing, admission, and admin handlers.

mod admin;
mod listener;
mod middleware;
mod response;
mod router;

pub use listener::{Server, ServerError};
pub use middleware::{client_id_from_request, AdmissionControl};
pub use router::Router;
