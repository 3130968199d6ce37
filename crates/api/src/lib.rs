//! HTTP dispatcher for the gateway: routing, Basic auth extraction and
//! error-to-JSON mapping.

pub mod auth;
pub mod error;
pub mod routes;
pub mod server;

pub use error::{Action, ApiError};
pub use routes::{AppState, RouterOptions, normalize_prefix, router};
pub use server::ApiServer;
