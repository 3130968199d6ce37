//! HTTP Basic credential extraction.

use axum::http::HeaderMap;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Basic};
use gateway::Credentials;

/// Realm advertised in `WWW-Authenticate` on 401 responses.
pub const AUTH_REALM: &str = "Authentication Required";

/// Reads `Authorization: Basic ...`; anything else counts as no credentials.
pub fn basic_credentials(headers: &HeaderMap) -> Option<Credentials> {
    let Authorization(basic) = headers.typed_get::<Authorization<Basic>>()?;
    Some(Credentials::new(basic.username(), basic.password()))
}

/// Value of the `WWW-Authenticate` challenge header.
pub fn challenge() -> String {
    format!("Basic realm=\"{AUTH_REALM}\"")
}
