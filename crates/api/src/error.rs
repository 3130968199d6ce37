//! Mapping of pipeline errors to JSON HTTP responses.

use axum::{
    Json,
    http::{StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use proto::{GatewayError, PayloadError};
use serde_json::{Value, json};
use tracing::debug;

use crate::auth;

/// Broker-calling endpoint an error came from; picks the transport failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Send,
    Receive,
}

impl Action {
    fn transport_message(self) -> &'static str {
        match self {
            Action::Send => "routing failed",
            Action::Receive => "failed to receive from queue",
        }
    }
}

/// A [`GatewayError`] ready to be rendered as `{"error", "description"?}`.
///
/// Errors from endpoints that never reach the broker carry no [`Action`].
#[derive(Debug)]
pub struct ApiError {
    error: GatewayError,
    action: Option<Action>,
}

impl ApiError {
    pub fn new(error: GatewayError, action: Action) -> Self {
        Self {
            error,
            action: Some(action),
        }
    }

    pub fn error(&self) -> &GatewayError {
        &self.error
    }

    /// Status code and JSON body for this error.
    pub fn parts(&self) -> (StatusCode, Value) {
        match &self.error {
            GatewayError::Authentication | GatewayError::Authorization { .. } => {
                (StatusCode::UNAUTHORIZED, json!({"error": "unauthorized"}))
            }
            GatewayError::QueueNotFound(name) => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "queue not found",
                    "description": format!("queue '{name}' is not configured"),
                }),
            ),
            GatewayError::Payload(payload) => payload_parts(payload),
            GatewayError::Validation(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({"error": "invalid message", "description": message}),
            ),
            GatewayError::NotRouted { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "not routed"}),
            ),
            GatewayError::Transport(_) => {
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                let message = self
                    .action
                    .map(Action::transport_message)
                    .or(status.canonical_reason())
                    .unwrap_or_default();
                (status, json!({"error": message}))
            }
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        Self {
            error,
            action: None,
        }
    }
}

fn payload_parts(error: &PayloadError) -> (StatusCode, Value) {
    match error {
        PayloadError::Empty => (StatusCode::BAD_REQUEST, json!({"error": "no data"})),
        PayloadError::TooLarge { .. } => (
            StatusCode::PAYLOAD_TOO_LARGE,
            json!({"error": "content too long", "description": error.to_string()}),
        ),
        PayloadError::Malformed(reason) => (
            StatusCode::BAD_REQUEST,
            json!({"error": "malformed JSON", "description": reason}),
        ),
        PayloadError::WrongShape(description) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"error": "wrong JSON format", "description": description}),
        ),
        PayloadError::InvalidCount(description) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"error": "invalid count", "description": description}),
        ),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.parts();
        debug!(status = %status.as_u16(), error = %self.error, "Request failed");

        if status == StatusCode::UNAUTHORIZED {
            return (
                status,
                [(WWW_AUTHENTICATE, auth::challenge())],
                Json(body),
            )
                .into_response();
        }
        (status, Json(body)).into_response()
    }
}
