//! axum router: one thin handler per endpoint, all work delegated to [`Gateway`].

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use gateway::Gateway;
use proto::{PayloadError, QueueName};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::auth::basic_credentials;
use crate::error::{Action, ApiError};

/// Shared handler state.
pub struct AppState {
    pub gateway: Gateway,
}

/// Router options taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct RouterOptions {
    /// Path prefix all routes are nested under, e.g. `/dolesa`.
    pub url_prefix: Option<String>,
}

/// Normalizes a configured prefix to `/segment[/segment]`; empty or `/` means none.
pub fn normalize_prefix(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}

/// Builds the full application router.
pub fn router(gateway: Gateway, options: &RouterOptions) -> Router {
    let body_limit = gateway.limits().max_content_length;
    let state = Arc::new(AppState { gateway });

    let routes = Router::new()
        .route("/queues", get(list_queues))
        .route("/queues/{name}", get(named_queue_info))
        .route("/queues/{name}/send", post(named_send))
        .route("/queues/{name}/receive", post(named_receive))
        .route("/info", get(default_queue_info))
        .route("/send", post(default_send))
        .route("/receive", post(default_receive))
        .route("/health", get(health))
        .with_state(state);

    let app = match options.url_prefix.as_deref().and_then(normalize_prefix) {
        Some(prefix) => Router::new().nest(&prefix, routes),
        None => routes,
    };

    app.fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

// ─── Handlers ──────────────────────────────────────────────

async fn list_queues(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let credentials = basic_credentials(&headers);
    match state.gateway.list_queues(credentials.as_ref()) {
        Ok(listing) => Json(listing).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn named_queue_info(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    queue_info(&state, QueueName::Named(name), &headers)
}

async fn default_queue_info(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    queue_info(&state, QueueName::Default, &headers)
}

fn queue_info(state: &AppState, name: QueueName, headers: &HeaderMap) -> Response {
    let credentials = basic_credentials(headers);
    match state.gateway.queue_info(credentials.as_ref(), &name) {
        Ok(info) => Json(info).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn named_send(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    send(&state, QueueName::Named(name), &headers, body).await
}

async fn default_send(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    send(&state, QueueName::Default, &headers, body).await
}

async fn send(
    state: &AppState,
    name: QueueName,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let credentials = basic_credentials(headers);
    let max = state.gateway.limits().max_content_length;
    let body = body.map_err(|rejection| body_error(rejection, max));

    match state
        .gateway
        .send(
            credentials.as_ref(),
            &name,
            body.as_deref().map_err(PayloadError::clone),
        )
        .await
    {
        Ok(outcome) => (StatusCode::ACCEPTED, Json(outcome)).into_response(),
        Err(e) => ApiError::new(e, Action::Send).into_response(),
    }
}

async fn named_receive(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    receive(&state, QueueName::Named(name), &headers, body).await
}

async fn default_receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    receive(&state, QueueName::Default, &headers, body).await
}

async fn receive(
    state: &AppState,
    name: QueueName,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let credentials = basic_credentials(headers);
    let max = state.gateway.limits().max_content_length;
    let body = body.map_err(|rejection| body_error(rejection, max));

    match state
        .gateway
        .receive(
            credentials.as_ref(),
            &name,
            body.as_deref().map_err(PayloadError::clone),
        )
        .await
    {
        Ok(batch) => Json(batch).into_response(),
        Err(e) => ApiError::new(e, Action::Receive).into_response(),
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    Json(state.gateway.health()).into_response()
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response()
}

fn body_error(rejection: BytesRejection, max: usize) -> PayloadError {
    debug!(status = %rejection.status(), "Request body rejected");
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PayloadError::TooLarge { max }
    } else {
        PayloadError::Malformed(rejection.body_text())
    }
}
