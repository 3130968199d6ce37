use std::path::PathBuf;

use thiserror::Error;

use crate::permission::Permission;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading/validation error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Request pipeline error.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Broker transport error.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors, raised at startup only.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field was not provided.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Filesystem read error.
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error.
    #[error("YAML parse error in {}: {reason}", path.display())]
    Yaml { path: PathBuf, reason: String },

    /// JSON parse error.
    #[error("JSON parse error in {}: {reason}", path.display())]
    Json { path: PathBuf, reason: String },

    /// A queue schema could not be compiled.
    #[error("Invalid JSON schema for queue '{queue}': {reason}")]
    InvalidSchema { queue: String, reason: String },

    /// Two queues share a name.
    #[error("Duplicate queue name: {0}")]
    DuplicateQueue(String),

    /// Two users share a username.
    #[error("Duplicate username: {0}")]
    DuplicateUser(String),

    /// A user lists permissions outside `send`, `receive`, `list`.
    #[error("User '{username}' has unknown permissions: {}", permissions.join(", "))]
    UnknownPermissions {
        username: String,
        permissions: Vec<String>,
    },
}

/// Broker transport errors
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker did not answer within the configured timeout.
    #[error("Broker request timed out after {0}s")]
    Timeout(u64),

    /// Network/connection-level failure.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The broker answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The broker answer could not be decoded.
    #[error("Invalid response from broker: {0}")]
    InvalidResponse(String),

    /// An envelope could not be encoded.
    #[error("Failed to encode envelope: {0}")]
    Encode(String),

    /// The broker endpoint could not be turned into a request URL.
    #[error("Invalid broker URL: {0}")]
    InvalidUrl(String),
}

/// Payload errors detected before any broker call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// Request body is empty.
    #[error("no data")]
    Empty,

    /// Request body exceeds the configured maximum.
    #[error("max content length is {max}")]
    TooLarge { max: usize },

    /// Request body is not JSON.
    #[error("{0}")]
    Malformed(String),

    /// Request body is JSON but neither an object nor a list of objects.
    #[error("{0}")]
    WrongShape(&'static str),

    /// Receive `count` is not an integer within bounds.
    #[error("{0}")]
    InvalidCount(String),
}

/// Errors surfaced by the request pipeline to the HTTP dispatcher.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or invalid credentials.
    #[error("Authentication failed")]
    Authentication,

    /// Valid user without the required capability.
    #[error("User '{username}' lacks '{permission}' permission")]
    Authorization {
        username: String,
        permission: Permission,
    },

    /// Requested queue is not configured.
    #[error("queue '{0}' is not configured")]
    QueueNotFound(String),

    /// Request body shape or size error.
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    /// Message rejected by the queue schema.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Broker accepted the publish but routed it nowhere.
    #[error("Message to '{queue}' was not routed")]
    NotRouted { queue: String },

    /// Broker unreachable, non-2xx, or timed out.
    #[error("Transport failure: {0}")]
    Transport(#[from] BrokerError),
}
