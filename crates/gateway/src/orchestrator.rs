//! Per-request pipeline: authenticate, authorize, resolve, validate, call the broker.

use std::sync::Arc;

use chrono::Utc;
use proto::{Envelope, GatewayError, PayloadError, Permission, QueueName, ReceivedBatch};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::credentials::{CredentialStore, User};
use crate::registry::{Queue, QueueListing, QueueRegistry};

/// Default `max_content_length` in bytes.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 4096;
/// Default upper bound for a receive `count`.
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 1000;
/// Messages fetched when the request names no `count`.
pub const DEFAULT_RECEIVE_COUNT: u32 = 1;

/// HTTP Basic credentials taken from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Request limits enforced before the broker is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest accepted send body, in bytes.
    pub max_content_length: usize,
    /// Largest accepted receive `count`.
    pub max_receive_count: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
        }
    }
}

/// Body of the queue schema endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueInfo {
    pub queue: String,
    /// `{}` when the queue has no schema.
    pub schema: Value,
}

/// Body of a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub routed: usize,
}

/// Body of the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
}

/// Composes credential store, queue registry and broker for each request.
///
/// Holds no per-request state; cloning shares the same read-only contents.
#[derive(Clone)]
pub struct Gateway {
    credentials: Arc<CredentialStore>,
    queues: Arc<QueueRegistry>,
    broker: Arc<dyn Broker>,
    limits: Limits,
}

impl Gateway {
    pub fn new(
        credentials: CredentialStore,
        queues: QueueRegistry,
        broker: Arc<dyn Broker>,
        limits: Limits,
    ) -> Self {
        Self {
            credentials: Arc::new(credentials),
            queues: Arc::new(queues),
            broker,
            limits,
        }
    }

    pub fn queues(&self) -> &QueueRegistry {
        &self.queues
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Authenticates `credentials` and checks for `required`.
    ///
    /// Runs before any queue lookup so that permission failures look the same
    /// whether or not the queue exists.
    pub fn authorize(
        &self,
        credentials: Option<&Credentials>,
        required: Permission,
    ) -> Result<&User, GatewayError> {
        let Some(credentials) = credentials else {
            debug!("Request without credentials");
            return Err(GatewayError::Authentication);
        };
        let user = self
            .credentials
            .authenticate(&credentials.username, &credentials.password)?;
        user.require(required)?;
        Ok(user)
    }

    /// `GET /queues`
    pub fn list_queues(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<QueueListing, GatewayError> {
        self.authorize(credentials, Permission::List)?;
        Ok(self.queues.list())
    }

    /// `GET /queues/{name}` and `GET /info`
    pub fn queue_info(
        &self,
        credentials: Option<&Credentials>,
        name: &QueueName,
    ) -> Result<QueueInfo, GatewayError> {
        self.authorize(credentials, Permission::Send)?;
        let queue = self.queues.resolve(name)?;
        Ok(QueueInfo {
            queue: queue.name().to_string(),
            schema: queue
                .schema()
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default())),
        })
    }

    /// `POST /queues/{name}/send` and `POST /send`
    ///
    /// `body` is `Err` when the dispatcher already refused to buffer it.
    /// Messages are validated and published one at a time in submission
    /// order; the first failure stops the batch and earlier messages stay
    /// published.
    pub async fn send(
        &self,
        credentials: Option<&Credentials>,
        name: &QueueName,
        body: Result<&[u8], PayloadError>,
    ) -> Result<SendOutcome, GatewayError> {
        let user = self.authorize(credentials, Permission::Send)?;
        let queue = self.queues.resolve(name)?;

        let body = body?;
        if body.is_empty() {
            return Err(PayloadError::Empty.into());
        }
        if body.len() > self.limits.max_content_length {
            return Err(PayloadError::TooLarge {
                max: self.limits.max_content_length,
            }
            .into());
        }
        let messages = split_messages(body)?;

        let sent_at = Utc::now();
        for (position, message) in messages.iter().enumerate() {
            if let Err(e) = queue.validate(message) {
                warn!(queue = %queue.name(), position, error = %e, "Message rejected by schema");
                return Err(e);
            }
            let envelope = Envelope::new(queue.name(), message.clone(), user.username(), sent_at);
            self.publish(queue, &envelope).await?;
        }

        info!(
            queue = %queue.name(),
            sender = %user.username(),
            count = messages.len(),
            "Messages routed"
        );
        Ok(SendOutcome {
            routed: messages.len(),
        })
    }

    /// `POST /queues/{name}/receive` and `POST /receive`
    ///
    /// `body` is `Err` when the dispatcher refused to buffer it; the request
    /// fails rather than falling back to the default count.
    pub async fn receive(
        &self,
        credentials: Option<&Credentials>,
        name: &QueueName,
        body: Result<&[u8], PayloadError>,
    ) -> Result<ReceivedBatch, GatewayError> {
        let user = self.authorize(credentials, Permission::Receive)?;
        let queue = self.queues.resolve(name)?;
        let count = parse_count(body?, self.limits.max_receive_count)?;

        let batch = self.broker.fetch(queue.name(), count).await.map_err(|e| {
            error!(queue = %queue.name(), error = %e, "Failed to receive from queue");
            GatewayError::from(e)
        })?;
        debug!(
            queue = %queue.name(),
            receiver = %user.username(),
            received = batch.received.len(),
            remaining = batch.remaining,
            "Messages received"
        );
        Ok(batch)
    }

    /// `GET /health`
    pub fn health(&self) -> Health {
        Health { status: "running" }
    }

    async fn publish(&self, queue: &Queue, envelope: &Envelope) -> Result<(), GatewayError> {
        let routed = self
            .broker
            .publish(queue.name(), envelope)
            .await
            .map_err(|e| {
                error!(queue = %queue.name(), error = %e, "Routing failed");
                GatewayError::from(e)
            })?;
        if routed {
            Ok(())
        } else {
            error!(queue = %queue.name(), "Broker did not route message");
            Err(GatewayError::NotRouted {
                queue: queue.name().to_string(),
            })
        }
    }
}

/// Accepts a JSON object or a list of objects.
fn split_messages(body: &[u8]) -> Result<Vec<Value>, PayloadError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| PayloadError::Malformed(e.to_string()))?;
    match value {
        Value::Object(_) => Ok(vec![value]),
        Value::Array(items) if items.iter().all(Value::is_object) => Ok(items),
        Value::Array(_) => Err(PayloadError::WrongShape(
            "JSON list must contain only objects",
        )),
        _ => Err(PayloadError::WrongShape(
            "JSON data must be either object or list",
        )),
    }
}

/// Reads `count` from an optional JSON object body.
///
/// A missing or unparseable body means the default count.
fn parse_count(body: &[u8], max: u32) -> Result<u32, PayloadError> {
    let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(body) else {
        return Ok(DEFAULT_RECEIVE_COUNT);
    };
    match fields.get("count") {
        None | Some(Value::Null) => Ok(DEFAULT_RECEIVE_COUNT),
        Some(value) => value
            .as_u64()
            .filter(|count| (1..=u64::from(max)).contains(count))
            .and_then(|count| u32::try_from(count).ok())
            .ok_or_else(|| {
                PayloadError::InvalidCount(format!(
                    "count must be an integer between 1 and {max}, got {value}"
                ))
            }),
    }
}
