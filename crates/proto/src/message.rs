use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Queue selector taken from the request path.
///
/// Routes without a `{name}` segment (`/send`, `/receive`, `/info`) target the
/// registry's default queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum QueueName {
    /// The registry's default queue.
    #[default]
    Default,
    /// A queue addressed by exact name.
    Named(String),
}

impl QueueName {
    /// Returns the explicit name, if any.
    pub fn as_named(&self) -> Option<&str> {
        match self {
            QueueName::Default => None,
            QueueName::Named(name) => Some(name),
        }
    }
}

impl From<Option<String>> for QueueName {
    fn from(name: Option<String>) -> Self {
        name.map_or(QueueName::Default, QueueName::Named)
    }
}

impl From<&str> for QueueName {
    fn from(name: &str) -> Self {
        QueueName::Named(name.to_string())
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueName::Default => f.write_str("<default>"),
            QueueName::Named(name) => f.write_str(name),
        }
    }
}

/// Broker-bound record wrapping a user message with routing/audit metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Target queue name.
    pub queue: String,
    /// The caller's message, unchanged.
    pub message: Value,
    /// Authenticated username of the sender.
    pub sender: String,
    /// Unix timestamp (seconds) taken at send time.
    pub ts: i64,
}

impl Envelope {
    /// Wraps `message` for `queue`, stamped with `sent_at`.
    pub fn new(
        queue: impl Into<String>,
        message: Value,
        sender: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            queue: queue.into(),
            message,
            sender: sender.into(),
            ts: sent_at.timestamp(),
        }
    }
}

/// One message pulled from a queue.
///
/// Queues can hold messages published around the gateway, so a payload that
/// is not an envelope is passed through as plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReceivedMessage {
    /// A message published through the gateway.
    Envelope(Envelope),
    /// Any other payload, decoded as JSON or kept as a string.
    Raw(Value),
}

impl ReceivedMessage {
    /// The envelope, when the payload was one.
    pub fn as_envelope(&self) -> Option<&Envelope> {
        match self {
            ReceivedMessage::Envelope(envelope) => Some(envelope),
            ReceivedMessage::Raw(_) => None,
        }
    }

    /// The caller's message for envelopes, the whole payload otherwise.
    pub fn message(&self) -> &Value {
        match self {
            ReceivedMessage::Envelope(envelope) => &envelope.message,
            ReceivedMessage::Raw(value) => value,
        }
    }
}

impl From<Envelope> for ReceivedMessage {
    fn from(envelope: Envelope) -> Self {
        ReceivedMessage::Envelope(envelope)
    }
}

/// Messages pulled from a queue in one receive call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReceivedBatch {
    /// Messages in broker order.
    pub received: Vec<ReceivedMessage>,
    /// Queue depth reported by the broker after this batch was removed.
    pub remaining: u64,
}

impl ReceivedBatch {
    /// An empty batch from a drained queue.
    pub fn empty() -> Self {
        Self::default()
    }
}
