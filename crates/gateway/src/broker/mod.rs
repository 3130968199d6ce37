//! Broker client interface and implementations.
//!
//! The gateway talks to the broker through [`Broker`]: one publish per
//! message (routing key = queue name) and one pull per receive request with
//! automatic acknowledgement.

pub mod memory;
pub mod rabbitmq;

use async_trait::async_trait;
use proto::{BrokerError, Envelope, ReceivedBatch, ReceivedMessage};
use serde_json::Value;
use tracing::warn;

pub use memory::InMemoryBroker;
pub use rabbitmq::{RabbitMqBroker, RabbitMqConfig};

/// Publish/fetch operations the gateway needs from a broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes `envelope` with `queue` as routing key.
    ///
    /// Returns whether the broker routed the message to at least one queue.
    async fn publish(&self, queue: &str, envelope: &Envelope) -> Result<bool, BrokerError>;

    /// Removes up to `count` messages from `queue`.
    async fn fetch(&self, queue: &str, count: u32) -> Result<ReceivedBatch, BrokerError>;
}

/// Compact JSON encoding of an envelope, as stored in the broker.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, BrokerError> {
    serde_json::to_string(envelope).map_err(|e| BrokerError::Encode(e.to_string()))
}

/// Decodes a stored payload.
///
/// Fetched messages are already acknowledged, so nothing here fails: a
/// payload that is not an envelope comes back as raw JSON, or as a JSON
/// string when it is not JSON at all.
pub fn decode_payload(payload: &str) -> ReceivedMessage {
    if let Ok(envelope) = serde_json::from_str::<Envelope>(payload) {
        return ReceivedMessage::Envelope(envelope);
    }
    let preview: String = payload.chars().take(200).collect();
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => {
            warn!(payload = %preview, "Fetched a payload that is not an envelope");
            ReceivedMessage::Raw(value)
        }
        Err(e) => {
            warn!(error = %e, payload = %preview, "Fetched a payload that is not JSON");
            ReceivedMessage::Raw(Value::String(payload.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    #[test]
    fn decode_reverses_encode() {
        let envelope = Envelope::new("default", json!({"n": [1, 2]}), "admin", Utc::now());
        let encoded = encode_envelope(&envelope).expect("encode");
        assert_eq!(decode_payload(&encoded), ReceivedMessage::Envelope(envelope));
    }

    #[test]
    fn foreign_json_payloads_pass_through() {
        assert_eq!(
            decode_payload(r#"{"hello": "world"}"#),
            ReceivedMessage::Raw(json!({"hello": "world"}))
        );
        // Missing `ts`.
        assert_eq!(
            decode_payload(r#"{"queue":"q","message":1,"sender":"s"}"#),
            ReceivedMessage::Raw(json!({"queue": "q", "message": 1, "sender": "s"}))
        );
    }

    #[test]
    fn non_json_payloads_come_back_as_strings() {
        assert_eq!(
            decode_payload("plain text"),
            ReceivedMessage::Raw(json!("plain text"))
        );
    }
}
