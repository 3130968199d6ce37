//! RabbitMQ management HTTP API broker client.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use proto::{BrokerError, Envelope, ReceivedBatch, ReceivedMessage};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Broker, decode_payload, encode_envelope};

const DEFAULT_VHOST: &str = "/";
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Connection settings for the management API.
#[derive(Debug, Clone)]
pub struct RabbitMqConfig {
    /// Management API root, e.g. `http://rabbitmq:15672`.
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Exchange that messages are published to.
    pub exchange: String,
    pub vhost: String,
    pub timeout: Duration,
}

impl RabbitMqConfig {
    /// Settings for `http://{host}:{port}` with the default vhost and timeout.
    pub fn new(
        host: &str,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        exchange: impl Into<String>,
    ) -> Self {
        Self {
            base_url: format!("http://{host}:{port}"),
            username: username.into(),
            password: password.into(),
            exchange: exchange.into(),
            vhost: DEFAULT_VHOST.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

// ── Request types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    properties: serde_json::Map<String, serde_json::Value>,
    routing_key: &'a str,
    payload: String,
    payload_encoding: &'static str,
}

#[derive(Debug, Serialize)]
struct GetRequest {
    count: u32,
    encoding: &'static str,
    ackmode: &'static str,
}

// ── Response types ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PublishResponse {
    routed: bool,
}

#[derive(Debug, Deserialize)]
struct GetMessage {
    payload: String,
    #[serde(default)]
    payload_encoding: String,
    message_count: u64,
}

// ── Client ─────────────────────────────────────────────────────────────────────

/// Broker backed by the RabbitMQ management plugin's HTTP API.
pub struct RabbitMqBroker {
    client: reqwest::Client,
    config: RabbitMqConfig,
}

impl RabbitMqBroker {
    /// Builds a client whose every call is bounded by `config.timeout`.
    pub fn new(config: RabbitMqConfig) -> Result<Self, BrokerError> {
        Url::parse(&config.base_url)
            .map_err(|e| BrokerError::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RabbitMqConfig {
        &self.config
    }

    /// Appends percent-encoded path segments to the API root.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BrokerError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| BrokerError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| BrokerError::InvalidUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post<B: Serialize>(&self, url: Url, body: &B) -> Result<String, BrokerError> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        debug!(status = %status.as_u16(), "Broker response received");

        if !status.is_success() {
            let preview: String = body.chars().take(500).collect();
            return Err(BrokerError::Status {
                status: status.as_u16(),
                body: preview,
            });
        }
        Ok(body)
    }

    fn transport_error(&self, e: reqwest::Error) -> BrokerError {
        if e.is_timeout() {
            BrokerError::Timeout(self.config.timeout.as_secs())
        } else {
            BrokerError::Connection(e.to_string())
        }
    }
}

#[async_trait]
impl Broker for RabbitMqBroker {
    async fn publish(&self, queue: &str, envelope: &Envelope) -> Result<bool, BrokerError> {
        let url = self.endpoint(&[
            "api",
            "exchanges",
            self.config.vhost.as_str(),
            self.config.exchange.as_str(),
            "publish",
        ])?;
        let request = PublishRequest {
            properties: serde_json::Map::new(),
            routing_key: queue,
            payload: encode_envelope(envelope)?,
            payload_encoding: "string",
        };
        debug!(queue, exchange = %self.config.exchange, "Publishing to broker");

        let body = self.post(url, &request).await?;
        let response: PublishResponse = serde_json::from_str(&body)
            .map_err(|e| BrokerError::InvalidResponse(format!("{e}; body: {body}")))?;
        Ok(response.routed)
    }

    async fn fetch(&self, queue: &str, count: u32) -> Result<ReceivedBatch, BrokerError> {
        let url = self.endpoint(&["api", "queues", self.config.vhost.as_str(), queue, "get"])?;
        let request = GetRequest {
            count,
            encoding: "auto",
            ackmode: "ack_requeue_false",
        };
        debug!(queue, count, "Fetching from broker");

        let body = self.post(url, &request).await?;
        let messages: Vec<GetMessage> = serde_json::from_str(&body).map_err(|e| {
            BrokerError::InvalidResponse(format!(
                "{e}; body: {}",
                body.chars().take(200).collect::<String>()
            ))
        })?;

        let remaining = messages.last().map_or(0, |m| m.message_count);
        let received = messages.iter().map(decode_message).collect();
        Ok(ReceivedBatch {
            received,
            remaining,
        })
    }
}

/// Decodes one `get` item; `auto` encoding falls back to base64 for binary payloads.
///
/// Binary payloads that are not UTF-8 text are passed through in their base64 form.
fn decode_message(message: &GetMessage) -> ReceivedMessage {
    if message.payload_encoding != "base64" {
        return decode_payload(&message.payload);
    }
    let text = base64::engine::general_purpose::STANDARD
        .decode(&message.payload)
        .map_err(|e| e.to_string())
        .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()));
    match text {
        Ok(text) => decode_payload(&text),
        Err(e) => {
            warn!(error = %e, "Fetched a binary payload, passing it through as base64");
            ReceivedMessage::Raw(Value::String(message.payload.clone()))
        }
    }
}
