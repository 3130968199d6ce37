//! Gateway core: credentials, queue registry, schema validation, broker
//! client, and the per-request orchestrator that composes them.

pub mod broker;
pub mod credentials;
pub mod orchestrator;
pub mod registry;
pub mod validator;

/// Broker interface and its RabbitMQ / in-memory implementations.
pub use broker::{Broker, InMemoryBroker, RabbitMqBroker, RabbitMqConfig};
/// Credential store and user records.
pub use credentials::{AdminOverride, CredentialStore, User, UserEntry, digest_password};
/// Request pipeline entry point and its result types.
pub use orchestrator::{Credentials, Gateway, Health, Limits, QueueInfo, SendOutcome};
/// Queue registry types.
pub use registry::{Queue, QueueEntry, QueueListing, QueueRegistry};
