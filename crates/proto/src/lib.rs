//! Shared protocol types for the gateway core, HTTP dispatcher, and CLI.
//!
//! This crate defines the serializable envelope/batch structures and the
//! strongly-typed error enums shared across the workspace.

pub mod error;
pub mod message;
pub mod permission;

/// Re-export of all protocol error types.
pub use error::*;
/// Re-export of envelope, batch and queue selector types.
pub use message::{Envelope, QueueName, ReceivedBatch, ReceivedMessage};
/// Re-export of the capability enum.
pub use permission::Permission;
