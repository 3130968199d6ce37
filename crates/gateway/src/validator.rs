//! Per-queue JSON-Schema validation of inbound messages.

use proto::{ConfigError, GatewayError};
use serde_json::Value;

/// A queue's schema document together with its compiled validator.
pub struct QueueSchema {
    document: Value,
    validator: jsonschema::Validator,
}

impl QueueSchema {
    /// Compiles `document` once; the draft is taken from `$schema` when present.
    pub fn compile(queue: &str, document: Value) -> Result<Self, ConfigError> {
        let validator =
            jsonschema::validator_for(&document).map_err(|e| ConfigError::InvalidSchema {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            document,
            validator,
        })
    }

    /// The schema as configured.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Checks `message`, reporting the first failing constraint.
    pub fn validate(&self, message: &Value) -> Result<(), GatewayError> {
        self.validator
            .validate(message)
            .map_err(|error| GatewayError::Validation(error.to_string()))
    }
}

impl std::fmt::Debug for QueueSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSchema")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

/// Validates `message` against an optional schema; no schema accepts anything.
pub fn validate(schema: Option<&QueueSchema>, message: &Value) -> Result<(), GatewayError> {
    match schema {
        Some(schema) => schema.validate(message),
        None => Ok(()),
    }
}
