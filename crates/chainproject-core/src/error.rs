//! Error types for the projection pipeline.

use thiserror::Error;

/// Errors that can occur while projecting an event.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Payload does not match layout '{layout}': {reason}")]
    SchemaMismatch { layout: String, reason: String },

    #[error("Unique constraint violated on '{table}' for key {key}")]
    UniqueConstraintViolation { table: String, key: String },

    #[error("No '{table}' row for key {key}")]
    MissingReferencedEntity { table: String, key: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid event '{event}': {reason}")]
    InvalidEvent { event: String, reason: String },

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Unknown status code {0}")]
    UnknownStatus(u64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Projection aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl ProjectionError {
    /// Returns `true` for transient failures that must be retried with the same event.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Returns `true` if the caller can recover by switching to update semantics.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UniqueConstraintViolation { .. })
    }

    pub fn field(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(ProjectionError::StoreUnavailable("timeout".into()).is_retryable());
        assert!(!ProjectionError::StoreUnavailable("timeout".into()).is_recoverable());

        let dup = ProjectionError::UniqueConstraintViolation {
            table: "RFPPool".into(),
            key: "chainId=1|poolId=7".into(),
        };
        assert!(dup.is_recoverable());
        assert!(!dup.is_retryable());

        let mismatch = ProjectionError::SchemaMismatch {
            layout: "RFPSimple.Initialize".into(),
            reason: "buffer overrun".into(),
        };
        assert!(!mismatch.is_retryable());
        assert!(!mismatch.is_recoverable());
    }
}
