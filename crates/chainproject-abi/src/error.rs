use thiserror::Error;

/// Errors raised while building ABI payloads from values.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Expected {expected} values, got {got}")]
    Arity { expected: usize, got: usize },
}
