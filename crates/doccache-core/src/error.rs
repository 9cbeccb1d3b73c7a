//! Error types for the document model.

use thiserror::Error;

/// Errors raised while turning chain input into storage documents.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Document hash is empty")]
    MissingHash,

    #[error("Invalid timestamp in {field}: '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("Invalid content '{label}': {reason}")]
    InvalidContent { label: String, reason: String },
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

impl ModelError {
    /// Create an invalid timestamp error.
    pub fn timestamp(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            field,
            value: value.into(),
        }
    }
}
