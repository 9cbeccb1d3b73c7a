//! Error types for store access and synchronization.

use std::fmt;

use thiserror::Error;

/// Which side of a relationship could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    From,
    To,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::From => write!(f, "From"),
            Endpoint::To => write!(f, "To"),
        }
    }
}

/// Main error type for doccache graph operations.
#[derive(Error, Debug)]
pub enum DoccacheError {
    #[error("Dgraph request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Dgraph returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Dgraph error: {0}")]
    Store(String),

    #[error("Schema update rejected: {0}")]
    Schema(String),

    #[error("Invalid predicate name: '{0}'")]
    InvalidPredicate(String),

    #[error(
        "{endpoint} node of the relationship: [Edge: {name}, From: {from}, To: {to}] does not exist, Delete Op: {delete}"
    )]
    MissingEndpoint {
        endpoint: Endpoint,
        name: String,
        from: String,
        to: String,
        delete: bool,
    },

    #[error("Failed to decode store response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Model(#[from] doccache_core::ModelError),
}

/// Result type for doccache graph operations.
pub type DoccacheResult<T> = Result<T, DoccacheError>;

impl DoccacheError {
    /// Create a store error from any message.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}
