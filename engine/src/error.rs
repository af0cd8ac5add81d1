//! Error types for the metasync engine.

use crate::Id;
use thiserror::Error;

/// All possible errors from the metasync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Retrieval errors abort the enclosing fetch atomically
    #[error("page request failed for {endpoint}: {message}")]
    Retrieval { endpoint: String, message: String },

    // Raised only where a write failure cannot be folded into an outcome
    #[error("bulk write failed: {0}")]
    Write(String),

    #[error("tracker import rejected: {0}")]
    ImportFailed(String),

    #[error("invalid rule set: {0}")]
    RuleSet(String),

    #[error("stage schema not found: {0}")]
    StageNotFound(Id),

    #[error("report output failed: {0}")]
    Report(String),
}

impl Error {
    /// Build a retrieval error for a collection endpoint.
    pub fn retrieval(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Retrieval {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
