//! Error types for the pgrest translation layer

use thiserror::Error;

use crate::types::DatabaseError;

/// pgrest error types
#[derive(Error, Debug)]
pub enum Error {
    // Parse Errors
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Invalid limit parameter: {0}")]
    InvalidLimit(String),

    #[error("Invalid offset parameter: {0}")]
    InvalidOffset(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid select: {0}")]
    InvalidSelect(String),

    #[error("Invalid logic tree: {0}")]
    InvalidLogicalTree(String),

    // Execution Errors
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Unstructured failure reported by the executor. `stack` carries
    /// whatever trace the engine attached, if any.
    #[error("{message}")]
    Query {
        message: String,
        stack: Option<String>,
    },

    // General Errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for pgrest operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Unstructured executor failure without a trace
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            stack: None,
        }
    }

    /// True for errors raised while parsing the request itself
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownOperator(_)
                | Self::InvalidLimit(_)
                | Self::InvalidOffset(_)
                | Self::InvalidFilter(_)
                | Self::InvalidSelect(_)
                | Self::InvalidLogicalTree(_)
        )
    }
}
