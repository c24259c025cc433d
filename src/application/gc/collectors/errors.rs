use thiserror::Error;

use crate::application::ports::RepositoryError;

/// Errors that abort a whole collector run
///
/// Per-item failures never surface here; they are recorded in the
/// collector's result and the sweep moves on.
#[derive(Debug, Error)]
pub enum GcError {
    /// Candidate query against the authoritative store failed
    #[error("Failed to query for collection candidates: {source}")]
    QueryError {
        #[from]
        source: RepositoryError,
    },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

/// Result type for GC operations
pub type GcResult<T> = Result<T, GcError>;

impl GcError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }
}
