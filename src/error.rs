// ⚠️ Error types for the comparison core
//
// The core returns typed errors so the presentation layer can tell a store
// outage apart from a bad request. Tooling (import, coverage, demo) wraps
// these in anyhow with context.

use thiserror::Error;

/// Result type for comparison operations
pub type CompareResult<T> = Result<T, CompareError>;

#[derive(Debug, Error)]
pub enum CompareError {
    /// The store could not be opened or queried. Never retried, never masked.
    #[error("stream store unavailable: {0}")]
    StoreUnavailable(#[from] rusqlite::Error),

    /// A date string was not `YYYY-MM-DD` or `MM/DD/YYYY`
    #[error("malformed date '{input}': expected YYYY-MM-DD or MM/DD/YYYY")]
    MalformedDate { input: String },

    /// The store holds no stream rows at all
    #[error("stream store contains no rows")]
    EmptyStore,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CompareError {
    pub fn malformed_date(input: impl Into<String>) -> Self {
        CompareError::MalformedDate {
            input: input.into(),
        }
    }

    /// True when the caller sent something unusable (as opposed to an outage)
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            CompareError::MalformedDate { .. } | CompareError::InvalidArgument(_)
        )
    }
}
