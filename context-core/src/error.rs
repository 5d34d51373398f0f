//! Error taxonomy for the context retrieval engine (see spec §7).

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the engine, independent of transport.
///
/// `ValidationError` and `ReadOnlyError` are always raised before any I/O
/// happens; `StorageError`/`RetrievalError` carry operator-actionable
/// remediation text so a human can fix the deployment rather than just
/// seeing "it failed".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("engine is in read-only mode: {0}")]
    ReadOnly(String),

    #[error("storage error: {message} (solution: {solution})")]
    Storage { message: String, solution: String },

    #[error("retrieval error: {message} (solution: {solution})")]
    Retrieval { message: String, solution: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a `ValidationError` from a message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Build a `ReadOnlyError` for the named operation.
    pub fn read_only(operation: impl Into<String>) -> Self {
        Error::ReadOnly(operation.into())
    }

    /// Build a `StorageError` carrying operator guidance.
    pub fn storage(message: impl Into<String>, solution: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
            solution: solution.into(),
        }
    }

    /// Build a `RetrievalError` carrying operator guidance.
    pub fn retrieval(message: impl Into<String>, solution: impl Into<String>) -> Self {
        Error::Retrieval {
            message: message.into(),
            solution: solution.into(),
        }
    }

    /// Whether this error is safe for a caller to retry with backoff.
    ///
    /// `ValidationError` and `ReadOnlyError` are never retryable: retrying
    /// without changing the request repeats the same rejection.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Storage { .. } | Error::Retrieval { .. } | Error::Io(_))
    }

    /// The `solution` field described in §7, if this error carries one.
    #[must_use]
    pub fn solution(&self) -> Option<&str> {
        match self {
            Error::Storage { solution, .. } | Error::Retrieval { solution, .. } => Some(solution),
            _ => None,
        }
    }
}
