//! Session error types.

use thiserror::Error;

/// Errors raised by session access and session stores.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The update has no derivable session key.
    #[error("cannot access session data because this update does not belong to a session key")]
    KeyUnavailable,

    /// No session middleware bound this property on the context.
    #[error("session property `{0}` is not installed")]
    NotInstalled(String),

    /// A store failed to load or persist a record.
    #[error("session store error: {0}")]
    Store(String),

    /// Filesystem error from a file-backed store.
    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be (de)serialized.
    #[error("session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Creates a store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
