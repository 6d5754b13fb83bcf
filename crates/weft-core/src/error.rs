//! Unified error types for the weft core.
//!
//! Middleware results use [`BoxError`] so handlers can propagate any error
//! with `?`. Contract violations raised by the dispatch machinery itself are
//! [`DispatchError`]s and can be recovered with `downcast_ref`.

use thiserror::Error;

/// A type-erased error, as carried through every middleware chain.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The outcome of running one middleware unit.
pub type MiddlewareResult = Result<(), BoxError>;

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Contract violations detected while a chain is being dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// A unit invoked its continuation more than once in the same dispatch.
    #[error("next() called multiple times")]
    NextCalledMultipleTimes,

    /// A continuation was invoked with a context from another dispatch.
    #[error("next(ctx) called with invalid context")]
    InvalidContext,

    /// A lookup resolved to no middleware.
    #[error("handler is undefined")]
    HandlerUndefined,
}

impl DispatchError {
    /// Returns the dispatch error wrapped in `err`, if it is one.
    pub fn find(err: &BoxError) -> Option<&DispatchError> {
        err.downcast_ref::<DispatchError>()
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for outbound API calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No transport is attached to the context.
    #[error("bot is not connected")]
    NotConnected,
    /// The update has no chat to reply to.
    #[error("update does not belong to a chat")]
    MissingChat,
    /// The remote API rejected the call.
    #[error("API error ({code}): {description}")]
    Rejected { code: i64, description: String },
    /// Failed to serialize/deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for outbound API calls.
pub type ApiResult<T> = Result<T, ApiError>;
