//! Runtime error types.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while building or running a runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// `build()` was called without an error handler.
    #[error("runtime requires an error handler")]
    MissingErrorHandler,

    /// `build()` was called without an outbound capability.
    #[error("runtime requires an outbound capability")]
    MissingOutbound,

    /// A dispatch ran past its deadline and was dropped.
    #[error("dispatch timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
