//! Setup-time errors for the weft framework.
//!
//! These are raised while a chain is being assembled, never during
//! dispatch. Dispatch-time violations are [`weft_core::DispatchError`]s.

use thiserror::Error;

/// Errors raised while building routers and registering scenes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    /// A route or handler group was registered without any middleware.
    #[error("handlers cannot be empty")]
    EmptyHandlers,

    /// A scene was registered without a usable id.
    #[error("unsupported scene: {reason}")]
    InvalidScene {
        /// Why the scene was rejected.
        reason: String,
    },

    /// A scene id was registered twice on one stage.
    #[error("scene already registered: {0}")]
    DuplicateScene(String),
}

impl SetupError {
    /// Creates an invalid scene error.
    pub fn invalid_scene(reason: impl Into<String>) -> Self {
        Self::InvalidScene {
            reason: reason.into(),
        }
    }
}

/// Result type for setup operations.
pub type SetupResult<T> = Result<T, SetupError>;
