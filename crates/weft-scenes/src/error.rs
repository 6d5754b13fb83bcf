//! Scene error types.

use thiserror::Error;
use weft_session::SessionError;

/// Errors raised by scene access and scene transitions.
#[derive(Debug, Error)]
pub enum SceneError {
    /// `enter` was called with an id no scene is registered under.
    #[error("can't find scene: {0}")]
    NotFound(String),

    /// Scene access outside of a stage.
    #[error("scene access requires a stage in the chain")]
    StageNotInstalled,

    /// Wizard access outside of a wizard scene.
    #[error("wizard access requires an active wizard scene")]
    WizardNotActive,

    /// The session backing the stage is missing or unusable.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
