//! Scene definitions.
//!
//! A [`Scene`] is a named group of handlers that only runs while the scene
//! is active, plus two sub-chains run on transitions:
//!
//! - **enter** handlers run when the scene is entered (with an inert
//!   continuation),
//! - **leave** handlers run when it is left.
//!
//! ```rust,ignore
//! let mut greeter = Scene::new("greeter").ttl_secs(300);
//! greeter
//!     .on_enter(reply("What's your name?"))
//!     .on_leave(reply("Bye!"));
//! greeter.composer_mut().on("text", remember_name);
//!
//! stage.register(greeter)?;
//! ```
//!
//! Registration snapshots a scene into a [`RegisteredScene`]; it cannot
//! change afterwards.

use std::sync::Arc;

use weft_core::{BoxedMiddleware, IntoMiddleware};
use weft_framework::{Composer, SetupError, SetupResult};

// =============================================================================
// RegisteredScene
// =============================================================================

/// An immutable scene as held by a stage.
pub struct RegisteredScene {
    pub(crate) id: String,
    pub(crate) ttl_secs: Option<u64>,
    pub(crate) enter: BoxedMiddleware,
    pub(crate) leave: BoxedMiddleware,
    pub(crate) handler: BoxedMiddleware,
}

impl RegisteredScene {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The scene's own TTL, overriding the stage's.
    pub fn ttl_secs(&self) -> Option<u64> {
        self.ttl_secs
    }

    /// The chain run while the scene is active.
    pub fn handler(&self) -> &BoxedMiddleware {
        &self.handler
    }
}

impl std::fmt::Debug for RegisteredScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredScene")
            .field("id", &self.id)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

/// Conversion into a registrable scene.
///
/// Conversion validates the definition, so a malformed scene is rejected
/// when it is registered rather than when it is first entered.
pub trait IntoScene {
    fn into_scene(self) -> SetupResult<Arc<RegisteredScene>>;
}

impl IntoScene for Arc<RegisteredScene> {
    fn into_scene(self) -> SetupResult<Arc<RegisteredScene>> {
        Ok(self)
    }
}

pub(crate) fn validate_id(id: &str) -> SetupResult<()> {
    if id.trim().is_empty() {
        return Err(SetupError::invalid_scene("scene id cannot be empty"));
    }
    Ok(())
}

// =============================================================================
// Scene
// =============================================================================

/// A named conversation state with enter and leave handlers.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    id: String,
    ttl_secs: Option<u64>,
    enter: Composer,
    leave: Composer,
    body: Composer,
}

impl Scene {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sets how long the scene stays active without being re-entered.
    pub fn ttl_secs(mut self, secs: u64) -> Self {
        self.ttl_secs = Some(secs);
        self
    }

    /// Adds an enter handler.
    pub fn on_enter(&mut self, unit: impl IntoMiddleware) -> &mut Self {
        self.enter.push(unit);
        self
    }

    /// Adds a leave handler.
    pub fn on_leave(&mut self, unit: impl IntoMiddleware) -> &mut Self {
        self.leave.push(unit);
        self
    }

    /// Adds a handler run while the scene is active.
    pub fn push(&mut self, unit: impl IntoMiddleware) -> &mut Self {
        self.body.push(unit);
        self
    }

    /// Returns the composer holding the scene's handlers.
    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.body
    }

    pub(crate) fn into_parts(self) -> (String, Option<u64>, Composer, Composer, Composer) {
        (self.id, self.ttl_secs, self.enter, self.leave, self.body)
    }
}

impl IntoScene for Scene {
    fn into_scene(self) -> SetupResult<Arc<RegisteredScene>> {
        validate_id(&self.id)?;
        Ok(Arc::new(RegisteredScene {
            id: self.id,
            ttl_secs: self.ttl_secs,
            enter: self.enter.into_middleware(),
            leave: self.leave.into_middleware(),
            handler: self.body.into_middleware(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_framework::reply;

    #[test]
    fn test_blank_id_rejected() {
        let err = Scene::new("  ").into_scene().unwrap_err();
        assert!(matches!(err, SetupError::InvalidScene { .. }));
    }

    #[test]
    fn test_snapshot_keeps_ttl() {
        let mut scene = Scene::new("greeter").ttl_secs(30);
        scene.on_enter(reply("hi"));
        let registered = scene.into_scene().unwrap();
        assert_eq!(registered.id(), "greeter");
        assert_eq!(registered.ttl_secs(), Some(30));
    }
}
