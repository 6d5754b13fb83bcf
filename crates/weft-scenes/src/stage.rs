//! The stage: scene registry and dispatcher.
//!
//! # Dispatch
//!
//! ```text
//! session bound? ──no──▶ next
//!     │ yes
//!     ▼
//! attach scene accessor ──▶ stage handlers ──▶ active scene? ──yes──▶ scene handler
//!                                                  │ no
//!                                                  ▼
//!                                                 next
//! ```
//!
//! Stage handlers always run first, so commands like `/cancel` registered
//! on the stage work from inside any scene.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut stage = Stage::with_options(StageOptions::default().ttl_secs(600));
//! stage.register(greeter)?.register(signup)?;
//! stage.composer_mut()
//!     .command("greet", enter("greeter"))
//!     .command("cancel", leave());
//!
//! bot.push(SessionMiddleware::new());
//! bot.push(stage);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tracing::{debug, warn};
use weft_core::{
    BoxedMiddleware, IntoMiddleware, SharedClock, SystemClock, handler_fn, middleware_fn,
};
use weft_framework::{Composer, Predicate, SetupError, SetupResult, compose, optional};
use weft_session::{DEFAULT_PROPERTY, SessionContextExt};

use crate::control::SceneContextExt;
use crate::scene::{IntoScene, RegisteredScene};

// =============================================================================
// Options
// =============================================================================

/// Stage-wide settings.
#[derive(Debug, Clone)]
pub struct StageOptions {
    /// Property of the session the scene record lives in.
    pub session_property: String,
    /// Scene TTL for scenes that do not set their own.
    pub ttl_secs: Option<u64>,
    /// Scene treated as active when none is.
    pub default_scene: Option<String>,
    pub clock: SharedClock,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            session_property: DEFAULT_PROPERTY.to_string(),
            ttl_secs: None,
            default_scene: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl StageOptions {
    pub fn session_property(mut self, property: impl Into<String>) -> Self {
        self.session_property = property.into();
        self
    }

    pub fn ttl_secs(mut self, secs: u64) -> Self {
        self.ttl_secs = Some(secs);
        self
    }

    pub fn default_scene(mut self, id: impl Into<String>) -> Self {
        self.default_scene = Some(id.into());
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}

// =============================================================================
// SceneDispatch
// =============================================================================

type SceneMap = HashMap<String, Arc<RegisteredScene>>;

/// Per-dispatch stage state attached to the context.
pub(crate) struct SceneDispatch {
    scenes: Arc<SceneMap>,
    options: Arc<StageOptions>,
    pub(crate) leaving: AtomicBool,
}

impl SceneDispatch {
    pub(crate) fn get(&self, id: &str) -> Option<Arc<RegisteredScene>> {
        self.scenes.get(id).cloned()
    }

    pub(crate) fn session_property(&self) -> &str {
        &self.options.session_property
    }

    pub(crate) fn default_scene(&self) -> Option<&str> {
        self.options.default_scene.as_deref()
    }

    pub(crate) fn ttl_secs(&self) -> Option<u64> {
        self.options.ttl_secs
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.options.clock.now_ms()
    }
}

// =============================================================================
// Stage
// =============================================================================

/// A registry of scenes dispatching to the active one.
#[derive(Clone, Default)]
pub struct Stage {
    scenes: SceneMap,
    options: StageOptions,
    body: Composer,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: StageOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &StageOptions {
        &self.options
    }

    /// Registers a scene.
    ///
    /// Fails if the scene is malformed or its id is already taken.
    pub fn register(&mut self, scene: impl IntoScene) -> SetupResult<&mut Self> {
        let scene = scene.into_scene()?;
        if self.scenes.contains_key(scene.id()) {
            return Err(SetupError::DuplicateScene(scene.id().to_string()));
        }
        debug!(scene = scene.id(), "scene registered");
        self.scenes.insert(scene.id().to_string(), scene);
        Ok(self)
    }

    /// Returns a registered scene.
    pub fn scene(&self, id: &str) -> Option<&Arc<RegisteredScene>> {
        self.scenes.get(id)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Adds a stage handler, run ahead of the active scene.
    pub fn push(&mut self, unit: impl IntoMiddleware) -> &mut Self {
        self.body.push(unit);
        self
    }

    /// Returns the composer holding the stage handlers.
    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.body
    }

    /// Returns the stage middleware.
    pub fn middleware(&self) -> BoxedMiddleware {
        if let Some(id) = &self.options.default_scene
            && !self.scenes.contains_key(id)
        {
            warn!(scene = %id, "default scene is not registered");
        }

        let scenes = Arc::new(self.scenes.clone());
        let options = Arc::new(self.options.clone());
        let attach = middleware_fn(move |ctx, next| {
            ctx.insert_extension(Arc::new(SceneDispatch {
                scenes: Arc::clone(&scenes),
                options: Arc::clone(&options),
                leaving: AtomicBool::new(false),
            }));
            next.run(ctx)
        });
        let route = middleware_fn(|ctx, next| async move {
            match ctx.scene()?.current() {
                Some(scene) => scene.handler().call(ctx, next).await,
                None => next.run(ctx).await,
            }
        });

        let property = self.options.session_property.clone();
        optional(
            Predicate::new(move |ctx| ctx.has_session(&property)),
            compose([attach, self.body.middleware(), route]),
        )
    }
}

impl IntoMiddleware for Stage {
    fn into_middleware(self) -> BoxedMiddleware {
        self.middleware()
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.scenes.keys().collect();
        ids.sort();
        f.debug_struct("Stage")
            .field("scenes", &ids)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ─── Transition units ────────────────────────────────────────────────────────

/// Enters `id` and stops the chain.
pub fn enter(id: impl Into<String>) -> BoxedMiddleware {
    let id: Arc<str> = Arc::from(id.into());
    handler_fn(move |ctx| {
        let id = Arc::clone(&id);
        async move { ctx.scene()?.enter(&id).await }
    })
}

/// Leaves the current scene and stops the chain.
pub fn leave() -> BoxedMiddleware {
    handler_fn(|ctx| async move { ctx.scene()?.leave().await })
}

/// Restarts the current scene and stops the chain.
pub fn reenter() -> BoxedMiddleware {
    handler_fn(|ctx| async move { ctx.scene()?.reenter().await })
}
