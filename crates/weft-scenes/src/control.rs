//! Scene and wizard accessors.
//!
//! Inside a stage, handlers reach the conversation state through
//! [`SceneContextExt`]:
//!
//! ```rust,ignore
//! bot.push(handler_fn(|ctx| async move {
//!     let scene = ctx.scene()?;
//!     if scene.current_id().is_none() {
//!         scene.enter("greeter").await?;
//!     }
//!     Ok(())
//! }));
//! ```
//!
//! Every read of the scene record checks its expiry first; an expired
//! record is cleared in place, dropping the pointer, the state and the
//! cursor together.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value};
use tracing::{debug, trace};
use weft_core::{BoxedMiddleware, Context, MiddlewareResult, Next};
use weft_session::{SceneSession, SessionContextExt, SessionHandle};

use crate::error::{SceneError, SceneResult};
use crate::scene::RegisteredScene;
use crate::stage::SceneDispatch;
use crate::wizard::WizardSteps;

/// Scene and wizard access on a context.
pub trait SceneContextExt {
    /// Returns the scene accessor of the enclosing stage.
    fn scene(&self) -> SceneResult<SceneControl>;

    /// Returns the accessor of the wizard handling this dispatch.
    fn wizard(&self) -> SceneResult<WizardControl>;
}

impl SceneContextExt for Arc<Context> {
    fn scene(&self) -> SceneResult<SceneControl> {
        let dispatch = self
            .extension::<Arc<SceneDispatch>>()
            .ok_or(SceneError::StageNotInstalled)?;
        let session = self.session_named(dispatch.session_property())?;
        Ok(SceneControl {
            ctx: Arc::clone(self),
            dispatch,
            session,
        })
    }

    fn wizard(&self) -> SceneResult<WizardControl> {
        let steps = self
            .extension::<WizardSteps>()
            .ok_or(SceneError::WizardNotActive)?;
        Ok(WizardControl {
            scene: self.scene()?,
            steps: steps.0,
        })
    }
}

// =============================================================================
// SceneControl
// =============================================================================

/// Access to the active scene of one dispatch.
pub struct SceneControl {
    ctx: Arc<Context>,
    dispatch: Arc<SceneDispatch>,
    session: Arc<SessionHandle>,
}

/// Clears the leaving flag when a leave finishes, even if it is cancelled.
struct LeavingGuard<'a>(&'a AtomicBool);

impl Drop for LeavingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SceneControl {
    /// Returns the scene record, clearing it first if it has expired.
    pub fn record(&self) -> Option<SceneSession> {
        let record = self.session.scenes()?;
        let now = self.dispatch.now_ms();
        if record.expires.is_some_and(|expires| expires <= now) {
            debug!(scene = ?record.current, "scene expired");
            self.session.set_scenes(None);
            return None;
        }
        Some(record)
    }

    /// Id of the active scene, falling back to the stage's default scene.
    pub fn current_id(&self) -> Option<String> {
        self.record()
            .and_then(|record| record.current)
            .or_else(|| self.dispatch.default_scene().map(str::to_string))
    }

    /// The active scene, if it is registered on this stage.
    pub fn current(&self) -> Option<Arc<RegisteredScene>> {
        self.current_id().and_then(|id| self.dispatch.get(&id))
    }

    /// Returns a copy of the scene-local state.
    pub fn state(&self) -> Map<String, Value> {
        self.record().map(|record| record.state).unwrap_or_default()
    }

    /// Replaces the scene-local state.
    pub fn set_state(&self, state: Map<String, Value>) {
        self.with_state(|current| *current = state);
    }

    /// Runs `f` with mutable access to the scene-local state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        let mut record = self.record().unwrap_or_default();
        let out = f(&mut record.state);
        self.session.set_scenes(Some(record));
        out
    }

    /// Clears the scene record.
    pub fn reset(&self) {
        self.session.set_scenes(None);
    }

    // ─── Transitions ─────────────────────────────────────────────────────────

    /// Enters `id` with empty state.
    pub async fn enter(&self, id: &str) -> MiddlewareResult {
        self.enter_with(id, Map::new(), false).await
    }

    /// Enters `id` with `state`.
    ///
    /// Unless `silent`, the current scene is left first and the target's
    /// enter chain runs to completion with an inert continuation.
    pub async fn enter_with(
        &self,
        id: &str,
        state: Map<String, Value>,
        silent: bool,
    ) -> MiddlewareResult {
        let scene = self
            .dispatch
            .get(id)
            .ok_or_else(|| SceneError::NotFound(id.to_string()))?;
        if !silent {
            self.leave().await?;
        }

        let ttl_secs = scene.ttl_secs().or(self.dispatch.ttl_secs());
        let expires = ttl_secs.map(|secs| {
            self.dispatch
                .now_ms()
                .saturating_add(secs.saturating_mul(1000))
        });
        debug!(scene = id, silent, ?expires, "entering scene");
        self.session.set_scenes(Some(SceneSession {
            current: Some(id.to_string()),
            state,
            expires,
            cursor: 0,
        }));

        if silent {
            return Ok(());
        }
        scene.enter.call(Arc::clone(&self.ctx), Next::noop()).await
    }

    /// Leaves the current scene.
    ///
    /// A leave started while another is running on the same dispatch does
    /// nothing.
    pub async fn leave(&self) -> MiddlewareResult {
        if self.dispatch.leaving.swap(true, Ordering::AcqRel) {
            trace!("leave already in progress");
            return Ok(());
        }
        let _guard = LeavingGuard(&self.dispatch.leaving);

        let active = self
            .record()
            .and_then(|record| record.current)
            .and_then(|id| self.dispatch.get(&id));
        if let Some(scene) = active {
            debug!(scene = scene.id(), "leaving scene");
            scene.leave.call(Arc::clone(&self.ctx), Next::noop()).await?;
        }
        self.reset();
        Ok(())
    }

    /// Restarts the current scene, keeping its state.
    pub async fn reenter(&self) -> MiddlewareResult {
        let Some(record) = self.record() else {
            return Ok(());
        };
        let Some(id) = record.current else {
            return Ok(());
        };
        self.enter_with(&id, record.state, false).await
    }
}

impl std::fmt::Debug for SceneControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneControl")
            .field("record", &self.session.scenes())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// WizardControl
// =============================================================================

/// Access to the cursor of the wizard handling one dispatch.
pub struct WizardControl {
    scene: SceneControl,
    steps: Arc<[BoxedMiddleware]>,
}

impl WizardControl {
    pub fn scene(&self) -> &SceneControl {
        &self.scene
    }

    /// The zero-based step cursor.
    pub fn cursor(&self) -> usize {
        self.scene.record().map(|record| record.cursor).unwrap_or(0)
    }

    /// The step at the cursor, or `None` past the last step.
    pub fn step(&self) -> Option<BoxedMiddleware> {
        self.steps.get(self.cursor()).cloned()
    }

    /// Number of steps in the wizard.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Moves the cursor to `index`.
    pub fn select_step(&self, index: usize) -> &Self {
        let mut record = self.scene.record().unwrap_or_default();
        record.cursor = index;
        self.scene.session.set_scenes(Some(record));
        self
    }

    pub fn next(&self) -> &Self {
        self.select_step(self.cursor() + 1)
    }

    /// Moves the cursor back one step, stopping at the first.
    pub fn back(&self) -> &Self {
        self.select_step(self.cursor().saturating_sub(1))
    }

    /// Returns a copy of the scene-local state.
    pub fn state(&self) -> Map<String, Value> {
        self.scene.state()
    }
}

impl std::fmt::Debug for WizardControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WizardControl")
            .field("cursor", &self.cursor())
            .field("steps", &self.steps.len())
            .finish_non_exhaustive()
    }
}
