//! Wizard scenes.
//!
//! A wizard is a scene whose body is an ordered list of steps addressed by
//! a cursor persisted in the session. Each dispatch runs the step at the
//! cursor; steps move the cursor through [`WizardControl`](crate::WizardControl):
//!
//! ```rust,ignore
//! let wizard = WizardScene::new("signup", [
//!     handler_fn(|ctx| async move {
//!         ctx.reply("Name?").await?;
//!         ctx.wizard()?.next();
//!         Ok(())
//!     }),
//!     handler_fn(|ctx| async move {
//!         let wizard = ctx.wizard()?;
//!         wizard.scene().with_state(|s| s.insert("name".into(), json!(ctx.trigger_text())));
//!         ctx.reply("Done").await?;
//!         wizard.scene().leave().await
//!     }),
//! ]);
//! stage.register(wizard)?;
//! ```
//!
//! Once the cursor runs past the last step, the next dispatch resets it to
//! zero and leaves the scene. Entering a wizard runs step 0.

use std::sync::Arc;

use weft_core::{BoxedMiddleware, IntoMiddleware, middleware_fn};
use weft_framework::{Composer, SetupError, SetupResult, compose};

use crate::control::SceneContextExt;
use crate::scene::{IntoScene, RegisteredScene, Scene, validate_id};

/// The step list of the wizard handling the current dispatch.
#[derive(Clone)]
pub(crate) struct WizardSteps(pub(crate) Arc<[BoxedMiddleware]>);

/// A scene sequencing ordered steps.
#[derive(Clone, Debug)]
pub struct WizardScene {
    scene: Scene,
    steps: Vec<BoxedMiddleware>,
}

impl WizardScene {
    pub fn new(id: impl Into<String>, steps: impl IntoIterator<Item = BoxedMiddleware>) -> Self {
        Self {
            scene: Scene::new(id),
            steps: steps.into_iter().collect(),
        }
    }

    pub fn id(&self) -> &str {
        self.scene.id()
    }

    /// Sets how long the wizard stays active without being re-entered.
    pub fn ttl_secs(mut self, secs: u64) -> Self {
        self.scene = self.scene.ttl_secs(secs);
        self
    }

    /// Appends a step.
    pub fn step(&mut self, unit: impl IntoMiddleware) -> &mut Self {
        self.steps.push(unit.into_middleware());
        self
    }

    /// Adds an enter handler. Enter handlers run before step 0 and must
    /// continue for the step to run.
    pub fn on_enter(&mut self, unit: impl IntoMiddleware) -> &mut Self {
        self.scene.on_enter(unit);
        self
    }

    pub fn on_leave(&mut self, unit: impl IntoMiddleware) -> &mut Self {
        self.scene.on_leave(unit);
        self
    }

    /// Adds a handler run ahead of the current step.
    pub fn push(&mut self, unit: impl IntoMiddleware) -> &mut Self {
        self.scene.push(unit);
        self
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        self.scene.composer_mut()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Runs the step at the cursor, or rewinds and leaves when there is none.
fn step_dispatcher() -> BoxedMiddleware {
    middleware_fn(|ctx, next| async move {
        let wizard = ctx.wizard()?;
        match wizard.step() {
            Some(step) => step.call(ctx, next).await,
            None => {
                wizard.select_step(0);
                wizard.scene().leave().await
            }
        }
    })
}

impl IntoScene for WizardScene {
    fn into_scene(self) -> SetupResult<Arc<RegisteredScene>> {
        validate_id(self.scene.id())?;
        if self.steps.is_empty() {
            return Err(SetupError::invalid_scene(format!(
                "wizard {} has no steps",
                self.scene.id()
            )));
        }

        let steps = WizardSteps(self.steps.into());
        let attach = middleware_fn(move |ctx, next| {
            ctx.insert_extension(steps.clone());
            next.run(ctx)
        });

        let (id, ttl_secs, enter, leave, body) = self.scene.into_parts();
        let handler = compose([attach, body.into_middleware(), step_dispatcher()]);
        Ok(Arc::new(RegisteredScene {
            id,
            ttl_secs,
            enter: compose([enter.into_middleware(), handler.clone()]),
            leave: leave.into_middleware(),
            handler,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_framework::noop;

    #[test]
    fn test_wizard_without_steps_rejected() {
        let err = WizardScene::new("empty", []).into_scene().unwrap_err();
        assert_eq!(
            err,
            SetupError::invalid_scene("wizard empty has no steps")
        );
    }

    #[test]
    fn test_steps_can_be_appended() {
        let mut wizard = WizardScene::new("w", [noop()]);
        wizard.step(noop()).step(noop());
        assert_eq!(wizard.len(), 3);
        assert!(wizard.into_scene().is_ok());
    }
}
