//! # Weft Scenes
//!
//! Conversation state machines kept in the session.
//!
//! - [`Scene`]: a named handler group with enter and leave chains.
//! - [`WizardScene`]: a scene stepping through ordered handlers by a
//!   persisted cursor.
//! - [`Stage`]: the registry that routes each update to the active scene.
//!
//! A stage needs a [`SessionMiddleware`](weft_session::SessionMiddleware)
//! earlier in the chain; without a session it lets updates through
//! untouched.
//!
//! ```rust,ignore
//! use weft_scenes::{Scene, Stage, enter};
//!
//! let mut greeter = Scene::new("greeter");
//! greeter.on_enter(reply("Hi! Who are you?"));
//!
//! let mut stage = Stage::new();
//! stage.register(greeter)?;
//! stage.composer_mut().command("greet", enter("greeter"));
//!
//! bot.push(SessionMiddleware::new()).push(stage);
//! ```

pub mod control;
pub mod error;
pub mod scene;
pub mod stage;
pub mod wizard;

pub use control::{SceneContextExt, SceneControl, WizardControl};
pub use error::{SceneError, SceneResult};
pub use scene::{IntoScene, RegisteredScene, Scene};
pub use stage::{Stage, StageOptions, enter, leave, reenter};
pub use wizard::WizardScene;
