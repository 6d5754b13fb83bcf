//! # Weft
//!
//! A composable middleware framework for chat bots.
//!
//! ## Architecture
//!
//! Every piece of bot logic is a middleware unit: an async function of a
//! context and a continuation. Units are composed into chains, and chains
//! are units again:
//!
//! ```text
//! ┌─────────┐     ┌──────────────────────────────────────────────────────┐
//! │ Runtime │────▶│ session ──▶ stage ──▶ command("start") ──▶ hears(..) │──▶ outbound
//! │         │     │               │                                      │
//! └─────────┘     │               └──▶ current scene / wizard step       │
//!                 └──────────────────────────────────────────────────────┘
//! ```
//!
//! - **Core** ([`core`]): updates, the context, the middleware contract.
//! - **Framework** ([`framework`]): `Composer`, combinators, triggers,
//!   routers, tower integration.
//! - **Session** ([`session`]): keyed, expiring per-chat state.
//! - **Scenes** ([`scenes`]): named sub-chains entered and left at runtime,
//!   and step-by-step wizards.
//! - **Runtime** ([`runtime`]): configuration, logging and the dispatch
//!   loop.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use weft::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut greeter = Scene::new("greeter");
//!     greeter.on_enter(reply("What's your name?"));
//!     greeter.push(handler_fn(|ctx| async move {
//!         ctx.reply("Nice to meet you").await?;
//!         ctx.scene()?.leave().await
//!     }));
//!
//!     let mut stage = Stage::new();
//!     stage.register(greeter)?;
//!
//!     let mut bot = Composer::new();
//!     bot.command("greet", enter("greeter"));
//!
//!     let runtime = Runtime::builder()
//!         .outbound(client)
//!         .error_handler(report)
//!         .push(SessionMiddleware::new())
//!         .push(stage)
//!         .push(bot)
//!         .build()?;
//!
//!     runtime.run_until_signal(updates).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default): load `weft.toml`
//! - `yaml-config`: load `weft.yaml`
//! - `json-log`: JSON log output

pub use weft_core as core;
pub use weft_framework as framework;
pub use weft_runtime as runtime;
pub use weft_scenes as scenes;
pub use weft_session as session;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use weft::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use weft_runtime::{CancellationToken, Runtime, RuntimeStats, WeftConfig};

    // Composition and combinators
    pub use weft_framework::prelude::*;

    // Core types for custom units and outbound clients
    pub use weft_core::{ApiError, ApiResult, Outbound, Update, UpdateType};

    // Sessions
    pub use weft_session::{MemoryStore, SessionContextExt, SessionMiddleware, SessionStore};

    // Scenes
    pub use weft_scenes::{
        SceneContextExt, Scene, Stage, StageOptions, WizardScene, enter, leave, reenter,
    };
}
