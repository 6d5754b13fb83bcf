//! # Weft Framework
//!
//! Composition and routing on top of [`weft_core`].
//!
//! - [`compose`] and [`Composer`]: ordered chains with one-shot
//!   continuations.
//! - [`combinators`]: gating, lookup, concurrency, matching and recovery
//!   units usable on their own.
//! - [`Trigger`]: literal, regex and function matchers behind one signature.
//! - [`Router`]: per-update dispatch to named middleware groups.
//! - [`ChainService`] / [`ChainLayer`]: tower integration.
//!
//! ## Example
//!
//! ```rust,ignore
//! use weft_framework::prelude::*;
//!
//! let mut bot = Composer::new();
//! bot.command("start", reply("hello"))
//!     .hashtag("weft", reply("that's us"))
//!     .push(catch(log_error, risky_handler));
//!
//! let service = ChainService::new(bot);
//! ```

pub mod combinators;
pub mod composer;
pub mod error;
pub mod predicate;
pub mod router;
pub mod service;
pub mod trigger;

pub use combinators::{
    IntoNames, acl, action, branch, cashtag, catch, chat_type, command, dispatch, drop, email,
    entity, entity_text, entity_type, filter, fork, group_chat, hashtag, hears, inline_query,
    lazy, match_text, mention, mount, noop, on, optional, pass_thru, phone, private_chat, reply,
    tap, text_link, text_mention, url,
};
pub use composer::{Composer, compose};
pub use error::{SetupError, SetupResult};
pub use predicate::Predicate;
pub use router::{Route, Router};
pub use service::{BoxedDispatchService, ChainLayer, ChainService, Settle};
pub use trigger::{IntoTriggers, Trigger};

/// Commonly used items.
pub mod prelude {
    pub use crate::combinators::{
        IntoNames, acl, action, branch, catch, command, dispatch, entity, entity_type, filter,
        fork, hashtag, hears, lazy, mention, mount, noop, on, optional, pass_thru, reply, tap,
    };
    pub use crate::{
        ChainService, Composer, Predicate, Route, Router, SetupError, Trigger, compose,
    };
    pub use weft_core::{
        BoxError, BoxedMiddleware, Context, IntoMiddleware, Match, Middleware, MiddlewareResult,
        Next, handler_fn, middleware_fn,
    };
}
