//! # Weft Core
//!
//! The core engine of the weft middleware framework.
//!
//! This crate holds the pieces every other weft crate builds on:
//!
//! - **Update model**: Telegram-shaped updates and their classification
//!   ([`Update`], [`UpdateType`]).
//! - **Context**: the per-event carrier shared by every unit of a dispatch
//!   ([`Context`], [`Extensions`], [`Match`]).
//! - **Middleware contract**: [`Middleware`], the continuation [`Next`], and
//!   the erased [`BoxedMiddleware`].
//! - **Outbound capability**: the [`Outbound`] trait handlers act through.
//! - **Errors**: [`DispatchError`] and [`ApiError`].
//! - **Clock**: [`Clock`] for expiry bookkeeping, with [`ManualClock`] for
//!   simulated time.
//!
//! ## Dispatch Flow
//!
//! ```text
//! Update ──▶ Context ──▶ unit 1 ──next──▶ unit 2 ──next──▶ ... ──▶ outer next
//! ```

pub mod clock;
pub mod context;
pub mod error;
pub mod middleware;
pub mod outbound;
pub mod update;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use context::{Context, Extensions, Match, SlotValue};
pub use error::{ApiError, ApiResult, BoxError, DispatchError, MiddlewareResult};
pub use middleware::{
    BoxFuture, BoxedErrorHandler, BoxedMiddleware, ErrorHandler, IntoMiddleware, Middleware,
    Next, handler_fn, middleware_fn,
};
pub use outbound::{BoxedOutbound, DetachedOutbound, Outbound};
pub use update::{
    CallbackQuery, Chat, InlineQuery, MESSAGE_SUB_TYPES, Message, MessageEntity, Update,
    UpdateType, User,
};
