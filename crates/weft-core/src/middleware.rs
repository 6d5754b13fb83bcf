//! The middleware contract.
//!
//! A middleware unit is an async function of `(context, continuation)`.
//! The continuation, [`Next`], hands control to whatever comes after the
//! unit; a unit that never calls it short-circuits the rest of the chain.
//!
//! Closures are middleware through a blanket impl:
//!
//! ```rust,ignore
//! let log = middleware_fn(|ctx: Arc<Context>, next: Next| async move {
//!     tracing::info!(update = ctx.update().update_id, "before");
//!     next.run(ctx).await
//! });
//! ```
//!
//! Every container that can act as a unit (composers, routers, stages,
//! session middleware) implements [`IntoMiddleware`] and produces a
//! [`BoxedMiddleware`], the cheap-to-clone erased form chains are built from.

use std::future::Future;
use std::sync::Arc;

pub use futures::future::BoxFuture;

use crate::context::Context;
use crate::error::{BoxError, MiddlewareResult};

// =============================================================================
// Middleware
// =============================================================================

/// One unit of a middleware chain.
pub trait Middleware: Send + Sync + 'static {
    /// Runs this unit. Calling `next.run(ctx)` hands control onward.
    fn call(&self, ctx: Arc<Context>, next: Next) -> BoxFuture<'static, MiddlewareResult>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Arc<Context>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    fn call(&self, ctx: Arc<Context>, next: Next) -> BoxFuture<'static, MiddlewareResult> {
        Box::pin(self(ctx, next))
    }
}

/// A type-erased, shareable middleware unit.
#[derive(Clone)]
pub struct BoxedMiddleware(Arc<dyn Middleware>);

impl BoxedMiddleware {
    pub fn new<M: Middleware>(middleware: M) -> Self {
        Self(Arc::new(middleware))
    }

    /// Runs the wrapped unit.
    pub fn call(&self, ctx: Arc<Context>, next: Next) -> BoxFuture<'static, MiddlewareResult> {
        self.0.call(ctx, next)
    }

    /// Returns `true` if both handles point to the same unit.
    pub fn ptr_eq(&self, other: &BoxedMiddleware) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for BoxedMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxedMiddleware").finish_non_exhaustive()
    }
}

/// Conversion into a [`BoxedMiddleware`].
pub trait IntoMiddleware {
    fn into_middleware(self) -> BoxedMiddleware;
}

impl<M: Middleware> IntoMiddleware for M {
    fn into_middleware(self) -> BoxedMiddleware {
        BoxedMiddleware::new(self)
    }
}

impl IntoMiddleware for BoxedMiddleware {
    fn into_middleware(self) -> BoxedMiddleware {
        self
    }
}

/// Builds a middleware from a closure, letting the compiler infer the
/// argument types.
pub fn middleware_fn<F, Fut>(f: F) -> BoxedMiddleware
where
    F: Fn(Arc<Context>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    BoxedMiddleware::new(f)
}

/// Builds a terminal middleware that never continues.
pub fn handler_fn<F, Fut>(f: F) -> BoxedMiddleware
where
    F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    middleware_fn(move |ctx, _next| f(ctx))
}

// =============================================================================
// Next
// =============================================================================

type NextFn = dyn Fn(Arc<Context>) -> BoxFuture<'static, MiddlewareResult> + Send + Sync;

/// The continuation handed to a middleware unit.
#[derive(Clone)]
pub struct Next(Arc<NextFn>);

impl Next {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult> + Send + 'static,
    {
        Self(Arc::new(move |ctx| Box::pin(f(ctx))))
    }

    /// A continuation that does nothing and succeeds.
    pub fn noop() -> Self {
        Self::new(|_ctx| async { Ok(()) })
    }

    /// Hands control to the rest of the chain.
    pub fn run(&self, ctx: Arc<Context>) -> BoxFuture<'static, MiddlewareResult> {
        (self.0)(ctx)
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

// =============================================================================
// Error Handler
// =============================================================================

/// Receives errors that escape a chain or a `catch` boundary.
pub trait ErrorHandler: Send + Sync + 'static {
    fn handle(&self, error: BoxError, ctx: Arc<Context>) -> BoxFuture<'static, ()>;
}

impl<F, Fut> ErrorHandler for F
where
    F: Fn(BoxError, Arc<Context>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, error: BoxError, ctx: Arc<Context>) -> BoxFuture<'static, ()> {
        Box::pin(self(error, ctx))
    }
}

/// Shared error handler.
pub type BoxedErrorHandler = Arc<dyn ErrorHandler>;
