//! Predicates used by the gating combinators.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use weft_core::Context;

type SyncFn = dyn Fn(&Context) -> bool + Send + Sync;
type AsyncFn = dyn Fn(Arc<Context>) -> BoxFuture<'static, bool> + Send + Sync;

/// A synchronous, asynchronous or constant boolean test on a context.
#[derive(Clone)]
pub enum Predicate {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
    Const(bool),
}

impl Predicate {
    /// Creates a synchronous predicate.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Creates a predicate that resolves asynchronously.
    pub fn from_future<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self::Async(Arc::new(move |ctx| Box::pin(f(ctx))))
    }

    /// Returns the constant value, if this predicate is one.
    pub fn as_const(&self) -> Option<bool> {
        match self {
            Self::Const(value) => Some(*value),
            _ => None,
        }
    }

    /// Resolves the predicate against `ctx`.
    pub async fn test(&self, ctx: &Arc<Context>) -> bool {
        match self {
            Self::Sync(f) => f(ctx),
            Self::Async(f) => f(Arc::clone(ctx)).await,
            Self::Const(value) => *value,
        }
    }

    /// Returns the negation of this predicate.
    pub fn negate(self) -> Self {
        match self {
            Self::Const(value) => Self::Const(!value),
            Self::Sync(f) => Self::Sync(Arc::new(move |ctx| !f(ctx))),
            Self::Async(f) => {
                Self::Async(Arc::new(move |ctx| {
                    let fut = f(ctx);
                    Box::pin(async move { !fut.await })
                }))
            }
        }
    }
}

impl From<bool> for Predicate {
    fn from(value: bool) -> Self {
        Self::Const(value)
    }
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Predicate::Sync"),
            Self::Async(_) => f.write_str("Predicate::Async"),
            Self::Const(value) => write!(f, "Predicate::Const({value})"),
        }
    }
}
