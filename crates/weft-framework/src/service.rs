//! Tower integration.
//!
//! A composed chain is exposed as a `tower::Service<Arc<Context>>` so hosts
//! can stack ordinary tower layers (timeouts, concurrency limits, tracing)
//! around a dispatch:
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use tower::timeout::TimeoutLayer;
//!
//! let service = ServiceBuilder::new()
//!     .layer(TimeoutLayer::new(Duration::from_secs(5)))
//!     .service(ChainService::new(bot.middleware()));
//! ```
//!
//! [`ChainLayer`] goes the other way: it puts a chain in front of an inner
//! service, which then acts as the chain's outer continuation.

use std::future::{Ready, ready};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures::future::BoxFuture;
use tower::util::{BoxCloneSyncService, ServiceExt};
use tower::{BoxError, Layer, Service};
use weft_core::{BoxedMiddleware, Context, IntoMiddleware, Next};

/// A type-erased, `Clone + Send + Sync` dispatch service.
pub type BoxedDispatchService = BoxCloneSyncService<Arc<Context>, (), BoxError>;

// ============================================================================
// Settle
// ============================================================================

/// The terminal service: completes a dispatch successfully.
#[derive(Debug, Default, Clone, Copy)]
pub struct Settle;

impl Service<Arc<Context>> for Settle {
    type Response = ();
    type Error = BoxError;
    type Future = Ready<Result<(), BoxError>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _ctx: Arc<Context>) -> Self::Future {
        ready(Ok(()))
    }
}

// ============================================================================
// ChainService
// ============================================================================

/// A tower [`Service`] that runs a middleware chain.
///
/// When the chain's last unit continues, `inner` is called with the same
/// context.
pub struct ChainService<S = Settle> {
    chain: BoxedMiddleware,
    inner: S,
}

impl ChainService<Settle> {
    /// Wraps `chain` with a terminal continuation.
    pub fn new(chain: impl IntoMiddleware) -> Self {
        Self {
            chain: chain.into_middleware(),
            inner: Settle,
        }
    }
}

impl<S> ChainService<S> {
    /// Wraps `chain`, continuing into `inner`.
    pub fn with_inner(chain: impl IntoMiddleware, inner: S) -> Self {
        Self {
            chain: chain.into_middleware(),
            inner,
        }
    }
}

impl<S> ChainService<S>
where
    S: Service<Arc<Context>, Response = (), Error = BoxError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    /// Boxes this service into a [`BoxedDispatchService`].
    pub fn boxed(self) -> BoxedDispatchService {
        BoxCloneSyncService::new(self)
    }
}

impl<S: Clone> Clone for ChainService<S> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<Arc<Context>> for ChainService<S>
where
    S: Service<Arc<Context>, Response = (), Error = BoxError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), BoxError>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<Context>) -> Self::Future {
        let inner = self.inner.clone();
        let next = Next::new(move |ctx| inner.clone().oneshot(ctx));
        self.chain.call(ctx, next)
    }
}

impl<S> std::fmt::Debug for ChainService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainService").finish_non_exhaustive()
    }
}

// ============================================================================
// ChainLayer
// ============================================================================

/// A tower [`Layer`] placing a middleware chain in front of a service.
#[derive(Clone, Debug)]
pub struct ChainLayer {
    chain: BoxedMiddleware,
}

impl ChainLayer {
    pub fn new(chain: impl IntoMiddleware) -> Self {
        Self {
            chain: chain.into_middleware(),
        }
    }
}

impl<S> Layer<S> for ChainLayer {
    type Service = ChainService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ChainService::with_inner(self.chain.clone(), inner)
    }
}
