//! Composition of middleware units into a single chain.
//!
//! [`compose`] turns an ordered list of units into one middleware with
//! one-shot continuation semantics:
//!
//! - Units run strictly in registration order.
//! - Each unit's [`Next`] runs the following unit, or the outer continuation
//!   after the last one.
//! - A unit that does not call `next` short-circuits the rest of the chain.
//! - Calling `next` twice from the same unit fails with
//!   [`DispatchError::NextCalledMultipleTimes`].
//! - Calling `next` with a context from another dispatch fails with
//!   [`DispatchError::InvalidContext`].
//!
//! [`Composer`] is the builder form: it collects units (plus shortcuts for
//! the matcher combinators) and composes them on [`Composer::middleware`].
//!
//! # Example
//!
//! ```rust,ignore
//! let mut bot = Composer::new();
//! bot.push(logger)
//!     .command("start", reply("welcome"))
//!     .hears(["hi", "hello"], reply("hey"))
//!     .on("photo", reply("nice picture"));
//!
//! let chain = bot.middleware();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use tracing::trace;
use weft_core::{
    BoxedMiddleware, Context, DispatchError, ErrorHandler, IntoMiddleware, Middleware,
    MiddlewareResult, MessageEntity, Next,
};

use crate::combinators::{self, IntoNames};
use crate::predicate::Predicate;
use crate::trigger::IntoTriggers;

// =============================================================================
// compose
// =============================================================================

/// Composes `units` into a single middleware.
///
/// An empty list yields a pass-through; a single unit is returned as is.
pub fn compose(units: impl IntoIterator<Item = BoxedMiddleware>) -> BoxedMiddleware {
    let mut units: Vec<BoxedMiddleware> = units.into_iter().collect();
    match units.len() {
        0 => combinators::pass_thru(),
        1 => match units.pop() {
            Some(unit) => unit,
            None => combinators::pass_thru(),
        },
        _ => BoxedMiddleware::new(Chain {
            units: Arc::from(units),
        }),
    }
}

/// A composed list of two or more units.
struct Chain {
    units: Arc<[BoxedMiddleware]>,
}

impl Middleware for Chain {
    fn call(&self, ctx: Arc<Context>, next: Next) -> BoxFuture<'static, MiddlewareResult> {
        let run = Arc::new(ChainRun {
            units: Arc::clone(&self.units),
            origin: Arc::clone(&ctx),
            reached: AtomicUsize::new(0),
            outer: next,
        });
        run.execute(0, ctx)
    }
}

/// Per-dispatch bookkeeping for one run of a [`Chain`].
struct ChainRun {
    units: Arc<[BoxedMiddleware]>,
    origin: Arc<Context>,
    /// One past the highest position entered so far.
    reached: AtomicUsize,
    outer: Next,
}

impl ChainRun {
    fn execute(self: Arc<Self>, index: usize, ctx: Arc<Context>) -> BoxFuture<'static, MiddlewareResult> {
        Box::pin(async move {
            if !Arc::ptr_eq(&ctx, &self.origin) {
                return Err(DispatchError::InvalidContext.into());
            }
            if self.reached.fetch_max(index + 1, Ordering::SeqCst) > index {
                return Err(DispatchError::NextCalledMultipleTimes.into());
            }

            let Some(unit) = self.units.get(index).cloned() else {
                return self.outer.run(ctx).await;
            };

            trace!(index, total = self.units.len(), "running middleware unit");
            let run = Arc::clone(&self);
            let next = Next::new(move |ctx| Arc::clone(&run).execute(index + 1, ctx));
            unit.call(ctx, next).await
        })
    }
}

// =============================================================================
// Composer
// =============================================================================

/// An ordered collection of middleware units.
///
/// Shortcut methods push the corresponding combinator, so a composer reads
/// like a handler table. The composed chain is a snapshot: units pushed after
/// [`middleware`](Self::middleware) was called are not part of it.
#[derive(Clone, Default)]
pub struct Composer {
    units: Vec<BoxedMiddleware>,
}

impl Composer {
    /// Creates an empty composer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a composer from existing units.
    pub fn from_units(units: impl IntoIterator<Item = BoxedMiddleware>) -> Self {
        Self {
            units: units.into_iter().collect(),
        }
    }

    /// Appends a unit.
    pub fn push(&mut self, unit: impl IntoMiddleware) -> &mut Self {
        self.units.push(unit.into_middleware());
        self
    }

    /// Appends a unit, builder style.
    pub fn with(mut self, unit: impl IntoMiddleware) -> Self {
        self.push(unit);
        self
    }

    /// Returns the composed chain.
    pub fn middleware(&self) -> BoxedMiddleware {
        compose(self.units.clone())
    }

    /// Returns the number of units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    // ─── Shortcuts ───────────────────────────────────────────────────────────

    /// Registers `unit` for updates classified as any of `types`.
    pub fn on(&mut self, types: impl IntoNames, unit: impl IntoMiddleware) -> &mut Self {
        self.push(combinators::mount(types, unit))
    }

    /// Registers `unit` for text messages matching `triggers`.
    pub fn hears(&mut self, triggers: impl IntoTriggers, unit: impl IntoMiddleware) -> &mut Self {
        self.push(combinators::hears(triggers, unit))
    }

    /// Registers `unit` for the bot commands `names`.
    pub fn command(&mut self, names: impl IntoNames, unit: impl IntoMiddleware) -> &mut Self {
        self.push(combinators::command(names, unit))
    }

    /// Registers `unit` for callback queries whose data matches `triggers`.
    pub fn action(&mut self, triggers: impl IntoTriggers, unit: impl IntoMiddleware) -> &mut Self {
        self.push(combinators::action(triggers, unit))
    }

    /// Registers `unit` for inline queries matching `triggers`.
    pub fn inline_query(
        &mut self,
        triggers: impl IntoTriggers,
        unit: impl IntoMiddleware,
    ) -> &mut Self {
        self.push(combinators::inline_query(triggers, unit))
    }

    /// Registers `unit` for messages with an entity satisfying `predicate`.
    pub fn entity<F>(&mut self, predicate: F, unit: impl IntoMiddleware) -> &mut Self
    where
        F: Fn(&MessageEntity, &str, &Context) -> bool + Send + Sync + 'static,
    {
        self.push(combinators::entity(predicate, unit))
    }

    /// Registers `unit` for messages carrying an entity of one of `types`.
    pub fn entity_type(&mut self, types: impl IntoNames, unit: impl IntoMiddleware) -> &mut Self {
        self.push(combinators::entity_type(types, unit))
    }

    pub fn mention(&mut self, names: impl IntoNames, unit: impl IntoMiddleware) -> &mut Self {
        self.push(combinators::mention(names, unit))
    }

    pub fn hashtag(&mut self, tags: impl IntoNames, unit: impl IntoMiddleware) -> &mut Self {
        self.push(combinators::hashtag(tags, unit))
    }

    pub fn cashtag(&mut self, tags: impl IntoNames, unit: impl IntoMiddleware) -> &mut Self {
        self.push(combinators::cashtag(tags, unit))
    }

    /// Runs `unit` only when `predicate` holds.
    pub fn optional(
        &mut self,
        predicate: impl Into<Predicate>,
        unit: impl IntoMiddleware,
    ) -> &mut Self {
        self.push(combinators::optional(predicate, unit))
    }

    /// Stops the chain unless `predicate` holds.
    pub fn filter(&mut self, predicate: impl Into<Predicate>) -> &mut Self {
        self.push(combinators::filter(predicate))
    }

    /// Stops the chain when `predicate` holds.
    pub fn drop(&mut self, predicate: impl Into<Predicate>) -> &mut Self {
        self.push(combinators::drop(predicate))
    }

    /// Runs `unit` in the background and continues immediately.
    pub fn fork(&mut self, unit: impl IntoMiddleware) -> &mut Self {
        self.push(combinators::fork(unit))
    }

    /// Runs `unit` to completion, then always continues.
    pub fn tap(&mut self, unit: impl IntoMiddleware) -> &mut Self {
        self.push(combinators::tap(unit))
    }

    /// Runs `unit` and hands any error it raises to `handler`.
    pub fn catch(&mut self, handler: impl ErrorHandler, unit: impl IntoMiddleware) -> &mut Self {
        self.push(combinators::catch(handler, unit))
    }
}

impl IntoMiddleware for Composer {
    fn into_middleware(self) -> BoxedMiddleware {
        compose(self.units)
    }
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("units", &self.units.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use weft_core::{Update, middleware_fn};

    fn ctx() -> Arc<Context> {
        let update: Update = serde_json::from_str(r#"{"update_id": 1}"#).unwrap();
        Arc::new(Context::detached(update))
    }

    fn counting_next(counter: &Arc<AtomicUsize>) -> Next {
        let counter = Arc::clone(counter);
        Next::new(move |_ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> BoxedMiddleware {
        let log = Arc::clone(log);
        middleware_fn(move |ctx, next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(name);
                next.run(ctx).await
            }
        })
    }

    #[tokio::test]
    async fn test_empty_compose_reaches_final_next_once() {
        let reached = Arc::new(AtomicUsize::new(0));
        compose(Vec::new())
            .call(ctx(), counting_next(&reached))
            .await
            .unwrap();
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_unit_is_returned_unwrapped() {
        let unit = middleware_fn(|ctx, next| async move { next.run(ctx).await });
        let composed = compose(vec![unit.clone()]);
        assert!(composed.ptr_eq(&unit));
    }

    #[tokio::test]
    async fn test_units_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = compose(vec![recorder(&log, "a"), recorder(&log, "b"), recorder(&log, "c")]);
        let reached = Arc::new(AtomicUsize::new(0));
        chain.call(ctx(), counting_next(&reached)).await.unwrap();
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_later_unit_waits_for_suspended_unit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let slow = {
            let log = Arc::clone(&log);
            middleware_fn(move |ctx, next| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().push("slow start");
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    tokio::task::yield_now().await;
                    log.lock().push("slow continue");
                    next.run(ctx).await?;
                    log.lock().push("slow after");
                    Ok(())
                }
            })
        };
        let chain = compose(vec![slow, recorder(&log, "b")]);
        chain.call(ctx(), Next::noop()).await.unwrap();
        assert_eq!(
            *log.lock(),
            vec!["slow start", "slow continue", "b", "slow after"]
        );
    }

    #[tokio::test]
    async fn test_unit_can_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stop = middleware_fn(|_ctx, _next| async { Ok(()) });
        let chain = compose(vec![recorder(&log, "a"), stop, recorder(&log, "b")]);
        let reached = Arc::new(AtomicUsize::new(0));
        chain.call(ctx(), counting_next(&reached)).await.unwrap();
        assert_eq!(*log.lock(), vec!["a"]);
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_double_next_is_reported() {
        let twice = middleware_fn(|ctx, next| async move {
            next.run(Arc::clone(&ctx)).await?;
            next.run(ctx).await
        });
        let chain = compose(vec![twice, combinators::pass_thru()]);
        let err = chain.call(ctx(), Next::noop()).await.unwrap_err();
        assert_eq!(err.to_string(), "next() called multiple times");
        assert_eq!(
            DispatchError::find(&err),
            Some(&DispatchError::NextCalledMultipleTimes)
        );
    }

    #[tokio::test]
    async fn test_foreign_context_is_rejected() {
        let swap = middleware_fn(|_ctx, next| async move { next.run(ctx()).await });
        let chain = compose(vec![swap, combinators::pass_thru()]);
        let err = chain.call(ctx(), Next::noop()).await.unwrap_err();
        assert_eq!(DispatchError::find(&err), Some(&DispatchError::InvalidContext));
    }

    #[tokio::test]
    async fn test_errors_propagate_to_caller() {
        let fail = middleware_fn(|_ctx, _next| async { Err("boom".into()) });
        let chain = compose(vec![combinators::pass_thru(), fail]);
        let err = chain.call(ctx(), Next::noop()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_chain_is_reusable_across_dispatches() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = compose(vec![recorder(&log, "a"), recorder(&log, "b")]);
        chain.call(ctx(), Next::noop()).await.unwrap();
        chain.call(ctx(), Next::noop()).await.unwrap();
        assert_eq!(log.lock().len(), 4);
    }

    #[tokio::test]
    async fn test_composer_builder() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut composer = Composer::new();
        composer.push(recorder(&log, "first")).push(recorder(&log, "second"));
        assert_eq!(composer.len(), 2);

        let nested = Composer::new().with(composer.clone()).with(recorder(&log, "third"));
        nested.into_middleware().call(ctx(), Next::noop()).await.unwrap();
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }
}
