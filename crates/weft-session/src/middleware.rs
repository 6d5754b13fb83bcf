//! The session middleware.
//!
//! # Lifecycle
//!
//! ```text
//! derive key ──none──▶ bind "unavailable" ──▶ next
//!     │
//!     ▼
//! load {session, expires} ──expired──▶ empty record
//!     │
//!     ▼
//! bind SessionHandle under the property ──▶ next ──ok──▶ seal + save
//!                                                 └─err──▶ propagate, no save
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let session = SessionMiddleware::new().ttl_secs(3600);
//! bot.push(session.clone());
//! bot.push(handler_fn(|ctx| async move {
//!     let session = ctx.session()?;
//!     let visits = session.get_as::<u64>("visits")?.unwrap_or(0) + 1;
//!     session.set_as("visits", &visits)?;
//!     Ok(())
//! }));
//!
//! // Later, from anywhere holding the middleware:
//! session.set_ttl(Some(60));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};
use weft_core::{
    BoxFuture, BoxedMiddleware, Context, Middleware, MiddlewareResult, Next, SharedClock,
    SystemClock,
};

use crate::error::{SessionError, SessionResult};
use crate::handle::SessionHandle;
use crate::record::{SessionRecord, StoredSession};
use crate::store::{MemoryStore, SessionStore};

/// The default context property sessions are bound under.
pub const DEFAULT_PROPERTY: &str = "session";

type KeyFn = dyn Fn(&Context) -> Option<String> + Send + Sync;

/// What a session middleware bound onto a context.
#[derive(Debug)]
pub enum SessionBinding {
    /// The record for this update.
    Available(Arc<SessionHandle>),
    /// The update has no session key.
    Unavailable,
}

/// The default key: `"{from.id}:{chat.id}"`.
pub fn default_key(ctx: &Context) -> Option<String> {
    let from = ctx.sender()?;
    let chat = ctx.chat()?;
    Some(format!("{}:{}", from.id, chat.id))
}

/// Loads a keyed record before the chain runs and saves it afterwards.
///
/// Cloning is cheap and clones share the TTL, so [`set_ttl`](Self::set_ttl)
/// on any clone affects middleware already built from it.
#[derive(Clone)]
pub struct SessionMiddleware {
    store: Arc<dyn SessionStore>,
    key_fn: Arc<KeyFn>,
    property: Arc<str>,
    /// TTL in milliseconds; `0` disables expiry.
    ttl_ms: Arc<AtomicU64>,
    clock: SharedClock,
}

impl Default for SessionMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMiddleware {
    /// Creates a session middleware over a fresh [`MemoryStore`].
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    /// Creates a session middleware over `store`.
    pub fn with_store(store: impl SessionStore + 'static) -> Self {
        Self::with_shared_store(Arc::new(store))
    }

    /// Creates a session middleware over a store shared with other code.
    pub fn with_shared_store(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            key_fn: Arc::new(default_key),
            property: Arc::from(DEFAULT_PROPERTY),
            ttl_ms: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the key derivation. `None` or an empty key means no session.
    pub fn key_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> Option<String> + Send + Sync + 'static,
    {
        self.key_fn = Arc::new(f);
        self
    }

    /// Sets the context property the session is bound under.
    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Arc::from(property.into());
        self
    }

    /// Sets the TTL in seconds; `0` disables expiry.
    pub fn ttl_secs(self, secs: u64) -> Self {
        self.set_ttl(Some(secs));
        self
    }

    /// Sets the clock used for expiry.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Changes the TTL at runtime. Only saves made afterwards use it.
    pub fn set_ttl(&self, secs: Option<u64>) {
        let ms = secs.unwrap_or(0).saturating_mul(1000);
        self.ttl_ms.store(ms, Ordering::Relaxed);
    }

    /// Returns the TTL in milliseconds, if expiry is enabled.
    pub fn ttl_ms(&self) -> Option<u64> {
        match self.ttl_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    pub fn property_name(&self) -> &str {
        &self.property
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Returns the session middleware.
    pub fn middleware(&self) -> BoxedMiddleware {
        BoxedMiddleware::new(self.clone())
    }

    async fn load(&self, key: &str) -> SessionResult<SessionRecord> {
        let now = self.clock.now_ms();
        Ok(match self.store.get(key).await? {
            Some(stored) if stored.is_expired(now) => {
                debug!(key, property = %self.property, "session expired, starting empty");
                SessionRecord::default()
            }
            Some(stored) => stored.session,
            None => SessionRecord::default(),
        })
    }

    async fn run(self, ctx: Arc<Context>, next: Next) -> MiddlewareResult {
        let key = (self.key_fn)(&ctx).filter(|key| !key.is_empty());
        let Some(key) = key else {
            trace!(property = %self.property, "no session key for update");
            ctx.bind_slot(self.property.as_ref(), Arc::new(SessionBinding::Unavailable));
            return next.run(ctx).await;
        };

        let started = self.clock.now_ms();
        let record = self.load(&key).await?;
        let handle = Arc::new(SessionHandle::new(self.property.as_ref(), key.as_str(), record));
        ctx.bind_slot(
            self.property.as_ref(),
            Arc::new(SessionBinding::Available(Arc::clone(&handle))),
        );

        next.run(ctx).await?;

        let expires = self.ttl_ms().map(|ttl| started.saturating_add(ttl));
        let session = handle.seal();
        self.store
            .set(&key, StoredSession::new(session, expires))
            .await?;
        trace!(key, property = %self.property, ?expires, "session saved");
        Ok(())
    }
}

impl Middleware for SessionMiddleware {
    fn call(&self, ctx: Arc<Context>, next: Next) -> BoxFuture<'static, MiddlewareResult> {
        Box::pin(self.clone().run(ctx, next))
    }
}

impl std::fmt::Debug for SessionMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMiddleware")
            .field("property", &self.property)
            .field("ttl_ms", &self.ttl_ms())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Context access
// =============================================================================

/// Session access on a [`Context`].
pub trait SessionContextExt {
    /// Returns the session bound under the default property.
    fn session(&self) -> SessionResult<Arc<SessionHandle>>;

    /// Returns the session bound under `property`.
    fn session_named(&self, property: &str) -> SessionResult<Arc<SessionHandle>>;

    /// Returns `true` if a session with a key is bound under `property`.
    fn has_session(&self, property: &str) -> bool {
        self.session_named(property).is_ok()
    }
}

impl SessionContextExt for Context {
    fn session(&self) -> SessionResult<Arc<SessionHandle>> {
        self.session_named(DEFAULT_PROPERTY)
    }

    fn session_named(&self, property: &str) -> SessionResult<Arc<SessionHandle>> {
        let binding = self
            .slot_as::<SessionBinding>(property)
            .ok_or_else(|| SessionError::NotInstalled(property.to_string()))?;
        match binding.as_ref() {
            SessionBinding::Available(handle) => Ok(Arc::clone(handle)),
            SessionBinding::Unavailable => Err(SessionError::KeyUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::time::Duration;
    use weft_core::{ManualClock, Update, handler_fn, middleware_fn};
    use weft_framework::compose;

    fn ctx(from: i64, chat: i64) -> Arc<Context> {
        let update: Update = serde_json::from_value(json!({
            "update_id": 1,
            "message": {
                "message_id": 1,
                "from": { "id": from, "first_name": "Ada" },
                "chat": { "id": chat, "type": "private" },
                "text": "hi"
            }
        }))
        .unwrap();
        Arc::new(Context::detached(update))
    }

    /// Increments `count` and records what it saw before incrementing.
    fn counter(seen: &Arc<Mutex<Vec<i64>>>, property: &'static str) -> BoxedMiddleware {
        let seen = Arc::clone(seen);
        middleware_fn(move |ctx, next| {
            let seen = Arc::clone(&seen);
            async move {
                let session = ctx.session_named(property)?;
                let count = session.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
                seen.lock().push(count);
                session.set("count", json!(count + 1));
                next.run(ctx).await
            }
        })
    }

    async fn dispatch(chain: &BoxedMiddleware, ctx: Arc<Context>) {
        chain.call(ctx, Next::noop()).await.unwrap();
    }

    #[tokio::test]
    async fn test_same_key_shares_record() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain = compose(vec![SessionMiddleware::new().middleware(), counter(&seen, "session")]);

        dispatch(&chain, ctx(1, 1)).await;
        dispatch(&chain, ctx(1, 1)).await;
        dispatch(&chain, ctx(2, 1)).await;
        assert_eq!(*seen.lock(), vec![0, 1, 0]);
    }

    #[tokio::test]
    async fn test_ttl_expiry_resets_record() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let session = SessionMiddleware::new().ttl_secs(10).clock(clock.clone());
        let chain = compose(vec![session.middleware(), counter(&seen, "session")]);

        dispatch(&chain, ctx(1, 1)).await;
        clock.advance(Duration::from_secs(9));
        dispatch(&chain, ctx(1, 1)).await;
        clock.advance(Duration::from_secs(10));
        dispatch(&chain, ctx(1, 1)).await;
        assert_eq!(*seen.lock(), vec![0, 1, 0]);
    }

    #[tokio::test]
    async fn test_runtime_ttl_change_applies_to_later_saves() {
        let clock = Arc::new(ManualClock::new(5_000));
        let store = Arc::new(MemoryStore::new());
        let session = SessionMiddleware::with_shared_store(store.clone()).clock(clock.clone());
        let chain = compose(vec![session.middleware(), counter(&Arc::default(), "session")]);

        dispatch(&chain, ctx(1, 1)).await;
        let stored = crate::store::SyncSessionStore::get(store.as_ref(), "1:1").unwrap().unwrap();
        assert_eq!(stored.expires, None);

        session.set_ttl(Some(2));
        dispatch(&chain, ctx(1, 1)).await;
        let stored = crate::store::SyncSessionStore::get(store.as_ref(), "1:1").unwrap().unwrap();
        assert_eq!(stored.expires, Some(7_000));
        assert_eq!(stored.session.data["count"], json!(2));
    }

    #[tokio::test]
    async fn test_missing_key_fails_loudly_but_chain_proceeds() {
        let outcome = Arc::new(Mutex::new(None));
        let reached = Arc::new(Mutex::new(false));
        let (o, r) = (Arc::clone(&outcome), Arc::clone(&reached));
        let observer = middleware_fn(move |ctx, next| {
            let (o, r) = (Arc::clone(&o), Arc::clone(&r));
            async move {
                *o.lock() = Some(matches!(ctx.session(), Err(SessionError::KeyUnavailable)));
                *r.lock() = true;
                next.run(ctx).await
            }
        });
        let chain = compose(vec![SessionMiddleware::new().middleware(), observer]);
        let update: Update = serde_json::from_str(r#"{"update_id": 9}"#).unwrap();
        dispatch(&chain, Arc::new(Context::detached(update))).await;

        assert_eq!(*outcome.lock(), Some(true));
        assert!(*reached.lock());
    }

    #[tokio::test]
    async fn test_not_installed() {
        let ctx = ctx(1, 1);
        assert!(matches!(ctx.session(), Err(SessionError::NotInstalled(p)) if p == "session"));
        assert!(!ctx.has_session("session"));
    }

    #[tokio::test]
    async fn test_stacked_sessions_do_not_collide() {
        let seen_user = Arc::new(Mutex::new(Vec::new()));
        let seen_chat = Arc::new(Mutex::new(Vec::new()));
        let per_user = SessionMiddleware::new()
            .property("user")
            .key_fn(|ctx| ctx.sender().map(|u| u.id.to_string()));
        let per_chat = SessionMiddleware::new()
            .property("chat")
            .key_fn(|ctx| ctx.chat().map(|c| c.id.to_string()));
        let chain = compose(vec![
            per_user.middleware(),
            per_chat.middleware(),
            counter(&seen_user, "user"),
            counter(&seen_chat, "chat"),
        ]);

        dispatch(&chain, ctx(1, 100)).await;
        dispatch(&chain, ctx(2, 100)).await;
        dispatch(&chain, ctx(1, 200)).await;
        assert_eq!(*seen_user.lock(), vec![0, 0, 1]);
        assert_eq!(*seen_chat.lock(), vec![0, 1, 0]);
    }

    #[tokio::test]
    async fn test_failed_dispatch_skips_save() {
        let store = Arc::new(MemoryStore::new());
        let fail = handler_fn(|ctx| async move {
            ctx.session()?.set("lost", Value::Bool(true));
            Err("handler failed".into())
        });
        let chain = compose(vec![SessionMiddleware::with_shared_store(store.clone()).middleware(), fail]);
        assert!(chain.call(ctx(1, 1), Next::noop()).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_write_after_save_is_flagged() {
        let kept: Arc<Mutex<Option<Arc<SessionHandle>>>> = Arc::default();
        let slot = Arc::clone(&kept);
        let keep = handler_fn(move |ctx| {
            let slot = Arc::clone(&slot);
            async move {
                *slot.lock() = Some(ctx.session()?);
                Ok(())
            }
        });
        let store = Arc::new(MemoryStore::new());
        let chain = compose(vec![SessionMiddleware::with_shared_store(store.clone()).middleware(), keep]);
        dispatch(&chain, ctx(1, 1)).await;

        let handle = kept.lock().clone().unwrap();
        assert!(handle.is_sealed());
        handle.set("late", json!(1));
        assert_eq!(handle.late_writes(), 1);
        assert_eq!(handle.get("late"), Some(json!(1)));
        let stored = crate::store::SyncSessionStore::get(store.as_ref(), "1:1").unwrap().unwrap();
        assert!(!stored.session.data.contains_key("late"));
    }
}
