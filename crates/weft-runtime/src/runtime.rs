//! The dispatch runtime.
//!
//! A [`Runtime`] owns the root chain, the outbound capability and the error
//! handler. It turns each update into a context, runs the chain through a
//! tower service (with the configured deadline) and hands every failure to
//! the error handler:
//!
//! ```text
//! updates ──▶ for_each_concurrent(n) ──▶ Context ──▶ [Timeout] ──▶ chain
//!                                                                   │ Err
//!                                                                   ▼
//!                                                             error handler
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let runtime = Runtime::builder()
//!     .config_file("weft.toml")
//!     .outbound(my_http_client)
//!     .error_handler(|err, ctx: Arc<Context>| async move {
//!         tracing::error!(update = ctx.update().update_id, error = %err, "unhandled");
//!     })
//!     .push(SessionMiddleware::new())
//!     .push(bot)
//!     .build()?;
//!
//! runtime.run_until_signal(updates).await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;
use tower::util::BoxCloneSyncService;
use tower::{ServiceBuilder, ServiceExt};
use tracing::{Instrument, Level, debug, error, info, span, warn};
use weft_core::{
    BoxError, BoxedErrorHandler, BoxedOutbound, Context, ErrorHandler, IntoMiddleware, Outbound,
    Update,
};
use weft_framework::{BoxedDispatchService, ChainService, Composer};

use crate::config::{ConfigLoader, WeftConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Updates dispatched so far.
    pub dispatched: u64,
    /// Dispatches that ended in an error.
    pub failed: u64,
}

/// Runs a middleware chain over a stream of updates.
pub struct Runtime {
    config: WeftConfig,
    service: BoxedDispatchService,
    outbound: BoxedOutbound,
    error_handler: BoxedErrorHandler,
    dispatched: AtomicU64,
    failed: AtomicU64,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &WeftConfig {
        &self.config
    }

    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Creates the context for one update.
    pub fn context(&self, update: Update) -> Arc<Context> {
        let ctx = Context::new(update, Arc::clone(&self.outbound));
        Arc::new(match &self.config.dispatch.bot_username {
            Some(username) => ctx.with_bot_username(username.clone()),
            None => ctx,
        })
    }

    /// Dispatches one update. Returns `false` if the chain failed, in which
    /// case the error handler has already run.
    pub async fn handle_update(&self, update: Update) -> bool {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            update_id = update.update_id,
            update_type = %update.type_name()
        );
        self.dispatch(update).instrument(span).await
    }

    async fn dispatch(&self, update: Update) -> bool {
        let ctx = self.context(update);
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        match self.service.clone().oneshot(Arc::clone(&ctx)).await {
            Ok(()) => {
                debug!("dispatch complete");
                true
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                let err = self.classify(err);
                warn!(error = %err, "dispatch failed");
                self.error_handler.handle(err, ctx).await;
                false
            }
        }
    }

    fn classify(&self, err: BoxError) -> BoxError {
        match self.config.dispatch.timeout() {
            Some(deadline) if err.is::<Elapsed>() => RuntimeError::Timeout(deadline).into(),
            _ => err,
        }
    }

    /// Dispatches `updates` until the stream ends or `shutdown` is
    /// cancelled. Dispatches already started are allowed to finish.
    pub async fn run<S>(&self, updates: S, shutdown: CancellationToken) -> RuntimeStats
    where
        S: Stream<Item = Update> + Send,
    {
        let concurrency = self.config.dispatch.concurrency;
        info!(concurrency, "weft runtime started");

        updates
            .take_until(shutdown.cancelled())
            .for_each_concurrent(concurrency, |update| async move {
                self.handle_update(update).await;
            })
            .await;

        let stats = self.stats();
        info!(
            dispatched = stats.dispatched,
            failed = stats.failed,
            "weft runtime stopped"
        );
        stats
    }

    /// Like [`run`](Self::run), stopping on Ctrl+C or SIGTERM.
    pub async fn run_until_signal<S>(&self, updates: S) -> RuntimeStats
    where
        S: Stream<Item = Update> + Send,
    {
        let shutdown = CancellationToken::new();
        let mut run = std::pin::pin!(self.run(updates, shutdown.clone()));
        tokio::select! {
            stats = &mut run => return stats,
            () = wait_for_shutdown() => shutdown.cancel(),
        }
        run.await
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(err) => {
                warn!(error = %err, "Failed to register SIGTERM handler");
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

fn dispatch_service(chain: Composer, timeout: Option<Duration>) -> BoxedDispatchService {
    let chain = ChainService::new(chain);
    match timeout {
        Some(deadline) => BoxCloneSyncService::new(
            ServiceBuilder::new()
                .layer(TimeoutLayer::new(deadline))
                .service(chain),
        ),
        None => chain.boxed(),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`Runtime`].
///
/// An outbound capability and an error handler are required; everything
/// else has a default.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<WeftConfig>,
    chain: Composer,
    outbound: Option<BoxedOutbound>,
    error_handler: Option<BoxedErrorHandler>,
    init_logging: bool,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            chain: Composer::new(),
            outbound: None,
            error_handler: None,
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Uses `config` as is instead of loading one.
    pub fn config(mut self, config: WeftConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Appends a unit to the root chain.
    pub fn push(mut self, unit: impl IntoMiddleware) -> Self {
        self.chain.push(unit);
        self
    }

    pub fn outbound(self, outbound: impl Outbound + 'static) -> Self {
        self.shared_outbound(Arc::new(outbound))
    }

    pub fn shared_outbound(mut self, outbound: BoxedOutbound) -> Self {
        self.outbound = Some(outbound);
        self
    }

    /// Sets the handler every dispatch failure is routed to.
    pub fn error_handler(mut self, handler: impl ErrorHandler) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Whether `build()` installs the global subscriber (default: yes).
    pub fn init_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> RuntimeResult<Runtime> {
        let error_handler = self.error_handler.ok_or(RuntimeError::MissingErrorHandler)?;
        let outbound = self.outbound.ok_or(RuntimeError::MissingOutbound)?;
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let service = dispatch_service(self.chain, config.dispatch.timeout());
        info!(
            log_level = %config.logging.level,
            concurrency = config.dispatch.concurrency,
            timeout_ms = config.dispatch.timeout_ms,
            "Runtime initialized from configuration"
        );

        Ok(Runtime {
            config,
            service,
            outbound,
            error_handler,
            dispatched: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::sync::atomic::AtomicUsize;
    use weft_core::{ApiResult, handler_fn};
    use weft_framework::reply;

    #[derive(Debug, Default)]
    struct RecordingOutbound {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl Outbound for RecordingOutbound {
        async fn call_api(&self, method: &str, params: Value) -> ApiResult<Value> {
            self.calls.lock().push((method.to_string(), params));
            Ok(json!({ "ok": true }))
        }
    }

    fn message(update_id: i64, text: &str) -> Update {
        serde_json::from_value(json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "from": { "id": 7, "first_name": "Ada" },
                "chat": { "id": 7, "type": "private" },
                "text": text
            }
        }))
        .unwrap()
    }

    fn command_update(update_id: i64, text: &str) -> Update {
        let mut update = message(update_id, text);
        if let Some(msg) = update.message.as_mut() {
            msg.entities = serde_json::from_value(json!([{
                "type": "bot_command",
                "offset": 0,
                "length": text.encode_utf16().count()
            }]))
            .unwrap();
        }
        update
    }

    fn ignore_errors(_err: BoxError, _ctx: Arc<Context>) -> futures::future::Ready<()> {
        futures::future::ready(())
    }

    fn builder() -> RuntimeBuilder {
        Runtime::builder()
            .config(WeftConfig::default())
            .init_logging(false)
    }

    #[test]
    fn test_build_requires_error_handler() {
        let err = builder()
            .outbound(RecordingOutbound::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::MissingErrorHandler));
    }

    #[test]
    fn test_build_requires_outbound() {
        let err = builder().error_handler(ignore_errors).build().unwrap_err();
        assert!(matches!(err, RuntimeError::MissingOutbound));
    }

    #[test]
    fn test_build_validates_config() {
        let mut config = WeftConfig::default();
        config.dispatch.concurrency = 0;
        let err = builder()
            .config(config)
            .outbound(RecordingOutbound::default())
            .error_handler(ignore_errors)
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[tokio::test]
    async fn test_failures_reach_error_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let runtime = builder()
            .outbound(RecordingOutbound::default())
            .error_handler(move |err: BoxError, ctx: Arc<Context>| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push((ctx.update().update_id, err.to_string()));
                }
            })
            .push(handler_fn(|_ctx| async { Err("boom".into()) }))
            .build()
            .unwrap();

        assert!(!runtime.handle_update(message(3, "hi")).await);
        assert_eq!(*seen.lock(), vec![(3, "boom".to_string())]);
        assert_eq!(runtime.stats(), RuntimeStats { dispatched: 1, failed: 1 });
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_runtime_error() {
        let timed_out = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&timed_out);
        let mut config = WeftConfig::default();
        config.dispatch.timeout_ms = 20;

        let runtime = builder()
            .config(config)
            .outbound(RecordingOutbound::default())
            .error_handler(move |err: BoxError, _ctx: Arc<Context>| {
                let counter = Arc::clone(&counter);
                async move {
                    if let Some(RuntimeError::Timeout(deadline)) = err.downcast_ref::<RuntimeError>() {
                        assert_eq!(*deadline, Duration::from_millis(20));
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
            .push(handler_fn(|_ctx| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }))
            .build()
            .unwrap();

        assert!(!runtime.handle_update(message(1, "slow")).await);
        assert_eq!(timed_out.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_dispatches_whole_stream() {
        let outbound = Arc::new(RecordingOutbound::default());
        let runtime = builder()
            .shared_outbound(outbound.clone())
            .error_handler(ignore_errors)
            .push(reply("pong"))
            .build()
            .unwrap();

        let updates = futures::stream::iter((1..=3).map(|id| message(id, "ping")));
        let stats = runtime.run(updates, CancellationToken::new()).await;

        assert_eq!(stats, RuntimeStats { dispatched: 3, failed: 0 });
        let calls = outbound.calls.lock();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(method, params)| {
            method == "sendMessage" && params["chat_id"] == json!(7) && params["text"] == json!("pong")
        }));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let runtime = builder()
            .outbound(RecordingOutbound::default())
            .error_handler(ignore_errors)
            .build()
            .unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let stats = runtime
            .run(futures::stream::pending::<Update>(), shutdown)
            .await;
        assert_eq!(stats.dispatched, 0);
    }

    #[tokio::test]
    async fn test_bot_username_from_config() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let mut config = WeftConfig::default();
        config.dispatch.bot_username = Some("weft_bot".into());

        let mut bot = Composer::new();
        bot.command(
            "start",
            handler_fn(move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
        );
        let runtime = builder()
            .config(config)
            .outbound(RecordingOutbound::default())
            .error_handler(ignore_errors)
            .push(bot)
            .build()
            .unwrap();

        assert!(runtime.handle_update(command_update(1, "/start@weft_bot")).await);
        assert!(runtime.handle_update(command_update(2, "/start@other_bot")).await);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
