//! Weft Runtime - the layer that turns a middleware chain into a running bot.
//!
//! This crate provides:
//! - Layered configuration (`WeftConfig`, `ConfigLoader`)
//! - Logging setup on `tracing-subscriber` (`LoggingBuilder`)
//! - The dispatch loop (`Runtime`), with per-update deadlines, bounded
//!   concurrency and graceful shutdown
//!
//! ```rust,ignore
//! use weft_runtime::Runtime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = Runtime::builder()
//!         .outbound(client)
//!         .error_handler(report)
//!         .push(bot)
//!         .build()?;
//!
//!     // Run until the stream ends or Ctrl+C
//!     runtime.run_until_signal(updates).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, DispatchConfig, LoggingConfig, Profile,
    ScenesConfig, SessionConfig, WeftConfig, load_config, load_config_from_file,
    validate_config,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, LoggingError, SpanEvents, init_from_config};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeStats};

pub use tokio_util::sync::CancellationToken;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
