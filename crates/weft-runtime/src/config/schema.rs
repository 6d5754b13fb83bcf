//! Configuration schema definitions.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "pretty"
//!
//! [logging.filters]
//! weft_session = "trace"
//!
//! [dispatch]
//! concurrency = 8
//! timeout_ms = 10000
//! bot_username = "weft_bot"
//!
//! [session]
//! ttl_secs = 86400
//!
//! [scenes]
//! ttl_secs = 600
//! default_scene = "lobby"
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use weft_scenes::StageOptions;
use weft_session::{DEFAULT_PROPERTY, SessionMiddleware};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeftConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub scenes: ScenesConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Newline-delimited JSON. Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// A rolling file under `file_path`.
    File,
}

/// How often file output starts a new file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids in log lines.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line in log lines.
    #[serde(default)]
    pub file_location: bool,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Rotated files to keep.
    #[serde(default = "default_max_files")]
    pub max_files: u32,

    /// Per-target levels, e.g. `weft_session = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            filters: HashMap::new(),
        }
    }
}

fn default_max_files() -> u32 {
    5
}

// =============================================================================
// Dispatch
// =============================================================================

/// Update dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Updates dispatched at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-update deadline in milliseconds; `0` disables it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// The bot's own username, for `/command@bot` matching.
    #[serde(default)]
    pub bot_username: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_ms: default_timeout_ms(),
            bot_username: None,
        }
    }
}

impl DispatchConfig {
    /// The per-update deadline, if one is set.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

fn default_concurrency() -> usize {
    16
}

fn default_timeout_ms() -> u64 {
    30000
}

// =============================================================================
// Session and scenes
// =============================================================================

/// Session middleware settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Context property the session is bound under.
    #[serde(default = "default_property")]
    pub property: String,

    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            property: default_property(),
            ttl_secs: None,
        }
    }
}

impl SessionConfig {
    /// Applies these settings to a session middleware.
    pub fn apply(&self, session: SessionMiddleware) -> SessionMiddleware {
        let session = session.property(self.property.clone());
        session.set_ttl(self.ttl_secs);
        session
    }

    /// Builds an in-memory session middleware with these settings.
    pub fn middleware(&self) -> SessionMiddleware {
        self.apply(SessionMiddleware::new())
    }
}

fn default_property() -> String {
    DEFAULT_PROPERTY.to_string()
}

/// Stage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenesConfig {
    /// TTL for scenes that do not set their own.
    #[serde(default)]
    pub ttl_secs: Option<u64>,

    #[serde(default)]
    pub default_scene: Option<String>,
}

impl ScenesConfig {
    /// Builds stage options reading the session bound under
    /// `session_property`.
    pub fn stage_options(&self, session_property: &str) -> StageOptions {
        let mut options = StageOptions::default().session_property(session_property);
        options.ttl_secs = self.ttl_secs;
        options.default_scene.clone_from(&self.default_scene);
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WeftConfig::default();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.dispatch.concurrency, 16);
        assert_eq!(config.dispatch.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.session.property, "session");
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let dispatch = DispatchConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(dispatch.timeout(), None);
    }

    #[test]
    fn test_session_and_stage_settings() {
        let session = SessionConfig {
            property: "chat".into(),
            ttl_secs: Some(60),
        }
        .middleware();
        assert_eq!(session.property_name(), "chat");
        assert_eq!(session.ttl_ms(), Some(60_000));

        let scenes = ScenesConfig {
            ttl_secs: Some(10),
            default_scene: Some("lobby".into()),
        };
        let options = scenes.stage_options("chat");
        assert_eq!(options.session_property, "chat");
        assert_eq!(options.ttl_secs, Some(10));
        assert_eq!(options.default_scene.as_deref(), Some("lobby"));
    }
}
