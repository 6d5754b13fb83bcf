//! Configuration for the weft runtime.
//!
//! [`WeftConfig`] is layered from built-in defaults, `weft.toml` /
//! `weft.yaml` files and `WEFT_*` environment variables by [`ConfigLoader`],
//! then checked by [`validate_config`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DispatchConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, ScenesConfig,
    SessionConfig, SpanEventConfig, WeftConfig,
};
pub use validation::validate_config;
