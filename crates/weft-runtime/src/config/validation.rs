//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    DispatchConfig, LogOutput, LoggingConfig, ScenesConfig, SessionConfig, WeftConfig,
};

/// Validates the entire configuration.
pub fn validate_config(config: &WeftConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_dispatch_config(&config.dispatch)?;
    validate_session_config(&config.session)?;
    validate_scenes_config(&config.scenes)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::Missing("logging.file_path"));
    }
    if logging.max_files == 0 {
        return Err(ConfigError::invalid("logging.max_files", "must be at least 1"));
    }
    if logging.filters.keys().any(|target| target.trim().is_empty()) {
        return Err(ConfigError::invalid(
            "logging.filters",
            "filter targets cannot be empty",
        ));
    }
    Ok(())
}

fn validate_dispatch_config(dispatch: &DispatchConfig) -> ConfigResult<()> {
    if dispatch.concurrency == 0 {
        return Err(ConfigError::invalid(
            "dispatch.concurrency",
            "must be greater than 0",
        ));
    }
    if let Some(username) = &dispatch.bot_username
        && (username.is_empty() || username.starts_with('@') || username.contains(' '))
    {
        return Err(ConfigError::invalid(
            "dispatch.bot_username",
            format!("{username:?} is not a bare username without '@'"),
        ));
    }
    Ok(())
}

fn validate_session_config(session: &SessionConfig) -> ConfigResult<()> {
    if session.property.trim().is_empty() {
        return Err(ConfigError::Missing("session.property"));
    }
    validate_ttl("session.ttl_secs", session.ttl_secs)
}

fn validate_scenes_config(scenes: &ScenesConfig) -> ConfigResult<()> {
    if scenes
        .default_scene
        .as_deref()
        .is_some_and(|id| id.trim().is_empty())
    {
        return Err(ConfigError::invalid("scenes.default_scene", "cannot be empty"));
    }
    validate_ttl("scenes.ttl_secs", scenes.ttl_secs)
}

fn validate_ttl(field: &'static str, ttl_secs: Option<u64>) -> ConfigResult<()> {
    if ttl_secs == Some(0) {
        return Err(ConfigError::invalid(
            field,
            "must be greater than 0; omit it to disable expiry",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&WeftConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = WeftConfig::default();
        config.dispatch.concurrency = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert_eq!(err.field(), Some("dispatch.concurrency"));
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = WeftConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Missing("logging.file_path"))
        ));
        config.logging.file_path = Some("logs/weft.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_bot_username_with_at_rejected() {
        let mut config = WeftConfig::default();
        config.dispatch.bot_username = Some("@weft_bot".into());
        assert!(validate_config(&config).is_err());
        config.dispatch.bot_username = Some("weft_bot".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = WeftConfig::default();
        config.scenes.ttl_secs = Some(0);
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.field(), Some("scenes.ttl_secs"));
    }
}
