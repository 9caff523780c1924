//! Logging setup for applications embedding the SDK
//!
//! Every crate in the workspace logs through `tracing`; nothing is printed
//! until a subscriber is installed. This module installs one.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Selects the log mode: `silent`, `development` or `debug`
pub const ENV_LOG_MODE: &str = "MAXSMART_LOG_MODE";
/// Filter directive, e.g. `maxsmart_polling=debug`
pub const ENV_LOG_LEVEL: &str = "MAXSMART_LOG_LEVEL";

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed
    Silent,
    /// Compact stderr output at info level
    Development,
    /// Verbose output with source locations
    Debug,
}

impl LoggingMode {
    /// Parse a mode name; unknown names are `None`
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "silent" => Some(LoggingMode::Silent),
            "development" | "dev" => Some(LoggingMode::Development),
            "debug" => Some(LoggingMode::Debug),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid environment variable: {0}")]
    InvalidEnv(String),
}

/// Initialize logging with the specified mode
///
/// Call once, early. A second call fails with [`LoggingError::TracingInit`]
/// because a global subscriber is already set.
///
/// # Environment Variables
///
/// - `MAXSMART_LOG_LEVEL`: filter directive, takes precedence over `RUST_LOG`
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .pretty()
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Initialize logging from `MAXSMART_LOG_MODE`
///
/// Unset means silent. An unknown mode name is an error rather than a guess.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = match std::env::var(ENV_LOG_MODE) {
        Ok(name) => LoggingMode::from_name(&name)
            .ok_or_else(|| LoggingError::InvalidEnv(format!("{}={}", ENV_LOG_MODE, name)))?,
        Err(_) => LoggingMode::Silent,
    };

    init_logging(mode)
}

fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let directives = std::env::var(ENV_LOG_LEVEL)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    EnvFilter::try_new(&directives)
        .map_err(|e| LoggingError::InvalidEnv(format!("{}: {}", directives, e)))
}

/// Check if a global subscriber has been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_mode() {
        assert!(init_logging(LoggingMode::Silent).is_ok());
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(LoggingMode::from_name("debug"), Some(LoggingMode::Debug));
        assert_eq!(LoggingMode::from_name(" Development "), Some(LoggingMode::Development));
        assert_eq!(LoggingMode::from_name("dev"), Some(LoggingMode::Development));
        assert_eq!(LoggingMode::from_name("silent"), Some(LoggingMode::Silent));
        assert_eq!(LoggingMode::from_name("loud"), None);
    }
}
