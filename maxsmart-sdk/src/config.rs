//! Session configuration

use maxsmart_api::{DispatchConfig, Protocol};
use maxsmart_discovery::DISCOVERY_PORT;
use maxsmart_polling::PollingConfig;
use std::time::Duration;
use thiserror::Error;

/// Per-attempt HTTP deadline in seconds
pub const ENV_HTTP_TIMEOUT: &str = "MAXSMART_HTTP_TIMEOUT";
/// Per-attempt UDP V3 deadline in seconds
pub const ENV_UDP_TIMEOUT: &str = "MAXSMART_UDP_TIMEOUT";
/// Retry count applied to both protocols
pub const ENV_RETRIES: &str = "MAXSMART_RETRIES";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {name}")]
    InvalidEnv { name: String, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Configuration for a [`crate::DeviceSession`]
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Force a protocol instead of probing
    /// Default: None
    pub protocol: Option<Protocol>,

    /// Deadline for the unicast discovery that starts `initialize`
    /// Default: 3 seconds
    pub discovery_timeout: Duration,

    /// Deadline for each protocol probe during `initialize`
    /// Default: 3 seconds
    pub probe_timeout: Duration,

    /// Port the discovery handshake is sent to
    /// Default: 8888
    pub discovery_port: u16,

    /// Port HTTP commands are sent to
    /// Default: 80
    pub http_port: u16,

    /// Port UDP V3 commands are sent to
    /// Default: 8888
    pub udp_port: u16,

    /// Timeouts and retry policies for device commands
    pub dispatch: DispatchConfig,

    /// Polling cadence
    pub polling: PollingConfig,

    /// State reads after a switch command before giving up
    /// Default: 3
    pub verify_attempts: u32,

    /// Pause between state reads that did not show the new state
    /// Default: 0
    pub verify_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            protocol: None,
            discovery_timeout: Duration::from_secs(3),
            probe_timeout: Duration::from_secs(3),
            discovery_port: DISCOVERY_PORT,
            http_port: 80,
            udp_port: DISCOVERY_PORT,
            dispatch: DispatchConfig::default(),
            polling: PollingConfig::default(),
            verify_attempts: 3,
            verify_delay: Duration::ZERO,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `MAXSMART_HTTP_TIMEOUT`, `MAXSMART_UDP_TIMEOUT`
    /// and `MAXSMART_RETRIES`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`SessionConfig::from_env`] with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(timeout) = parse_seconds(&lookup, ENV_HTTP_TIMEOUT)? {
            config.dispatch.http_timeout = timeout;
        }
        if let Some(timeout) = parse_seconds(&lookup, ENV_UDP_TIMEOUT)? {
            config.dispatch.udp_timeout = timeout;
        }
        if let Some(raw) = lookup(ENV_RETRIES) {
            let retries = raw.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_RETRIES.to_string(),
                value: raw.clone(),
            })?;
            config = config.with_retries(retries);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.http_timeout.is_zero() || self.dispatch.udp_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "command timeouts must be greater than zero".to_string(),
            ));
        }
        if self.discovery_timeout.is_zero() || self.probe_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "discovery and probe timeouts must be greater than zero".to_string(),
            ));
        }
        if self.verify_attempts == 0 {
            return Err(ConfigError::Invalid(
                "at least one verification read is required".to_string(),
            ));
        }
        self.polling
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Send every UDP message (handshake and V3 commands) to `port`
    pub fn with_udp_port(mut self, port: u16) -> Self {
        self.discovery_port = port;
        self.udp_port = port;
        self
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Retry count for both protocols, keeping their backoff shapes
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.dispatch.http_retry = self.dispatch.http_retry.with_max_retries(retries);
        self.dispatch.udp_retry = self.dispatch.udp_retry.with_max_retries(retries);
        self
    }

    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    pub fn with_verification(mut self, attempts: u32, delay: Duration) -> Self {
        self.verify_attempts = attempts;
        self.verify_delay = delay;
        self
    }
}

fn parse_seconds<F>(lookup: &F, name: &str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .map(Some)
        .ok_or(ConfigError::InvalidEnv {
            name: name.to_string(),
            value: raw,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.discovery_timeout, Duration::from_secs(3));
        assert_eq!(config.dispatch.http_timeout, Duration::from_secs(10));
        assert_eq!(config.dispatch.udp_timeout, Duration::from_secs(5));
        assert_eq!(config.verify_attempts, 3);
        assert!(config.protocol.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = SessionConfig::from_lookup(lookup(&[
            (ENV_HTTP_TIMEOUT, "2.5"),
            (ENV_UDP_TIMEOUT, "1"),
            (ENV_RETRIES, "5"),
        ]))
        .unwrap();

        assert_eq!(config.dispatch.http_timeout, Duration::from_millis(2500));
        assert_eq!(config.dispatch.udp_timeout, Duration::from_secs(1));
        assert_eq!(config.dispatch.http_retry.max_retries, 5);
        assert_eq!(config.dispatch.udp_retry.max_retries, 5);
        // Backoff shapes survive the override
        assert_eq!(config.dispatch.http_retry.backoff, maxsmart_api::Backoff::Exponential);
        assert_eq!(config.dispatch.udp_retry.backoff, maxsmart_api::Backoff::Linear);
    }

    #[test]
    fn test_env_missing_keeps_defaults() {
        let config = SessionConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_env_rejects_garbage() {
        let err = SessionConfig::from_lookup(lookup(&[(ENV_HTTP_TIMEOUT, "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                name: ENV_HTTP_TIMEOUT.to_string(),
                value: "soon".to_string(),
            }
        );
        assert!(SessionConfig::from_lookup(lookup(&[(ENV_UDP_TIMEOUT, "0")])).is_err());
        assert!(SessionConfig::from_lookup(lookup(&[(ENV_RETRIES, "-1")])).is_err());
    }

    #[test]
    fn test_validate_catches_bad_values() {
        assert!(SessionConfig::default()
            .with_verification(0, Duration::ZERO)
            .validate()
            .is_err());
        assert!(SessionConfig::default()
            .with_polling(PollingConfig::default().with_normal_interval(Duration::ZERO))
            .validate()
            .is_err());
    }

    #[test]
    fn test_udp_port_applies_to_handshake_and_commands() {
        let config = SessionConfig::default().with_udp_port(18888).with_http_port(8080);
        assert_eq!(config.discovery_port, 18888);
        assert_eq!(config.udp_port, 18888);
        assert_eq!(config.http_port, 8080);
    }
}
