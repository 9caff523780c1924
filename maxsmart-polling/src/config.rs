//! Configuration for the polling engine

use crate::PollingError;
use std::time::Duration;

/// Cadence of the polling loop
///
/// The defaults reproduce the vendor control app: one state read every five
/// seconds, and a burst of four reads two seconds apart after each command.
#[derive(Debug, Clone, PartialEq)]
pub struct PollingConfig {
    /// Interval between polls in normal mode
    /// Default: 5 seconds
    pub normal_interval: Duration,

    /// Interval between polls in burst mode
    /// Default: 2 seconds
    pub burst_interval: Duration,

    /// Number of polls a burst lasts
    /// Default: 4
    pub burst_cycles: u32,

    /// Whether commands may switch the loop into burst mode
    /// Default: true
    pub enable_burst: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            normal_interval: Duration::from_secs(5),
            burst_interval: Duration::from_secs(2),
            burst_cycles: 4,
            enable_burst: true,
        }
    }
}

impl PollingConfig {
    /// Steady polling with no burst mode
    pub fn steady(interval: Duration) -> Self {
        Self {
            normal_interval: interval,
            enable_burst: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), PollingError> {
        if self.normal_interval.is_zero() {
            return Err(PollingError::Configuration(
                "normal interval must be greater than zero".to_string(),
            ));
        }

        if self.enable_burst {
            if self.burst_interval.is_zero() {
                return Err(PollingError::Configuration(
                    "burst interval must be greater than zero".to_string(),
                ));
            }
            if self.burst_interval > self.normal_interval {
                return Err(PollingError::Configuration(
                    "burst interval must not exceed the normal interval".to_string(),
                ));
            }
            if self.burst_cycles == 0 {
                return Err(PollingError::Configuration(
                    "burst must last at least one cycle".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn with_normal_interval(mut self, interval: Duration) -> Self {
        self.normal_interval = interval;
        self
    }

    pub fn with_burst(mut self, interval: Duration, cycles: u32) -> Self {
        self.burst_interval = interval;
        self.burst_cycles = cycles;
        self.enable_burst = true;
        self
    }

    pub fn without_burst(mut self) -> Self {
        self.enable_burst = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_config() {
        let config = PollingConfig::default();
        assert_eq!(config.normal_interval, Duration::from_secs(5));
        assert_eq!(config.burst_interval, Duration::from_secs(2));
        assert_eq!(config.burst_cycles, 4);
        assert!(config.enable_burst);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case(PollingConfig::default().with_normal_interval(Duration::ZERO))]
    #[case(PollingConfig::default().with_burst(Duration::from_secs(10), 4))]
    #[case(PollingConfig::default().with_burst(Duration::ZERO, 4))]
    #[case(PollingConfig::default().with_burst(Duration::from_secs(1), 0))]
    fn test_invalid_configs(#[case] config: PollingConfig) {
        assert!(matches!(config.validate(), Err(PollingError::Configuration(_))));
    }

    #[test]
    fn test_steady_ignores_burst_settings() {
        let config = PollingConfig::steady(Duration::from_secs(1)).with_normal_interval(Duration::from_secs(3));
        assert!(!config.enable_burst);
        assert!(config.validate().is_ok());
    }
}
