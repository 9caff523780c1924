use std::time::Duration;

/// How the delay between attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// `base * attempt`
    Linear,
    /// `base * 2^(attempt - 1)`
    Exponential,
}

/// Retry policy for a dispatched command
///
/// `max_retries` counts retries, not attempts: a policy with three retries
/// makes at most four attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::http()
    }
}

impl RetryPolicy {
    /// Create a retry policy with no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    /// Create a retry policy with fixed delays
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Create a retry policy with linearly growing delays
    pub fn linear(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff: Backoff::Linear,
        }
    }

    /// Create a retry policy with exponential backoff
    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff: Backoff::Exponential,
        }
    }

    /// HTTP default: 3 retries, 1s doubling
    pub fn http() -> Self {
        Self::exponential(3, Duration::from_secs(1))
    }

    /// UDP V3 default: 3 retries, 0.5s growing linearly
    pub fn datagram() -> Self {
        Self::linear(3, Duration::from_millis(500))
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Total attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate the delay before retry number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || attempt > self.max_retries {
            return Duration::ZERO;
        }

        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
            Backoff::Exponential => {
                let factor = 2_u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_retry_policy_none() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
    }

    #[test]
    fn test_http_defaults() {
        let policy = RetryPolicy::http();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::ZERO); // Beyond max_retries
    }

    #[test]
    fn test_datagram_defaults() {
        let policy = RetryPolicy::datagram();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(1500));
    }

    #[test]
    fn test_fixed() {
        let policy = RetryPolicy::fixed(2, Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(1), policy.delay_for_attempt(2));
    }

    proptest! {
        #[test]
        fn growing_policies_strictly_increase(
            retries in 2u32..12,
            base_ms in 1u64..5_000,
            exponential in any::<bool>(),
        ) {
            let base = Duration::from_millis(base_ms);
            let policy = if exponential {
                RetryPolicy::exponential(retries, base)
            } else {
                RetryPolicy::linear(retries, base)
            };

            for attempt in 1..retries {
                prop_assert!(policy.delay_for_attempt(attempt) < policy.delay_for_attempt(attempt + 1));
            }
        }
    }
}
