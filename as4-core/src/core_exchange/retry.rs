//! Retry policy and cancellation at retry boundaries

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How the wait between attempts evolves
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Backoff {
    /// Same interval before every retry
    #[default]
    Fixed,
    /// `interval * multiplier^(retry - 1)`, capped at `max_interval`
    Exponential {
        multiplier: f64,
        #[serde(with = "humantime_serde")]
        max_interval: Duration,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    pub interval: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            interval,
            backoff: Backoff::Fixed,
        }
    }

    /// A single attempt
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait before retry number `retry` (1-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential {
                multiplier,
                max_interval,
            } => {
                let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
                let secs = self.interval.as_secs_f64() * multiplier.powi(exponent);
                if !secs.is_finite() || secs < 0.0 {
                    return *max_interval;
                }
                Duration::try_from_secs_f64(secs)
                    .map_or(*max_interval, |delay| delay.min(*max_interval))
            }
        }
    }
}

/// Cooperative cancellation, observed only between attempts
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(500));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1)).with_backoff(Backoff::Exponential {
            multiplier: 2.0,
            max_interval: Duration::from_secs(5),
        });
        assert_eq!(policy.delay_for_retry(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_retry(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_retry(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_retry(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for_retry(60), Duration::from_secs(5));
    }

    #[test]
    fn test_no_retry_policy() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(RetryPolicy::new(u32::MAX, Duration::ZERO).max_attempts(), u32::MAX);
    }

    #[test]
    fn test_backoff_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            backoff: Backoff,
        }
        let w: Wrapper = toml::from_str(
            "backoff = { kind = \"exponential\", multiplier = 1.5, max_interval = \"1m\" }",
        )
        .unwrap();
        assert_eq!(
            w.backoff,
            Backoff::Exponential {
                multiplier: 1.5,
                max_interval: Duration::from_secs(60)
            }
        );
        let w: Wrapper = toml::from_str("backoff = { kind = \"fixed\" }").unwrap();
        assert_eq!(w.backoff, Backoff::Fixed);
    }

    #[test]
    fn test_cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
