use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff between attempts of the same chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backoff {
    /// Delay after the first failed attempt.
    pub initial_ms: u64,
    /// Growth factor per further attempt (values below 1.0 are treated as 1.0).
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            multiplier: 2.0,
            max_ms: 30_000,
        }
    }
}

impl Backoff {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let ms = self.initial_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        Duration::from_millis(ms.min(self.max_ms as f64) as u64)
    }
}

/// How often a chunk may be attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per chunk, including the first.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether another attempt may follow `attempts_made` failed ones.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::{Backoff, RetryPolicy};
    use std::time::Duration;

    #[test]
    fn delay_grows_and_caps() {
        let backoff = Backoff {
            initial_ms: 100,
            multiplier: 3.0,
            max_ms: 1000,
        };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(300));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(900));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(1000));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn shrinking_multiplier_is_flat() {
        let backoff = Backoff {
            initial_ms: 50,
            multiplier: 0.5,
            max_ms: 1000,
        };
        assert_eq!(backoff.delay_for(5), Duration::from_millis(50));
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
        assert!(!RetryPolicy::none().allows_retry(1));
    }
}
