//! Retry policy and backoff calculation for contended writes.
//!
//! The write executor in `tally-store` owns the loop and the sleeping; this
//! module holds the portable pieces:
//!
//! - [`RetryPolicy`]: attempt bound plus backoff parameters
//! - [`calculate_backoff_delay_with_random`]: exponential backoff with jitter

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default total attempts (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 10;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 500;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.25;

/// Bounded retry parameters for a contended critical section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Total attempts including the first (default: 5).
    pub max_attempts: u32,
    /// Base delay for exponential backoff in ms (default: 10).
    pub base_delay_ms: u64,
    /// Cap on a single delay in ms (default: 500).
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0 (default: 0.25).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether another attempt is allowed after `attempts_made` failures.
    #[must_use]
    pub fn allows_another(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts.max(1)
    }

    /// Delay before retry number `retry` (zero-based), given `random` in `[0, 1)`.
    #[must_use]
    pub fn delay_for(&self, retry: u32, random: f64) -> Duration {
        Duration::from_millis(calculate_backoff_delay_with_random(
            retry,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            random,
        ))
    }
}

/// Exponential backoff with symmetric jitter.
///
/// `min(max_delay, base_delay * 2^attempt) * (1 + (random * 2 - 1) * jitter)`;
/// `random` should come from a PRNG in `[0.0, 1.0)`.
#[must_use]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    // Maps random [0,1) to [-jitter, +jitter]
    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor.clamp(0.0, 1.0);
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay_ms, 10);
        assert_eq!(policy.max_delay_ms, 500);
        assert!((policy.jitter_factor - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn policy_serde_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"maxAttempts": 3}"#).unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 10);
    }

    #[test]
    fn allows_another_counts_first_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(policy.allows_another(1));
        assert!(policy.allows_another(2));
        assert!(!policy.allows_another(3));
    }

    #[test]
    fn zero_attempts_behaves_like_one() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(!policy.allows_another(1));
        assert!(!RetryPolicy::no_retry().allows_another(1));
    }

    #[test]
    fn backoff_with_random_midpoint_is_exact() {
        assert_eq!(calculate_backoff_delay_with_random(0, 10, 500, 0.25, 0.5), 10);
        assert_eq!(calculate_backoff_delay_with_random(1, 10, 500, 0.25, 0.5), 20);
        assert_eq!(calculate_backoff_delay_with_random(3, 10, 500, 0.25, 0.5), 80);
    }

    #[test]
    fn backoff_jitter_bounds() {
        assert_eq!(calculate_backoff_delay_with_random(0, 100, 500, 0.25, 0.0), 75);
        assert_eq!(calculate_backoff_delay_with_random(0, 100, 500, 0.25, 1.0), 125);
    }

    #[test]
    fn backoff_caps_at_max() {
        assert_eq!(calculate_backoff_delay_with_random(20, 10, 500, 0.25, 0.5), 500);
    }

    #[test]
    fn backoff_high_attempt_no_overflow() {
        let delay = calculate_backoff_delay_with_random(100, u64::MAX / 2, 500, 0.25, 0.99);
        assert!(delay <= 625);
    }

    #[test]
    fn delay_for_uses_policy() {
        let policy = RetryPolicy {
            base_delay_ms: 4,
            jitter_factor: 0.0,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(2, 0.3), Duration::from_millis(16));
    }
}
