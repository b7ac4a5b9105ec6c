// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retry configuration, backoff computation, and per-attempt metadata.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an exponential-backoff retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial attempt. `0`
    /// means only the initial attempt (no retries).
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    /// Maximum delay cap for exponential backoff.
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Overall wall-clock timeout across all attempts.
    #[serde(with = "duration_millis")]
    pub overall_timeout: Duration,
    /// Jitter factor in `[0.0, 1.0]`. `0` disables jitter, `1` applies up
    /// to the full nominal delay.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            overall_timeout: Duration::from_secs(60),
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    /// The subscriber's immediate retry policy: three attempts, doubling
    /// from one second, no jitter, no effective overall cap — the periodic
    /// fallback timer is driven separately once this is exhausted.
    #[must_use]
    pub fn subscriber_immediate() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            overall_timeout: Duration::from_secs(3600 * 24 * 365),
            jitter_factor: 0.0,
        }
    }

    /// The transport's reconnect policy: doubling from one second up to a
    /// thirty-second ceiling.
    #[must_use]
    pub fn transport_reconnect() -> Self {
        Self {
            max_retries: u32::MAX,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            overall_timeout: Duration::from_secs(3600 * 24 * 365),
            jitter_factor: 0.0,
        }
    }

    /// The send queue's per-message retry policy: 100ms doubling, capped
    /// at thirty seconds.
    #[must_use]
    pub fn send_queue() -> Self {
        Self {
            max_retries: u32::MAX,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            overall_timeout: Duration::from_secs(3600 * 24 * 365),
            jitter_factor: 0.0,
        }
    }
}

/// Serde helper — `Duration` as integer milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(val: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        val.as_millis().serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms: u64 = u64::deserialize(de)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Record of a single failed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// Zero-indexed attempt number.
    pub attempt: u32,
    /// Error message from this attempt.
    pub error: String,
    /// Backoff delay applied before the next attempt.
    #[serde(with = "duration_millis")]
    pub delay: Duration,
}

/// Metadata captured across all retry attempts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryMetadata {
    /// Total number of attempts made (including the successful one, if
    /// any). The original attempt's counter is never reset across a
    /// re-queue — only a fresh operation starts a new [`RetryMetadata`].
    pub total_attempts: u32,
    /// Records of each failed attempt.
    pub failed_attempts: Vec<RetryAttempt>,
    /// Wall-clock time spanning all attempts so far.
    #[serde(with = "duration_millis")]
    pub total_duration: Duration,
}

/// The outcome of a retry-enabled operation that eventually succeeded.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// The successfully produced value.
    pub value: T,
    /// Retry metadata; `failed_attempts` is empty when the first attempt
    /// succeeds.
    pub metadata: RetryMetadata,
}

/// Compute the backoff delay for a zero-indexed attempt number: base delay
/// doubled `attempt` times, capped at `max_delay`, then randomized down by
/// up to `jitter_factor` of the capped value.
#[must_use]
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let delay_ms = (config.base_delay.as_millis() as u64).saturating_mul(exp);
    let capped_ms = delay_ms.min(config.max_delay.as_millis() as u64);

    let jitter_factor = config.jitter_factor.clamp(0.0, 1.0);
    if jitter_factor > 0.0 && capped_ms > 0 {
        let jitter_range = (capped_ms as f64 * jitter_factor) as u64;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };
        Duration::from_millis(capped_ms.saturating_sub(jitter))
    } else {
        Duration::from_millis(capped_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_until_the_cap() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            overall_timeout: Duration::from_secs(60),
            jitter_factor: 0.0,
        };
        assert_eq!(compute_delay(&config, 0), Duration::from_secs(1));
        assert_eq!(compute_delay(&config, 1), Duration::from_secs(2));
        assert_eq!(compute_delay(&config, 2), Duration::from_secs(4));
        assert_eq!(compute_delay(&config, 3), Duration::from_secs(4));
    }

    #[test]
    fn jitter_never_exceeds_the_nominal_delay() {
        let config = RetryConfig {
            jitter_factor: 1.0,
            ..RetryConfig::default()
        };
        for attempt in 0..5 {
            let nominal = compute_delay(
                &RetryConfig {
                    jitter_factor: 0.0,
                    ..config.clone()
                },
                attempt,
            );
            let jittered = compute_delay(&config, attempt);
            assert!(jittered <= nominal);
        }
    }

    #[test]
    fn send_queue_policy_starts_at_one_hundred_millis() {
        let config = RetryConfig::send_queue();
        assert_eq!(compute_delay(&config, 0), Duration::from_millis(100));
        assert_eq!(compute_delay(&config, 1), Duration::from_millis(200));
    }
}
