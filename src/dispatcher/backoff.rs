//! Retry delay computation.
//!
//! The per-job backoff policy (fixed or exponential) determines the base
//! delay; process-wide retry settings cap the growth and apply jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::QueueSettings;
use crate::queue::BackoffPolicy;

/// Process-wide retry settings applied on top of the per-job policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Ceiling for computed delays in milliseconds
    pub max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &QueueSettings) -> Self {
        Self {
            max_delay_ms: settings.backoff_max_ms,
            jitter_factor: settings.backoff_jitter.clamp(0.0, 1.0),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_delay_ms: 300_000,
            jitter_factor: 0.1,
        }
    }
}

/// Compute the delay before the `retry`-th retry (1-indexed).
///
/// Fixed policies always yield the base delay; exponential policies yield
/// `base * 2^(retry-1)`. The result is clamped to the configured ceiling
/// before jitter is applied.
pub fn retry_delay(policy: &BackoffPolicy, retry: u32, retry_policy: &RetryPolicy) -> Duration {
    let base = match policy {
        BackoffPolicy::Fixed { base_delay_ms } => *base_delay_ms,
        BackoffPolicy::Exponential { base_delay_ms } => {
            let exponent = retry.saturating_sub(1);
            base_delay_ms.saturating_mul(2u64.saturating_pow(exponent))
        }
    };

    let capped = base.min(retry_policy.max_delay_ms);

    let final_delay = if retry_policy.jitter_factor > 0.0 && capped > 0 {
        let jitter_range = capped as f64 * retry_policy.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..jitter_range);
        (capped as f64 + jitter).max(0.0) as u64
    } else {
        capped
    };

    Duration::from_millis(final_delay)
}
