//! # Reconnect Backoff
//!
//! `delay = min(max_delay, base_delay * 2^(attempt - 1)) ± jitter`.
//!
//! Jitter spreads clients that share a base delay so a server restart does not
//! trigger a synchronized reconnection storm.

use std::time::Duration;

use rand::Rng;

/// Exponential reconnect delay with proportional jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling of the un-jittered delay.
    pub max_delay: Duration,
    /// Jitter as a fraction of the computed delay, in `[0, 1]`.
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter_ratio: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// The un-jittered delay for the given attempt (1-based; 0 is treated as 1).
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
    }

    /// The delay for the given attempt with random jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.jitter_ratio <= 0.0 {
            return self.base_delay_for(attempt);
        }
        let unit = rand::rng().random_range(-1.0..=1.0);
        self.jittered(attempt, unit)
    }

    /// The delay for `attempt` shifted by `unit` (clamped to `[-1, 1]`) times
    /// the jitter span.
    pub fn jittered(&self, attempt: u32, unit: f64) -> Duration {
        let base = self.base_delay_for(attempt).as_secs_f64();
        let spread = base * self.jitter_ratio * unit.clamp(-1.0, 1.0);
        Duration::from_secs_f64((base + spread).max(0.0))
    }
}
