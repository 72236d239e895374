//! Caller-side retry policy for transient upstream failures.
//!
//! The stages themselves never retry: a failed model call surfaces at once.
//! A caller that wants retries (the [`Gatekeeper`](crate::gate::Gatekeeper)
//! does, when configured) uses [`RetryConfig`] to pace them and
//! [`is_transient`] to decide which errors qualify. 400/401/403 are never
//! retried.

use crate::GateError;
use std::time::Duration;

/// Configuration for caller-side retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = fail immediately).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Scale delays down by a fixed per-attempt factor.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic factors; no RNG dependency.
            let factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Whether an error is worth retrying: rate limits, server errors, and
/// requests that never completed. Configuration and strategy errors never
/// are, nor is a reply that arrived but was unusable, whatever its message
/// says.
pub fn is_transient(error: &GateError) -> bool {
    match error {
        GateError::Upstream {
            status: Some(status),
            ..
        } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
        GateError::Upstream {
            status: None,
            transport,
            ..
        } => *transport,
        _ => false,
    }
}
