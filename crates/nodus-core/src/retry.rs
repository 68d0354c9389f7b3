//! Reconnect scheduling for the long-lived sessions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed reconnect delay used by both the task client and the gateway.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;

/// How the delay grows between consecutive failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay every time.
    Fixed,
    /// `delay * factor^(attempt - 1)`, capped at `max_delay_ms`.
    Exponential { factor: f64, max_delay_ms: u64 },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Fixed
    }
}

/// Reconnect policy.
///
/// The default retries forever at a constant 5000 ms interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Base delay before a reconnect attempt.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Maximum consecutive attempts; `None` retries forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Delay growth curve.
    #[serde(default)]
    pub backoff: Backoff,
}

fn default_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_attempts: None,
            backoff: Backoff::Fixed,
        }
    }
}

impl ReconnectPolicy {
    /// Constant delay, unlimited attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay_ms: delay.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Cap the number of consecutive attempts.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Use an exponential curve.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether reconnect attempt number `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt <= max,
            None => true,
        }
    }

    /// Delay before reconnect attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => Duration::from_millis(self.delay_ms),
            Backoff::Exponential {
                factor,
                max_delay_ms,
            } => {
                let exp = attempt.saturating_sub(1).min(63) as i32;
                let scaled = self.delay_ms as f64 * factor.max(1.0).powi(exp);
                let capped = scaled.min(max_delay_ms as f64).max(0.0);
                Duration::from_millis(capped as u64)
            }
        }
    }
}
