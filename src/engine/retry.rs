//! Retry policy: backoff delays and per-item attempt budgets.

use std::time::Duration;

use rand::Rng;

/// How workers react to failed iterations.
///
/// Backoff is exponential (`base_delay * multiplier^(n-1)`, capped at
/// `max_delay`) with equal jitter: half the delay is fixed, the other half
/// is drawn uniformly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Consecutive failures of the same queue item before it is dead-lettered.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next iteration after `failures` consecutive failed
    /// iterations (1-indexed; 0 is treated as 1).
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(30) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());

        if !self.jitter || capped <= 0.0 {
            return Duration::from_secs_f64(capped.max(0.0));
        }
        let half = capped / 2.0;
        Duration::from_secs_f64(half + rand::thread_rng().gen_range(0.0..=half))
    }

    /// Has an item that failed `attempts` times used up its budget?
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Counts consecutive failures of the item at the head of a queue.
///
/// A failed iteration aborts its transaction, so the same item comes back
/// next time; only the most recent item needs tracking.
#[derive(Debug, Default)]
pub(crate) struct AttemptTracker {
    current: Option<(String, u32)>,
}

impl AttemptTracker {
    /// Record a failure for `item` and return its attempt count so far.
    pub fn record_failure(&mut self, item: &str) -> u32 {
        match &mut self.current {
            Some((tracked, attempts)) if tracked == item => {
                *attempts += 1;
                *attempts
            }
            _ => {
                self.current = Some((item.to_string(), 1));
                1
            }
        }
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}
