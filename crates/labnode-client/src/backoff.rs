//! Exponential backoff for reconnection attempts.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Delay schedule for one outage: `base * multiplier^(attempt - 1)`, capped.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    multiplier: f64,
    max_delay: Duration,
    /// Maximum attempts (0 = unlimited).
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            base: config.base_delay,
            multiplier: config.multiplier,
            max_delay: config.max_delay,
            max_attempts: config.max_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempt += 1;

        let exp = self.multiplier.powi(self.attempt.saturating_sub(1) as i32);
        let nanos = (self.base.as_nanos() as f64 * exp).min(self.max_delay.as_nanos() as f64);
        Some(Duration::from_nanos(nanos as u64))
    }

    /// Number of delays handed out so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_attempts > 0 && self.attempt >= self.max_attempts
    }
}
