//! Reconnect backoff.

use std::time::Duration;

/// Exponential backoff settings for reconnect attempts.
///
/// Retries are unbounded; there is deliberately no attempt limit.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Factor applied after each consecutive failure.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
        }
    }
}

/// Backoff state for one run of consecutive connection failures.
///
/// Call [`reset`](Backoff::reset) once a connection succeeds so the next
/// failure starts over from `initial_delay`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    next: Duration,
    attempts: u32,
}

impl Backoff {
    /// Creates backoff state starting at the configured initial delay.
    pub fn new(config: RetryConfig) -> Self {
        let next = config.initial_delay.min(config.max_delay);
        Self {
            config,
            next,
            attempts: 0,
        }
    }

    /// Returns the delay to wait before the next attempt and advances the state.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.attempts = self.attempts.saturating_add(1);
        let grown = Duration::try_from_secs_f64(delay.as_secs_f64() * self.config.multiplier)
            .unwrap_or(self.config.max_delay);
        self.next = grown.min(self.config.max_delay);
        delay
    }

    /// Number of delays handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns to the initial delay.
    pub fn reset(&mut self) {
        self.next = self.config.initial_delay.min(self.config.max_delay);
        self.attempts = 0;
    }
}
