//! Reconnection policy for dropped project channels.
//!
//! After an unexpected closure the manager bumps the record's attempt
//! counter and asks [`ReconnectConfig::next_step`] what to do. Attempts
//! are bounded; once the bound is exceeded the record is abandoned and
//! only an explicit `connect` brings the project back.
//!
//! The default delay is fixed. A multiplier above `1.0` turns it into
//! exponential backoff clamped at [`ReconnectConfig::max_delay`].

use std::time::Duration;

/// Tunable parameters for the reconnection strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Number of consecutive failed attempts tolerated before giving up.
    pub max_attempts: u32,
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(30),
            multiplier: 1.0,
        }
    }
}

/// What to do after the `attempt`-th consecutive drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStep {
    /// Try again after this delay.
    Retry(Duration),
    /// Attempts are exhausted.
    GiveUp,
}

impl ReconnectConfig {
    /// Decide the next step for an attempt counter that has already
    /// been incremented for the current drop (so the first drop is `1`).
    pub fn next_step(&self, attempt: u32) -> ReconnectStep {
        if attempt == 0 || attempt > self.max_attempts {
            return ReconnectStep::GiveUp;
        }
        ReconnectStep::Retry(self.delay_for(attempt))
    }

    /// Delay before the `attempt`-th retry (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 1..attempt {
            delay = next_delay(delay, self);
            if delay == self.max_delay {
                break;
            }
        }
        delay
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}
