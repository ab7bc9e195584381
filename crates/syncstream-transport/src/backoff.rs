//! Exponential reconnect backoff

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// First delay
    pub base: Duration,
    /// Upper bound on any delay
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            base: Duration::from_millis(100),
            max: Duration::from_secs(5),
        }
    }
}

/// Doubling delay sequence, capped at `max`
#[derive(Clone, Debug)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.base.min(config.max);
        Backoff {
            config,
            current,
            attempts: 0,
        }
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.config.max);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Back to the base delay after a success
    pub fn reset(&mut self) {
        self.current = self.config.base.min(self.config.max);
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::new(BackoffConfig::default())
    }
}
