//! Rate limiting of recoverable warnings
//!
//! One warning per kind per `min_interval`. Warnings suppressed in between
//! are counted and reported with the next one that gets through.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use syncstream_core::{SyncError, Timestamp};

/// Warning rate-limit configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WarningConfig {
    /// Minimum time between two warnings of one kind; zero disables limiting
    pub min_interval: Duration,
}

impl Default for WarningConfig {
    fn default() -> Self {
        WarningConfig {
            min_interval: Duration::from_secs(1),
        }
    }
}

impl WarningConfig {
    /// Every warning is logged
    pub fn unlimited() -> Self {
        WarningConfig {
            min_interval: Duration::ZERO,
        }
    }
}

/// Kinds of recoverable warnings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WarningKind {
    BehindSchedule,
    LateCommand,
    DroppedSamples,
    StaleCommand,
    ChannelUnavailable,
}

impl WarningKind {
    /// Kind of a recoverable error, `None` for errors that are not warnings
    pub fn of(error: &SyncError) -> Option<Self> {
        match error {
            SyncError::SchedulingBehind { .. } => Some(WarningKind::BehindSchedule),
            SyncError::LateCommand { .. } => Some(WarningKind::LateCommand),
            SyncError::DuplicateOrStaleCommand { .. } => Some(WarningKind::StaleCommand),
            SyncError::ChannelUnavailable(_) => Some(WarningKind::ChannelUnavailable),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct KindState {
    last_emitted: Option<Timestamp>,
    suppressed: u64,
}

/// Per-kind warning limiter
#[derive(Debug, Default)]
pub struct WarningLimiter {
    config: WarningConfig,
    kinds: HashMap<WarningKind, KindState>,
}

impl WarningLimiter {
    pub fn new(config: WarningConfig) -> Self {
        WarningLimiter {
            config,
            kinds: HashMap::new(),
        }
    }

    /// Whether a warning of `kind` may be logged at `now`
    ///
    /// Returns the number of warnings suppressed since the last one that was
    /// admitted, or `None` if this one is suppressed.
    pub fn admit(&mut self, kind: WarningKind, now: Timestamp) -> Option<u64> {
        let interval = self.config.min_interval.as_secs_f64();
        let state = self.kinds.entry(kind).or_default();
        let due = match state.last_emitted {
            None => true,
            Some(last) => interval <= 0.0 || now.since(last) >= interval,
        };
        if due {
            state.last_emitted = Some(now);
            Some(std::mem::take(&mut state.suppressed))
        } else {
            state.suppressed += 1;
            None
        }
    }

    /// Suppressed warnings of `kind` not yet reported
    pub fn suppressed(&self, kind: WarningKind) -> u64 {
        self.kinds.get(&kind).map_or(0, |s| s.suppressed)
    }
}
