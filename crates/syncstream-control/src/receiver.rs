//! Command receiver
//!
//! Polls a `CommandSource` without blocking, in arrival order. Commands that
//! fail the sequence guard are dropped and kept aside for the caller to
//! report.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use syncstream_core::{ControlCommand, SyncError, SyncResult};
use syncstream_time::{ClockOffsetModel, WallClock};
use syncstream_transport::CommandSource;

use crate::SequenceGuard;

/// Receiver configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Translate issue times into the local base using the estimated
    /// per-sender clock offset
    pub correct_clock_offset: bool,
    /// Upper bound on commands taken per poll
    pub max_per_poll: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            correct_clock_offset: false,
            max_per_poll: 64,
        }
    }
}

/// Receiver statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub accepted: u64,
    pub rejected: u64,
}

/// Receiving end of the command channel for one stream
pub struct CommandReceiver {
    source: Box<dyn CommandSource>,
    guard: SequenceGuard,
    offsets: ClockOffsetModel,
    config: ReceiverConfig,
    wall: Arc<dyn WallClock>,
    rejected: Vec<SyncError>,
    stats: ReceiverStats,
}

impl CommandReceiver {
    pub fn new(source: Box<dyn CommandSource>, config: ReceiverConfig, wall: Arc<dyn WallClock>) -> Self {
        CommandReceiver {
            source,
            guard: SequenceGuard::new(),
            offsets: ClockOffsetModel::new(),
            config,
            wall,
            rejected: Vec::new(),
            stats: ReceiverStats::default(),
        }
    }

    /// Take every pending command that passes the sequence guard
    ///
    /// Fails with `ChannelUnavailable` once the source is gone and nothing
    /// was taken in this poll.
    pub fn poll(&mut self) -> SyncResult<Vec<Arc<ControlCommand>>> {
        let mut accepted = Vec::new();
        while accepted.len() < self.config.max_per_poll.max(1) {
            let received = match self.source.try_recv() {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(e) if accepted.is_empty() => return Err(e),
                Err(_) => break,
            };

            let mut command = received.command;
            if let Some(sent_at) = received.sent_at {
                self.offsets.observe(command.sender, self.wall.now(), sent_at);
            }

            if let Err(e) = self.guard.accept(&command) {
                tracing::debug!(error = %e, "command rejected");
                self.stats.rejected += 1;
                self.rejected.push(e);
                continue;
            }

            if self.config.correct_clock_offset {
                let local = self.offsets.to_local(command.sender, command.issue_time);
                if local != command.issue_time {
                    let mut translated = ControlCommand::clone(&command);
                    translated.issue_time = local;
                    command = Arc::new(translated);
                }
            }

            self.stats.accepted += 1;
            accepted.push(command);
        }
        Ok(accepted)
    }

    /// Rejections since the last call
    pub fn drain_rejected(&mut self) -> Vec<SyncError> {
        std::mem::take(&mut self.rejected)
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    pub fn guard(&self) -> &SequenceGuard {
        &self.guard
    }

    pub fn offsets(&self) -> &ClockOffsetModel {
        &self.offsets
    }
}
