//! Stream events and command execution reports

use std::sync::Arc;

use parking_lot::Mutex;

use syncstream_core::{ControlCommand, SyncError, Timestamp};
use syncstream_time::{ExecutionTarget, Reconciliation};

use crate::ProcessState;

/// A command reaching its execution point
#[derive(Clone, Debug, PartialEq)]
pub struct CommandExecution {
    pub command: Arc<ControlCommand>,
    pub target: ExecutionTarget,
    /// Stream time of the execution point
    pub timestamp: Timestamp,
    pub reconciliation: Reconciliation,
}

impl CommandExecution {
    /// Sample index of the execution point, if on the grid
    pub fn index(&self) -> Option<u64> {
        match self.target {
            ExecutionTarget::Index(n) => Some(n),
            ExecutionTarget::Time(_) => None,
        }
    }
}

/// What happened during one tick
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    StateChanged(ProcessState),
    /// Recoverable condition; logged subject to rate limiting
    Warning(SyncError),
    /// Realtime catch-up skipped `dropped` slots
    SamplesDropped { dropped: u64, resume_index: u64 },
    Executed(CommandExecution),
}

/// Receives command executions as they happen
pub trait CommandObserver: Send {
    fn on_execute(&mut self, execution: &CommandExecution);
}

/// Ignores executions
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl CommandObserver for NoopObserver {
    fn on_execute(&mut self, _execution: &CommandExecution) {}
}

/// Keeps every execution; clones share the same log
#[derive(Clone, Debug, Default)]
pub struct RecordingObserver {
    executions: Arc<Mutex<Vec<CommandExecution>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        RecordingObserver::default()
    }

    pub fn executions(&self) -> Vec<CommandExecution> {
        self.executions.lock().clone()
    }
}

impl CommandObserver for RecordingObserver {
    fn on_execute(&mut self, execution: &CommandExecution) {
        self.executions.lock().push(execution.clone());
    }
}
