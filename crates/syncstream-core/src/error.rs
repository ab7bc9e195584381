//! Error types for SyncStream

use thiserror::Error;

use crate::{CommandId, SenderId, StreamId};

/// Core SyncStream errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    // Fatal at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // Transport errors
    #[error("Command channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Invalid wire format: {0}")]
    Wire(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    // Recoverable, surfaced as warnings
    #[error("{stream} behind schedule by {behind:.6} seconds - increase latency")]
    SchedulingBehind { stream: StreamId, behind: f64 },

    #[error("{stream} received command {command} {lateness:.6} seconds late")]
    LateCommand {
        stream: StreamId,
        command: CommandId,
        lateness: f64,
    },

    #[error("Dropped command {id} from sender {sender}: last accepted {last_accepted}")]
    DuplicateOrStaleCommand {
        sender: SenderId,
        id: CommandId,
        last_accepted: CommandId,
    },

    // Sample invariants
    #[error("Invalid sample: {0}")]
    InvalidSample(String),
}

impl SyncError {
    /// Whether the error must terminate the stream process
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfiguration(_) | SyncError::ChannelUnavailable(_)
        )
    }
}

/// Result type for SyncStream operations
pub type SyncResult<T> = Result<T, SyncError>;
