//! Timestamped control commands
//!
//! A command is immutable once issued. Every subscribed stream receives the
//! same instance and executes it at `issue_time` in the shared time base.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CommandId, SenderId, SyncError, Timestamp};

/// Command payload
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandPayload {
    /// Begin (or resume) emission at the command time
    Start,
    /// Halt emission after the command time until the next `Start`
    Pause,
    /// Halt emission after the command time and shut the stream down
    Stop,
    /// Opaque token executed at the command time
    Marker(String),
}

impl CommandPayload {
    /// Wire tag
    pub fn tag(&self) -> u8 {
        match self {
            CommandPayload::Start => 0x01,
            CommandPayload::Pause => 0x02,
            CommandPayload::Stop => 0x03,
            CommandPayload::Marker(_) => 0x10,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CommandPayload::Start => "start",
            CommandPayload::Pause => "pause",
            CommandPayload::Stop => "stop",
            CommandPayload::Marker(_) => "marker",
        }
    }
}

impl fmt::Display for CommandPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandPayload::Marker(token) => write!(f, "marker {token}"),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for CommandPayload {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (head, rest) = match s.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (s, ""),
        };
        match head {
            "start" => Ok(CommandPayload::Start),
            "pause" => Ok(CommandPayload::Pause),
            "stop" => Ok(CommandPayload::Stop),
            "marker" if !rest.is_empty() => Ok(CommandPayload::Marker(rest.to_string())),
            _ => Err(SyncError::InvalidConfiguration(format!(
                "undefined command: {s}"
            ))),
        }
    }
}

/// A control command as broadcast by a sender
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub sender: SenderId,
    pub id: CommandId,
    /// Time at which receivers execute the command
    pub issue_time: Timestamp,
    pub payload: CommandPayload,
}

impl ControlCommand {
    pub fn new(sender: SenderId, id: CommandId, issue_time: Timestamp, payload: CommandPayload) -> Self {
        ControlCommand {
            sender,
            id,
            issue_time,
            payload,
        }
    }

    /// Deduplication key
    #[inline]
    pub fn key(&self) -> (SenderId, CommandId) {
        (self.sender, self.id)
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} {} @ {}",
            self.sender, self.id, self.payload, self.issue_time
        )
    }
}
