//! Identity types for SyncStream
//!
//! Streams are numbered within one launcher; senders carry a 64-bit id that
//! survives restarts of the controlling process when chosen explicitly.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stream identity - index of a data stream within its launcher
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StreamId(pub u32);

impl StreamId {
    #[inline]
    pub fn new(id: u32) -> Self {
        StreamId(id)
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream({})", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Sender identity - one per control process
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SenderId(pub u64);

impl SenderId {
    pub const ZERO: SenderId = SenderId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        SenderId(id)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        SenderId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sender({:016x})", self.0)
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Command identity - strictly increasing per sender
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct CommandId(pub u64);

impl CommandId {
    pub const FIRST: CommandId = CommandId(1);

    #[inline]
    pub fn new(id: u64) -> Self {
        CommandId(id)
    }

    #[inline]
    pub fn next(self) -> Self {
        CommandId(self.0.saturating_add(1))
    }
}

impl fmt::Debug for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cmd#{}", self.0)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
