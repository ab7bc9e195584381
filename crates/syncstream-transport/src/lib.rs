//! SyncStream Transport Layer - Delivery of control commands
//!
//! This crate provides:
//! - `CommandTransport` / `CommandSource` seams
//! - In-process broadcast hub
//! - UDP transport with a background receive loop
//! - Reconnect backoff

pub mod backoff;
pub mod hub;
pub mod udp;

pub use backoff::*;
pub use hub::*;
pub use udp::*;

use std::sync::Arc;

use syncstream_core::{ControlCommand, SyncResult, Timestamp};

/// A command taken off a transport
#[derive(Clone, Debug)]
pub struct ReceivedCommand {
    pub command: Arc<ControlCommand>,
    /// Sender clock reading at transmission, when the transport carries it
    pub sent_at: Option<Timestamp>,
}

impl ReceivedCommand {
    pub fn new(command: Arc<ControlCommand>) -> Self {
        ReceivedCommand {
            command,
            sent_at: None,
        }
    }
}

/// Sending half: broadcast one command to every subscriber
pub trait CommandTransport: Send + Sync {
    fn broadcast(&self, command: &Arc<ControlCommand>) -> SyncResult<()>;
}

/// Receiving half: non-blocking, arrival order
pub trait CommandSource: Send {
    /// Next available command, `Ok(None)` when nothing is pending
    ///
    /// `ChannelUnavailable` once the transport is gone for good.
    fn try_recv(&mut self) -> SyncResult<Option<ReceivedCommand>>;
}

impl<T: CommandTransport + ?Sized> CommandTransport for Arc<T> {
    fn broadcast(&self, command: &Arc<ControlCommand>) -> SyncResult<()> {
        (**self).broadcast(command)
    }
}

impl<S: CommandSource + ?Sized> CommandSource for Box<S> {
    fn try_recv(&mut self) -> SyncResult<Option<ReceivedCommand>> {
        (**self).try_recv()
    }
}
