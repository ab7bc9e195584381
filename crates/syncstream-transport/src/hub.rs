//! In-process broadcast hub
//!
//! Every subscriber sees every command broadcast after it subscribed, as the
//! same `Arc<ControlCommand>`.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::TryRecvError};

use syncstream_core::{ControlCommand, SyncError, SyncResult};

use crate::{CommandSource, CommandTransport, ReceivedCommand};

/// Default per-subscriber queue depth
pub const DEFAULT_HUB_CAPACITY: usize = 256;

/// In-process command transport
#[derive(Debug)]
pub struct BroadcastHub {
    tx: Mutex<Option<broadcast::Sender<Arc<ControlCommand>>>>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        BroadcastHub {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// New subscriber; fails once the hub is closed
    pub fn subscribe(&self) -> SyncResult<HubSubscriber> {
        match self.tx.lock().as_ref() {
            Some(tx) => Ok(HubSubscriber { rx: tx.subscribe() }),
            None => Err(SyncError::ChannelUnavailable("hub closed".into())),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.lock().as_ref().map_or(0, |tx| tx.receiver_count())
    }

    /// Close the hub; subscribers drain what is queued, then see `ChannelUnavailable`
    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        BroadcastHub::new(DEFAULT_HUB_CAPACITY)
    }
}

impl CommandTransport for BroadcastHub {
    fn broadcast(&self, command: &Arc<ControlCommand>) -> SyncResult<()> {
        let guard = self.tx.lock();
        let tx = guard
            .as_ref()
            .ok_or_else(|| SyncError::ChannelUnavailable("hub closed".into()))?;
        if tx.send(Arc::clone(command)).is_err() {
            tracing::debug!(command = %command, "broadcast with no subscribers");
        }
        Ok(())
    }
}

/// Receiving end of a `BroadcastHub`
#[derive(Debug)]
pub struct HubSubscriber {
    rx: broadcast::Receiver<Arc<ControlCommand>>,
}

impl CommandSource for HubSubscriber {
    fn try_recv(&mut self) -> SyncResult<Option<ReceivedCommand>> {
        loop {
            match self.rx.try_recv() {
                Ok(command) => return Ok(Some(ReceivedCommand::new(command))),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "command subscriber lagged, commands lost");
                }
                Err(TryRecvError::Closed) => {
                    return Err(SyncError::ChannelUnavailable("hub closed".into()));
                }
            }
        }
    }
}
