//! Command sender
//!
//! Commands are stamped `now + stamp_latency`: receivers get that much time
//! to take delivery before the command is due.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use syncstream_core::{CommandId, CommandPayload, ControlCommand, SenderId, SyncError, SyncResult, Timestamp};
use syncstream_time::WallClock;
use syncstream_transport::CommandTransport;

/// Sender configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Fixed sender id; random when unset
    pub sender_id: Option<u64>,
    /// Offset added to the current time when stamping a command
    pub stamp_latency: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            sender_id: None,
            stamp_latency: Duration::from_millis(500),
        }
    }
}

impl SenderConfig {
    /// Commands due the moment they are issued
    pub fn immediate() -> Self {
        SenderConfig {
            stamp_latency: Duration::ZERO,
            ..Default::default()
        }
    }
}

/// Issues timestamped commands over a transport
pub struct CommandSender {
    id: SenderId,
    next_id: CommandId,
    stamp_latency: Duration,
    wall: Arc<dyn WallClock>,
    transport: Option<Arc<dyn CommandTransport>>,
}

impl CommandSender {
    pub fn new(config: SenderConfig, wall: Arc<dyn WallClock>) -> Self {
        let id = SenderId::new(config.sender_id.unwrap_or_else(rand::random));
        CommandSender {
            id,
            next_id: CommandId::FIRST,
            stamp_latency: config.stamp_latency,
            wall,
            transport: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn CommandTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn attach(&mut self, transport: Arc<dyn CommandTransport>) {
        self.transport = Some(transport);
    }

    pub fn detach(&mut self) {
        self.transport = None;
    }

    pub fn sender_id(&self) -> SenderId {
        self.id
    }

    pub fn stamp_latency(&self) -> Duration {
        self.stamp_latency
    }

    /// Id the next command will carry
    pub fn next_id(&self) -> CommandId {
        self.next_id
    }

    /// Stamp, number and broadcast a command
    pub fn issue(&mut self, payload: CommandPayload) -> SyncResult<Arc<ControlCommand>> {
        let issue_time = self.wall.now() + self.stamp_latency;
        self.issue_at(payload, issue_time)
    }

    /// Broadcast a command with an explicit execution time
    pub fn issue_at(&mut self, payload: CommandPayload, issue_time: Timestamp) -> SyncResult<Arc<ControlCommand>> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| SyncError::ChannelUnavailable("no transport attached".into()))?;
        if !issue_time.is_finite() {
            return Err(SyncError::InvalidConfiguration(format!(
                "non-finite issue time for {payload}"
            )));
        }

        let command = Arc::new(ControlCommand::new(self.id, self.next_id, issue_time, payload));
        self.next_id = self.next_id.next();
        transport.broadcast(&command)?;

        tracing::debug!(command = %command, "command issued");
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncstream_time::ManualClock;
    use syncstream_transport::{BroadcastHub, CommandSource};

    fn sender(wall: &Arc<ManualClock>) -> CommandSender {
        CommandSender::new(
            SenderConfig {
                sender_id: Some(42),
                stamp_latency: Duration::from_millis(500),
            },
            wall.clone(),
        )
    }

    #[test]
    fn test_issue_without_transport_fails() {
        let wall = Arc::new(ManualClock::new(0.0));
        let mut tx = sender(&wall);
        assert!(matches!(
            tx.issue(CommandPayload::Start),
            Err(SyncError::ChannelUnavailable(_))
        ));
        assert_eq!(tx.next_id(), CommandId::FIRST);
    }

    #[test]
    fn test_issue_stamps_future_time() {
        let wall = Arc::new(ManualClock::new(10.0));
        let hub = Arc::new(BroadcastHub::default());
        let mut sub = hub.subscribe().unwrap();
        let mut tx = sender(&wall).with_transport(hub.clone());

        let cmd = tx.issue(CommandPayload::Start).unwrap();
        assert_eq!(cmd.issue_time, Timestamp(10.5));
        assert_eq!(cmd.sender, SenderId::new(42));
        assert_eq!(cmd.id, CommandId::FIRST);

        let received = sub.try_recv().unwrap().unwrap();
        assert!(Arc::ptr_eq(&received.command, &cmd));
    }

    #[test]
    fn test_ids_strictly_increase() {
        let wall = Arc::new(ManualClock::new(0.0));
        let hub = Arc::new(BroadcastHub::default());
        let mut tx = sender(&wall).with_transport(hub);

        let ids: Vec<CommandId> = (0..4)
            .map(|_| tx.issue(CommandPayload::Marker("m".into())).unwrap().id)
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_closed_transport_reports_unavailable() {
        let wall = Arc::new(ManualClock::new(0.0));
        let hub = Arc::new(BroadcastHub::default());
        let mut tx = sender(&wall).with_transport(hub.clone());
        hub.close();
        assert!(matches!(
            tx.issue(CommandPayload::Stop),
            Err(SyncError::ChannelUnavailable(_))
        ));
    }

    #[test]
    fn test_immediate_preset() {
        let wall = Arc::new(ManualClock::new(3.0));
        let hub = Arc::new(BroadcastHub::default());
        let mut tx = CommandSender::new(SenderConfig::immediate(), wall).with_transport(hub);
        assert_eq!(tx.issue(CommandPayload::Pause).unwrap().issue_time, Timestamp(3.0));
    }
}
