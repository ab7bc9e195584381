//! Per-sender command sequencing
//!
//! A command is accepted only if its id is greater than the last id accepted
//! from the same sender. Duplicates from at-least-once delivery and stale
//! reordered commands are rejected alike.

use std::collections::HashMap;

use syncstream_core::{CommandId, ControlCommand, SenderId, SyncError, SyncResult};

/// Sequence guard for all senders
#[derive(Debug, Default)]
pub struct SequenceGuard {
    last_accepted: HashMap<SenderId, CommandId>,
}

impl SequenceGuard {
    pub fn new() -> Self {
        SequenceGuard::default()
    }

    /// Check whether a command would be accepted
    pub fn check(&self, sender: SenderId, id: CommandId) -> bool {
        self.last_accepted
            .get(&sender)
            .map_or(true, |last| id > *last)
    }

    /// Accept a command, or report it as duplicate or stale
    pub fn accept(&mut self, command: &ControlCommand) -> SyncResult<()> {
        let (sender, id) = command.key();
        match self.last_accepted.get(&sender) {
            Some(&last) if id <= last => Err(SyncError::DuplicateOrStaleCommand {
                sender,
                id,
                last_accepted: last,
            }),
            _ => {
                self.last_accepted.insert(sender, id);
                Ok(())
            }
        }
    }

    pub fn last_accepted(&self, sender: SenderId) -> Option<CommandId> {
        self.last_accepted.get(&sender).copied()
    }

    /// Forget a sender (it restarted with a fresh id space)
    pub fn remove_sender(&mut self, sender: SenderId) {
        self.last_accepted.remove(&sender);
    }

    pub fn sender_count(&self) -> usize {
        self.last_accepted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use syncstream_core::{CommandPayload, Timestamp};

    fn cmd(sender: u64, id: u64) -> ControlCommand {
        ControlCommand::new(
            SenderId::new(sender),
            CommandId::new(id),
            Timestamp(0.0),
            CommandPayload::Start,
        )
    }

    #[test]
    fn test_guard_basic() {
        let mut guard = SequenceGuard::new();

        assert!(guard.accept(&cmd(1, 1)).is_ok());
        // Duplicate
        assert!(guard.accept(&cmd(1, 1)).is_err());
        assert!(guard.accept(&cmd(1, 2)).is_ok());
        assert_eq!(guard.last_accepted(SenderId::new(1)), Some(CommandId::new(2)));
    }

    #[test]
    fn test_guard_rejects_stale() {
        let mut guard = SequenceGuard::new();
        guard.accept(&cmd(1, 5)).unwrap();

        let err = guard.accept(&cmd(1, 3)).unwrap_err();
        assert_eq!(
            err,
            SyncError::DuplicateOrStaleCommand {
                sender: SenderId::new(1),
                id: CommandId::new(3),
                last_accepted: CommandId::new(5),
            }
        );
        assert!(!guard.check(SenderId::new(1), CommandId::new(5)));
        assert!(guard.check(SenderId::new(1), CommandId::new(6)));
    }

    #[test]
    fn test_guard_senders_independent() {
        let mut guard = SequenceGuard::new();
        guard.accept(&cmd(1, 10)).unwrap();
        assert!(guard.accept(&cmd(2, 1)).is_ok());
        assert_eq!(guard.sender_count(), 2);

        guard.remove_sender(SenderId::new(1));
        assert!(guard.accept(&cmd(1, 1)).is_ok());
    }

    proptest! {
        /// Accepted ids per sender form a strictly increasing sequence.
        #[test]
        fn prop_accepted_ids_strictly_increase(
            arrivals in proptest::collection::vec((0u64..3, 1u64..20), 0..100)
        ) {
            let mut guard = SequenceGuard::new();
            let mut accepted: HashMap<u64, Vec<u64>> = HashMap::new();
            for (sender, id) in arrivals {
                if guard.accept(&cmd(sender, id)).is_ok() {
                    accepted.entry(sender).or_default().push(id);
                }
            }
            for ids in accepted.values() {
                prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }
}
