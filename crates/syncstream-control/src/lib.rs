//! SyncStream Control - The command channel
//!
//! - `CommandSender`: stamps commands with a future execution time and broadcasts them
//! - `CommandReceiver`: non-blocking receipt with per-sender deduplication
//! - `SequenceGuard`: strictly increasing command ids per sender

pub mod guard;
pub mod receiver;
pub mod sender;

pub use guard::*;
pub use receiver::*;
pub use sender::*;
