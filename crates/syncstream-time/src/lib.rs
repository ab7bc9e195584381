//! SyncStream Time - Sample clocks and catch-up scheduling
//!
//! This crate implements the timing side of a stream:
//! - ClockSource: synchronized (arithmetic) or realtime (wall-clock) timestamps
//! - WallClock: system and manual time sources
//! - LookaheadScheduler: batch generation ahead of due time
//! - CatchUpPolicy: Burst vs DropResume reconciliation for late commands
//! - ClockOffsetModel: passive per-sender clock offset estimation

pub mod clock;
pub mod scheduler;
pub mod catchup;
pub mod network;

pub use clock::*;
pub use scheduler::*;
pub use catchup::*;
pub use network::*;
