//! SyncStream Core - Fundamental types and primitives
//!
//! This crate defines the core types shared by every SyncStream crate:
//! - Identifiers (StreamId, SenderId, CommandId)
//! - Time primitives (Timestamp, ClockMode)
//! - Sample batches
//! - Control commands
//! - Error taxonomy

pub mod id;
pub mod time;
pub mod sample;
pub mod command;
pub mod error;

pub use id::*;
pub use time::*;
pub use sample::*;
pub use command::*;
pub use error::*;
