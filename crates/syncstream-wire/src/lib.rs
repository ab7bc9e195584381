//! SyncStream Wire - Binary frame format for control commands
//!
//! A command travels as one datagram:
//! - Fixed header (36 bytes)
//! - Payload body (marker text, empty for state commands)

pub mod frame;
pub mod header;

pub use frame::*;
pub use header::*;
