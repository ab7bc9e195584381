//! SyncStream Test Harness - Scenarios on a manual clock
//!
//! This crate provides:
//! - Chaos transport: delay, jitter, loss, reordering and duplication of
//!   commands
//! - Scenario harness: several streams and one controller on one manual
//!   clock, with stalls
//! - End-to-end scenarios and emission invariant checks

pub mod chaos;
pub mod integration;
pub mod scenario;

pub use chaos::*;
pub use integration::*;
pub use scenario::*;
