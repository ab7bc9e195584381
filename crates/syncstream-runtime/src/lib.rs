//! SyncStream Runtime - Stream processes and their driver
//!
//! A `StreamProcess` owns one stream's clock, scheduler, command receiver
//! and sink. Each tick:
//! 1. Emit the next due batch
//! 2. Poll the command channel
//! 3. Reconcile late commands (Burst or DropResume)
//! 4. Execute commands whose execution point was reached
//!
//! The async driver runs one task per stream until a stop command, a sample
//! limit or shutdown.

pub mod config;
pub mod driver;
pub mod generator;
pub mod metrics;
pub mod observer;
pub mod process;
pub mod sink;
pub mod telemetry;
pub mod warning;

pub use config::*;
pub use driver::*;
pub use generator::*;
pub use metrics::{MetricSink, NoopMetrics, RecordingMetrics, TracingMetrics};
pub use observer::*;
pub use process::*;
pub use sink::*;
pub use warning::*;
