//! Metric publication
//!
//! Metrics are named counters; each `publish_metric` call adds `value`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Batches produced after their due time
pub const BEHIND_SCHEDULE: &str = "behind_schedule";
/// Commands processed past the latency budget
pub const LATE_COMMANDS: &str = "late_commands";
/// Samples replayed by bursts
pub const BURST_SAMPLES: &str = "burst_samples";
/// Samples skipped by drop-resume
pub const DROPPED_SAMPLES: &str = "dropped_samples";
/// Duplicate or stale commands rejected
pub const STALE_COMMANDS: &str = "stale_commands";

/// Metric sink
pub trait MetricSink: Send + Sync {
    fn publish_metric(&self, name: &str, value: f64);
}

impl<M: MetricSink + ?Sized> MetricSink for Arc<M> {
    fn publish_metric(&self, name: &str, value: f64) {
        (**self).publish_metric(name, value)
    }
}

/// Discards every metric
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl MetricSink for NoopMetrics {
    fn publish_metric(&self, _name: &str, _value: f64) {}
}

/// Accumulates metrics in memory; clones share the same totals
#[derive(Clone, Debug, Default)]
pub struct RecordingMetrics {
    totals: Arc<Mutex<HashMap<String, f64>>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        RecordingMetrics::default()
    }

    /// Accumulated total, 0 when never published
    pub fn get(&self, name: &str) -> f64 {
        self.totals.lock().get(name).copied().unwrap_or(0.0)
    }

    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.totals.lock().clone()
    }
}

impl MetricSink for RecordingMetrics {
    fn publish_metric(&self, name: &str, value: f64) {
        *self.totals.lock().entry(name.to_string()).or_insert(0.0) += value;
    }
}

/// Logs each metric at debug level
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingMetrics;

impl MetricSink for TracingMetrics {
    fn publish_metric(&self, name: &str, value: f64) {
        tracing::debug!(target: "syncstream::metrics", metric = name, value, "metric");
    }
}
