//! Stream configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use syncstream_core::{ClockMode, StreamId, SyncError, SyncResult, Timestamp};
use syncstream_time::{BoundaryPolicy, PolicyConfig, SchedulerConfig};
use syncstream_transport::BackoffConfig;

use crate::{ChannelFunction, WarningConfig};

/// Configuration of one stream process
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub stream: StreamId,
    pub name: String,
    pub content_type: String,
    pub channel_count: usize,
    /// Nominal sample rate in Hz
    pub sample_rate: f64,
    pub mode: ClockMode,
    /// Shared start time; synchronized streams without one take it from
    /// the first `Start` command
    pub origin: Option<Timestamp>,
    /// Emit from the first tick instead of waiting for `Start`
    pub auto_start: bool,
    pub functions: Vec<ChannelFunction>,
    /// Generation lead and lateness tolerance
    pub latency_budget: Duration,
    /// Driver wake-up interval for command polling
    pub poll_interval: Duration,
    /// Samples per batch; defaults to one poll interval's worth
    pub batch_size: Option<usize>,
    pub boundary: BoundaryPolicy,
    /// Stop after this many seconds of stream time
    pub max_time: Option<f64>,
    /// Stop after this many samples
    pub max_samples: Option<u64>,
    pub warnings: WarningConfig,
    pub backoff: BackoffConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            stream: StreamId::new(0),
            name: "test stream 0".into(),
            content_type: "data".into(),
            channel_count: 30,
            sample_rate: 500.0,
            mode: ClockMode::Synchronized,
            origin: None,
            auto_start: true,
            functions: vec![ChannelFunction::Counter],
            latency_budget: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            batch_size: None,
            boundary: BoundaryPolicy::Nearest,
            max_time: None,
            max_samples: None,
            warnings: WarningConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl StreamConfig {
    /// Synchronized stream at `sample_rate`, waiting for a `Start` command
    pub fn synchronized(sample_rate: f64, channel_count: usize) -> Self {
        StreamConfig {
            sample_rate,
            channel_count,
            auto_start: false,
            ..Default::default()
        }
    }

    /// Realtime stream at `sample_rate`, waiting for a `Start` command
    pub fn realtime(sample_rate: f64, channel_count: usize) -> Self {
        StreamConfig {
            mode: ClockMode::Realtime,
            ..StreamConfig::synchronized(sample_rate, channel_count)
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(SyncError::InvalidConfiguration(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.channel_count == 0 {
            return Err(SyncError::InvalidConfiguration(
                "channel count must be at least 1".into(),
            ));
        }
        if self.functions.is_empty() {
            return Err(SyncError::InvalidConfiguration(
                "at least one channel function is required".into(),
            ));
        }
        if let Some(max_time) = self.max_time {
            if !(max_time.is_finite() && max_time > 0.0) {
                return Err(SyncError::InvalidConfiguration(format!(
                    "max time must be positive, got {max_time}"
                )));
            }
        }
        self.scheduler_config().validate()
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        match self.batch_size {
            Some(batch_size) => SchedulerConfig {
                latency_budget: self.latency_budget,
                batch_size,
            },
            None => SchedulerConfig::for_rate(self.sample_rate, self.poll_interval, self.latency_budget),
        }
    }

    pub fn policy_config(&self) -> PolicyConfig {
        PolicyConfig {
            latency_budget: self.latency_budget,
            boundary: self.boundary,
        }
    }

    /// Load from a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> SyncResult<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::InvalidConfiguration(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SyncError::InvalidConfiguration(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }
}

/// A set of streams sharing one configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LauncherConfig {
    pub num_streams: u32,
    /// Optional identifier added to every stream name
    pub name: Option<String>,
    pub stream: StreamConfig,
}

impl LauncherConfig {
    pub fn new(num_streams: u32, stream: StreamConfig) -> Self {
        LauncherConfig {
            num_streams,
            name: None,
            stream,
        }
    }

    /// Per-stream configurations with ids, names and a common origin
    pub fn stream_configs(&self, origin: Option<Timestamp>) -> SyncResult<Vec<StreamConfig>> {
        if self.num_streams == 0 {
            return Err(SyncError::InvalidConfiguration(
                "at least one stream is required".into(),
            ));
        }
        self.stream.validate()?;

        let functions = self
            .stream
            .functions
            .iter()
            .map(|f| f.name())
            .collect::<Vec<_>>()
            .join(" ");
        Ok((0..self.num_streams)
            .map(|i| {
                let name = match &self.name {
                    Some(prefix) => format!("{prefix} test stream {i} {functions}"),
                    None => format!("Test stream {i} {functions}"),
                };
                StreamConfig {
                    stream: StreamId::new(i),
                    name,
                    origin: origin.or(self.stream.origin),
                    ..self.stream.clone()
                }
            })
            .collect())
    }
}
