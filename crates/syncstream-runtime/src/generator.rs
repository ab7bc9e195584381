//! Channel data generators
//!
//! Each channel takes a function from the configured list, recycled when
//! there are more channels than functions.

use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use syncstream_core::{StreamId, SyncError, SyncResult};

/// Per-channel data function
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelFunction {
    /// Stream index
    #[serde(rename = "stream-id")]
    StreamId,
    /// Stream index plus channel index
    #[serde(rename = "stream-seq")]
    StreamSeq,
    /// Sample index
    #[serde(rename = "counter")]
    Counter,
    /// Sample index interleaved across channels
    #[serde(rename = "counter+")]
    CounterPlus,
    /// Sample index modulo the sample rate
    #[serde(rename = "counter-mod-fs")]
    CounterModFs,
    /// 1 on every whole second of samples, else 0
    #[serde(rename = "impulse")]
    Impulse,
    /// 1 Hz sine of elapsed time
    #[serde(rename = "sine")]
    Sine,
    /// Sine at 10 Hz per channel index (1 Hz on channel 0)
    #[serde(rename = "sine+")]
    SinePlus,
}

impl ChannelFunction {
    pub const ALL: [ChannelFunction; 8] = [
        ChannelFunction::StreamId,
        ChannelFunction::StreamSeq,
        ChannelFunction::Counter,
        ChannelFunction::CounterPlus,
        ChannelFunction::CounterModFs,
        ChannelFunction::Impulse,
        ChannelFunction::Sine,
        ChannelFunction::SinePlus,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChannelFunction::StreamId => "stream-id",
            ChannelFunction::StreamSeq => "stream-seq",
            ChannelFunction::Counter => "counter",
            ChannelFunction::CounterPlus => "counter+",
            ChannelFunction::CounterModFs => "counter-mod-fs",
            ChannelFunction::Impulse => "impulse",
            ChannelFunction::Sine => "sine",
            ChannelFunction::SinePlus => "sine+",
        }
    }
}

impl fmt::Display for ChannelFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChannelFunction {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelFunction::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| SyncError::InvalidConfiguration(format!("unknown channel function: {s}")))
    }
}

/// Generates one sample's channel values
#[derive(Clone, Debug)]
pub struct SignalGenerator {
    stream: StreamId,
    functions: Vec<ChannelFunction>,
    channel_count: usize,
    sample_rate: f64,
}

impl SignalGenerator {
    pub fn new(
        stream: StreamId,
        functions: Vec<ChannelFunction>,
        channel_count: usize,
        sample_rate: f64,
    ) -> SyncResult<Self> {
        if functions.is_empty() {
            return Err(SyncError::InvalidConfiguration(
                "at least one channel function is required".into(),
            ));
        }
        Ok(SignalGenerator {
            stream,
            functions,
            channel_count,
            sample_rate,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Channel values for sample `index`, `elapsed` seconds after start
    pub fn generate(&self, index: u64, elapsed: f64) -> Vec<f64> {
        (0..self.channel_count)
            .map(|channel| self.channel_value(index, elapsed, channel))
            .collect()
    }

    fn channel_value(&self, index: u64, elapsed: f64, channel: usize) -> f64 {
        let stream = self.stream.index() as f64;
        let n = index as f64;
        match self.functions[channel % self.functions.len()] {
            ChannelFunction::StreamId => stream,
            ChannelFunction::StreamSeq => stream + channel as f64,
            ChannelFunction::Counter => n,
            ChannelFunction::CounterPlus => (index * self.channel_count as u64 + channel as u64) as f64,
            ChannelFunction::CounterModFs => n % self.sample_rate,
            ChannelFunction::Impulse => {
                if n % self.sample_rate == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ChannelFunction::Sine => (TAU * elapsed).sin(),
            ChannelFunction::SinePlus => {
                let freq = (channel * 10).max(1) as f64;
                (TAU * freq * elapsed).sin()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(functions: &[ChannelFunction], channels: usize) -> SignalGenerator {
        SignalGenerator::new(StreamId::new(3), functions.to_vec(), channels, 4.0).unwrap()
    }

    #[test]
    fn test_parse_function_names() {
        for f in ChannelFunction::ALL {
            assert_eq!(f.name().parse::<ChannelFunction>().unwrap(), f);
        }
        assert!("square".parse::<ChannelFunction>().is_err());
    }

    #[test]
    fn test_functions_recycle_across_channels() {
        let g = generator(&[ChannelFunction::StreamId, ChannelFunction::Counter], 5);
        assert_eq!(g.generate(7, 0.0), vec![3.0, 7.0, 3.0, 7.0, 3.0]);
    }

    #[test]
    fn test_counters() {
        let g = generator(&[ChannelFunction::CounterPlus], 3);
        assert_eq!(g.generate(2, 0.0), vec![6.0, 7.0, 8.0]);

        let g = generator(&[ChannelFunction::CounterModFs, ChannelFunction::StreamSeq], 2);
        assert_eq!(g.generate(9, 0.0), vec![1.0, 4.0]);
    }

    #[test]
    fn test_impulse_once_per_second() {
        let g = generator(&[ChannelFunction::Impulse], 1);
        let pulses: Vec<f64> = (0..9).map(|n| g.generate(n, 0.0)[0]).collect();
        assert_eq!(pulses, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_sine() {
        let g = generator(&[ChannelFunction::Sine], 1);
        assert!((g.generate(1, 0.25)[0] - 1.0).abs() < 1e-12);
        assert!(g.generate(0, 0.0)[0].abs() < 1e-12);

        let g = generator(&[ChannelFunction::SinePlus], 2);
        let v = g.generate(0, 0.025);
        // channel 1 runs at 10 Hz: quarter period
        assert!((v[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_requires_a_function() {
        assert!(SignalGenerator::new(StreamId::new(0), vec![], 1, 1.0).is_err());
    }
}
