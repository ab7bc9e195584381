//! Passive clock-offset estimation per command sender
//!
//! Every received frame carries the sender's send time. The offset
//! `local_receive - remote_send` mixes clock offset and transit delay; the
//! median over a sliding window is robust against delay spikes.

use std::collections::{HashMap, VecDeque};

use syncstream_core::{SenderId, Timestamp};

/// Samples required before an estimate is published
pub const MIN_OFFSET_SAMPLES: usize = 5;

/// Offset statistics for a single sender
#[derive(Clone, Debug)]
pub struct SenderOffset {
    /// Estimated offset (local - remote), seconds
    pub offset: f64,
    /// Max deviation of a sample from the estimate
    pub jitter_envelope: f64,
    samples: VecDeque<f64>,
    max_samples: usize,
}

impl SenderOffset {
    pub fn new() -> Self {
        SenderOffset::with_window(100)
    }

    pub fn with_window(max_samples: usize) -> Self {
        SenderOffset {
            offset: 0.0,
            jitter_envelope: 0.0,
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    /// Update with a new timing sample
    pub fn update(&mut self, local_time: f64, remote_time: f64) {
        let sample = local_time - remote_time;
        if !sample.is_finite() {
            return;
        }
        self.samples.push_back(sample);
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }

        if self.is_ready() {
            self.offset = median(self.samples.iter().copied());
            self.jitter_envelope = self
                .samples
                .iter()
                .map(|s| (s - self.offset).abs())
                .fold(0.0, f64::max);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.samples.len() >= MIN_OFFSET_SAMPLES
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Default for SenderOffset {
    fn default() -> Self {
        Self::new()
    }
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Offset model across all senders
#[derive(Debug, Default)]
pub struct ClockOffsetModel {
    senders: HashMap<SenderId, SenderOffset>,
}

impl ClockOffsetModel {
    pub fn new() -> Self {
        ClockOffsetModel::default()
    }

    /// Record a frame sent at `remote_send` and received at `local_receive`
    pub fn observe(&mut self, sender: SenderId, local_receive: Timestamp, remote_send: Timestamp) {
        let model = self.senders.entry(sender).or_default();
        model.update(local_receive.as_secs_f64(), remote_send.as_secs_f64());
        if model.is_ready() {
            tracing::trace!(
                ?sender,
                offset = model.offset,
                jitter = model.jitter_envelope,
                "clock offset updated"
            );
        }
    }

    /// Published offset for `sender`, once enough samples were seen
    pub fn offset(&self, sender: SenderId) -> Option<f64> {
        self.senders
            .get(&sender)
            .filter(|m| m.is_ready())
            .map(|m| m.offset)
    }

    /// Translate a sender-side time into the local time base
    ///
    /// Unknown senders pass through unchanged.
    pub fn to_local(&self, sender: SenderId, remote: Timestamp) -> Timestamp {
        match self.offset(sender) {
            Some(offset) => remote.offset(offset),
            None => remote,
        }
    }

    pub fn get_sender(&self, sender: SenderId) -> Option<&SenderOffset> {
        self.senders.get(&sender)
    }

    pub fn sender_count(&self) -> usize {
        self.senders.len()
    }
}
