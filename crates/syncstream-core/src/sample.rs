//! Sample batches emitted by data streams
//!
//! INVARIANT: `timestamps.len() == values.len()`, timestamps strictly
//! increasing within a batch and across consecutive batches of one stream.

use crate::{StreamId, SyncError, SyncResult, Timestamp};

/// A single emitted sample slot
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// Position in the stream's nominal index space
    pub index: u64,
    pub timestamp: Timestamp,
    /// One value per channel
    pub values: Vec<f64>,
}

/// An ordered run of samples from one stream
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBatch {
    pub stream: StreamId,
    pub channel_count: usize,
    indices: Vec<u64>,
    timestamps: Vec<Timestamp>,
    values: Vec<Vec<f64>>,
}

impl SampleBatch {
    pub fn new(stream: StreamId, channel_count: usize) -> Self {
        SampleBatch {
            stream,
            channel_count,
            indices: Vec::new(),
            timestamps: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn with_capacity(stream: StreamId, channel_count: usize, capacity: usize) -> Self {
        SampleBatch {
            stream,
            channel_count,
            indices: Vec::with_capacity(capacity),
            timestamps: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Append a sample, enforcing ordering and channel count
    pub fn push(&mut self, index: u64, timestamp: Timestamp, values: Vec<f64>) -> SyncResult<()> {
        if values.len() != self.channel_count {
            return Err(SyncError::InvalidSample(format!(
                "expected {} channels, got {}",
                self.channel_count,
                values.len()
            )));
        }
        if !timestamp.is_finite() {
            return Err(SyncError::InvalidSample(format!(
                "non-finite timestamp at index {index}"
            )));
        }
        if let Some(last) = self.last_timestamp() {
            if timestamp <= last {
                return Err(SyncError::InvalidSample(format!(
                    "timestamp {timestamp} at index {index} does not follow {last}"
                )));
            }
        }
        if let Some(&last_index) = self.indices.last() {
            if index <= last_index {
                return Err(SyncError::InvalidSample(format!(
                    "index {index} does not follow {last_index}"
                )));
            }
        }
        self.indices.push(index);
        self.timestamps.push(timestamp);
        self.values.push(values);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn indices(&self) -> &[u64] {
        &self.indices
    }

    pub fn first_index(&self) -> Option<u64> {
        self.indices.first().copied()
    }

    pub fn last_index(&self) -> Option<u64> {
        self.indices.last().copied()
    }

    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.last().copied()
    }

    /// Iterate samples in order
    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.indices
            .iter()
            .zip(&self.timestamps)
            .zip(&self.values)
            .map(|((&index, &timestamp), values)| Sample {
                index,
                timestamp,
                values: values.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_keeps_lengths_equal() {
        let mut batch = SampleBatch::new(StreamId::new(0), 2);
        batch.push(0, Timestamp(0.0), vec![1.0, 2.0]).unwrap();
        batch.push(1, Timestamp(0.5), vec![3.0, 4.0]).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.timestamps().len(), batch.values().len());
        assert_eq!(batch.last_timestamp(), Some(Timestamp(0.5)));
    }

    #[test]
    fn test_push_rejects_non_increasing_timestamp() {
        let mut batch = SampleBatch::new(StreamId::new(0), 1);
        batch.push(0, Timestamp(1.0), vec![0.0]).unwrap();

        assert!(batch.push(1, Timestamp(1.0), vec![0.0]).is_err());
        assert!(batch.push(1, Timestamp(0.5), vec![0.0]).is_err());
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_push_rejects_wrong_channel_count() {
        let mut batch = SampleBatch::new(StreamId::new(0), 3);
        let err = batch.push(0, Timestamp(0.0), vec![0.0]).unwrap_err();
        assert!(matches!(err, SyncError::InvalidSample(_)));
    }

    #[test]
    fn test_iter_yields_samples_in_order() {
        let mut batch = SampleBatch::new(StreamId::new(1), 1);
        batch.push(4, Timestamp(2.0), vec![4.0]).unwrap();
        batch.push(5, Timestamp(2.5), vec![5.0]).unwrap();

        let samples: Vec<Sample> = batch.iter().collect();
        assert_eq!(samples[0].index, 4);
        assert_eq!(samples[1].timestamp, Timestamp(2.5));
    }
}
