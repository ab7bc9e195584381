//! Sample sinks

use std::sync::Arc;

use parking_lot::Mutex;

use syncstream_core::{SampleBatch, SyncResult, Timestamp};

/// Destination of a stream's sample batches
pub trait SampleSink: Send {
    fn push_batch(&mut self, batch: &SampleBatch) -> SyncResult<()>;
}

impl<S: SampleSink + ?Sized> SampleSink for Box<S> {
    fn push_batch(&mut self, batch: &SampleBatch) -> SyncResult<()> {
        (**self).push_batch(batch)
    }
}

/// Collects batches in memory; clones share the same storage
#[derive(Clone, Debug, Default)]
pub struct VecSink {
    batches: Arc<Mutex<Vec<SampleBatch>>>,
}

impl VecSink {
    pub fn new() -> Self {
        VecSink::default()
    }

    pub fn batches(&self) -> Vec<SampleBatch> {
        self.batches.lock().clone()
    }

    /// All timestamps in emission order
    pub fn timestamps(&self) -> Vec<Timestamp> {
        self.batches
            .lock()
            .iter()
            .flat_map(|b| b.timestamps().iter().copied())
            .collect()
    }

    /// All sample indices in emission order
    pub fn indices(&self) -> Vec<u64> {
        self.batches
            .lock()
            .iter()
            .flat_map(|b| b.indices().iter().copied())
            .collect()
    }

    pub fn sample_count(&self) -> usize {
        self.batches.lock().iter().map(|b| b.len()).sum()
    }

    pub fn clear(&self) {
        self.batches.lock().clear();
    }
}

impl SampleSink for VecSink {
    fn push_batch(&mut self, batch: &SampleBatch) -> SyncResult<()> {
        self.batches.lock().push(batch.clone());
        Ok(())
    }
}

/// Logs every batch at debug level, one line per sample at trace level
#[derive(Clone, Debug)]
pub struct TracingSink {
    content_type: String,
}

impl TracingSink {
    pub fn new(content_type: impl Into<String>) -> Self {
        TracingSink {
            content_type: content_type.into(),
        }
    }
}

impl SampleSink for TracingSink {
    fn push_batch(&mut self, batch: &SampleBatch) -> SyncResult<()> {
        if let (Some(first), Some(last)) = (batch.first_timestamp(), batch.last_timestamp()) {
            tracing::debug!(
                stream = %batch.stream,
                content_type = %self.content_type,
                samples = batch.len(),
                first = %first,
                last = %last,
                "batch"
            );
        }
        for sample in batch.iter() {
            tracing::trace!(
                stream = %batch.stream,
                index = sample.index,
                timestamp = %sample.timestamp,
                values = ?sample.values,
                "sample"
            );
        }
        Ok(())
    }
}
