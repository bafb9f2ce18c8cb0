use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use rump_api::Record;

use crate::PipelineError;

pub const DEFAULT_BUS_CAPACITY: usize = 100;

// ═══════════════════════════════════════════════════════════════
//  Bus — bounded single-producer / single-consumer record queue
// ═══════════════════════════════════════════════════════════════

/// Result of a blocking [`BusReader::take`].
#[derive(Debug, PartialEq, Eq)]
pub enum Taken {
    Record(Record),
    /// The writer closed the bus and every queued record was taken.
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("bus operation cancelled")]
    Cancelled,
    #[error("bus reader is gone")]
    Disconnected,
}

impl From<BusError> for PipelineError {
    // The reader only disappears when the sink has exited, which cancels the run anyway.
    fn from(_: BusError) -> Self {
        PipelineError::Cancelled
    }
}

/// Create a bus holding at most `capacity` records.
///
/// # Panics
/// If `capacity` is zero. [`PipelineConfig::validate`](crate::config::PipelineConfig::validate)
/// rejects that before a bus is ever built.
pub fn bus(capacity: usize) -> (BusWriter, BusReader) {
    let (tx, rx) = mpsc::channel(capacity);
    (BusWriter { tx }, BusReader { rx })
}

/// Producing half. Not `Clone`: a bus has exactly one producer.
/// Dropping the writer closes the bus.
#[derive(Debug)]
pub struct BusWriter {
    tx: mpsc::Sender<Record>,
}

impl BusWriter {
    /// Queue a record, waiting while the bus is full.
    pub async fn put(&self, record: Record, token: &CancellationToken) -> Result<(), BusError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(BusError::Cancelled),
            sent = self.tx.send(record) => sent.map_err(|_| BusError::Disconnected),
        }
    }

    /// Signal end-of-stream to the reader.
    pub fn close(self) {
        drop(self);
    }
}

/// Consuming half. Not `Clone`: a bus has exactly one consumer.
#[derive(Debug)]
pub struct BusReader {
    rx: mpsc::Receiver<Record>,
}

impl BusReader {
    /// Take the next record, waiting while the bus is empty.
    pub async fn take(&mut self, token: &CancellationToken) -> Result<Taken, BusError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(BusError::Cancelled),
            record = self.rx.recv() => Ok(match record {
                Some(record) => Taken::Record(record),
                None => Taken::EndOfStream,
            }),
        }
    }
}
