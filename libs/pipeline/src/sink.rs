use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::File;
use tokio_util::sync::CancellationToken;

use rump_api::KeyValueStore;

use crate::PipelineError;
use crate::bus::{BusReader, Taken};
use crate::frame::FrameWriter;
use crate::progress::{Progress, outcome_of};
use crate::source::{AdapterFuture, cancellable};

/// Consumer side of a pipeline. Drains the bus until end-of-stream.
pub trait Sink: Send {
    fn name(&self) -> &str;

    fn write<'a>(&'a mut self, bus: BusReader, token: &'a CancellationToken) -> AdapterFuture<'a>;
}

// ═══════════════════════════════════════════════════════════════
//  Store sink — bus → RESTORE … REPLACE
// ═══════════════════════════════════════════════════════════════

pub struct StoreSink {
    name: String,
    store: Arc<dyn KeyValueStore>,
    verbose: bool,
}

impl StoreSink {
    pub fn new(name: impl Into<String>, store: Arc<dyn KeyValueStore>, verbose: bool) -> Self {
        Self {
            name: name.into(),
            store,
            verbose,
        }
    }

    async fn run(&mut self, mut bus: BusReader, token: &CancellationToken) -> Result<(), PipelineError> {
        tracing::info!(sink = %self.name, "restoring into store");
        let mut progress = Progress::new("sink", self.name.as_str(), self.verbose);
        let result = self.restore_all(&mut bus, token, &mut progress).await;
        progress.finish(outcome_of(&result));
        result
    }

    async fn restore_all(
        &self,
        bus: &mut BusReader,
        token: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<(), PipelineError> {
        while let Taken::Record(record) = bus.take(token).await? {
            // A failed write fails the run: no silent partial success.
            cancellable(token, self.store.restore(&record.key, record.ttl, &record.value))
                .await?
                .map_err(|source| {
                    tracing::error!(
                        sink = %self.name,
                        key = %record.key_display(),
                        error = %source,
                        "restore failed"
                    );
                    PipelineError::Restore { key: record.key_display().into_owned(), source }
                })?;
            progress.record();
        }
        Ok(())
    }
}

impl Sink for StoreSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write<'a>(&'a mut self, bus: BusReader, token: &'a CancellationToken) -> AdapterFuture<'a> {
        Box::pin(self.run(bus, token))
    }
}

// ═══════════════════════════════════════════════════════════════
//  File sink — bus → frame stream
// ═══════════════════════════════════════════════════════════════

pub struct FileSink {
    name: String,
    path: PathBuf,
    verbose: bool,
}

impl FileSink {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, verbose: bool) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            verbose,
        }
    }

    fn write_err(&self, source: std::io::Error) -> PipelineError {
        PipelineError::Write { path: self.path.clone(), source }
    }

    async fn run(&mut self, mut bus: BusReader, token: &CancellationToken) -> Result<(), PipelineError> {
        tracing::info!(sink = %self.name, path = %self.path.display(), "writing file");
        let mut progress = Progress::new("sink", self.name.as_str(), self.verbose);

        let file = File::create(&self.path)
            .await
            .map_err(|source| PipelineError::Open { path: self.path.clone(), source })?;
        let mut writer = FrameWriter::new(file);

        let mut result = self.encode_all(&mut bus, &mut writer, token, &mut progress).await;

        // Records already encoded are kept on cancellation too.
        if matches!(result, Ok(()) | Err(PipelineError::Cancelled)) {
            if let Err(e) = writer.flush().await {
                result = Err(self.write_err(e));
            }
        }

        tracing::debug!(sink = %self.name, bytes = writer.bytes_written(), "file closed");
        progress.finish(outcome_of(&result));
        result
    }

    async fn encode_all(
        &self,
        bus: &mut BusReader,
        writer: &mut FrameWriter<File>,
        token: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<(), PipelineError> {
        while let Taken::Record(record) = bus.take(token).await? {
            writer.write_record(&record).await.map_err(|e| self.write_err(e))?;
            progress.record();
        }
        Ok(())
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write<'a>(&'a mut self, bus: BusReader, token: &'a CancellationToken) -> AdapterFuture<'a> {
        Box::pin(self.run(bus, token))
    }
}
