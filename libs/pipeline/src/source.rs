use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use rump_api::{KeyValueStore, Record, Ttl};

use crate::PipelineError;
use crate::bus::BusWriter;
use crate::frame::FrameReader;
use crate::progress::{Progress, outcome_of};

pub const DEFAULT_SCAN_COUNT: usize = 400;

pub type AdapterFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + 'a>>;

/// Producer side of a pipeline.
///
/// `read` owns the bus writer: the bus is closed on every exit path,
/// success, error or cancellation.
pub trait Source: Send {
    fn name(&self) -> &str;

    fn read<'a>(&'a mut self, bus: BusWriter, token: &'a CancellationToken) -> AdapterFuture<'a>;
}

/// Run `fut` unless the token fires first.
pub(crate) async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, PipelineError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(PipelineError::Cancelled),
        out = fut => Ok(out),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Store source — SCAN → DUMP (+ PTTL) → bus
// ═══════════════════════════════════════════════════════════════

pub struct StoreSource {
    name: String,
    store: Arc<dyn KeyValueStore>,
    track_ttl: bool,
    scan_count: usize,
    verbose: bool,
}

impl StoreSource {
    pub fn new(name: impl Into<String>, store: Arc<dyn KeyValueStore>, track_ttl: bool, verbose: bool) -> Self {
        Self {
            name: name.into(),
            store,
            track_ttl,
            scan_count: DEFAULT_SCAN_COUNT,
            verbose,
        }
    }

    /// Page size hint passed to every scan call.
    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = count.max(1);
        self
    }

    async fn run(&mut self, bus: BusWriter, token: &CancellationToken) -> Result<(), PipelineError> {
        tracing::info!(source = %self.name, track_ttl = self.track_ttl, "scanning store");
        let mut progress = Progress::new("source", self.name.as_str(), self.verbose);
        let result = self.scan_all(&bus, token, &mut progress).await;
        bus.close();
        progress.finish(outcome_of(&result));
        result
    }

    async fn scan_all(
        &self,
        bus: &BusWriter,
        token: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<(), PipelineError> {
        let mut cursor = 0;
        loop {
            let page = cancellable(token, self.store.scan(cursor, self.scan_count))
                .await?
                .map_err(PipelineError::Scan)?;

            for key in &page.keys {
                let Some(record) = self.fetch(key, token, progress).await? else {
                    continue;
                };
                bus.put(record, token).await?;
                progress.record();
            }

            if page.is_last() {
                return Ok(());
            }
            cursor = page.cursor;
        }
    }

    /// Assemble one record. `Ok(None)` means the key was skipped; per-key
    /// read failures never abort the scan.
    async fn fetch(
        &self,
        key: &[u8],
        token: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<Option<Record>, PipelineError> {
        let key_str = String::from_utf8_lossy(key);
        if key.is_empty() {
            tracing::warn!(source = %self.name, "empty key, skipping");
            progress.skip();
            return Ok(None);
        }

        let value = match cancellable(token, self.store.dump(key)).await? {
            Ok(Some(value)) => value,
            Ok(None) => {
                tracing::warn!(source = %self.name, key = %key_str, "key vanished before dump, skipping");
                progress.skip();
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(source = %self.name, key = %key_str, error = %e, "dump failed, skipping");
                progress.skip();
                return Ok(None);
            }
        };

        // One extra round trip per key, so only when asked for.
        let ttl = if self.track_ttl {
            match cancellable(token, self.store.pttl(key)).await? {
                Ok(reply) => Ttl::from_pttl(reply),
                Err(e) => {
                    tracing::warn!(source = %self.name, key = %key_str, error = %e, "pttl failed, skipping");
                    progress.skip();
                    return Ok(None);
                }
            }
        } else {
            Ttl::NONE
        };

        Ok(Some(Record::new(key, value, ttl)))
    }
}

impl Source for StoreSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read<'a>(&'a mut self, bus: BusWriter, token: &'a CancellationToken) -> AdapterFuture<'a> {
        Box::pin(self.run(bus, token))
    }
}

// ═══════════════════════════════════════════════════════════════
//  File source — frame stream → bus
// ═══════════════════════════════════════════════════════════════

pub struct FileSource {
    name: String,
    path: PathBuf,
    verbose: bool,
}

impl FileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, verbose: bool) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            verbose,
        }
    }

    async fn run(&mut self, bus: BusWriter, token: &CancellationToken) -> Result<(), PipelineError> {
        tracing::info!(source = %self.name, path = %self.path.display(), "reading file");
        let mut progress = Progress::new("source", self.name.as_str(), self.verbose);
        let result = self.decode_all(&bus, token, &mut progress).await;
        bus.close();
        progress.finish(outcome_of(&result));
        result
    }

    async fn decode_all(
        &self,
        bus: &BusWriter,
        token: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<(), PipelineError> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|source| PipelineError::Open { path: self.path.clone(), source })?;
        let mut reader = FrameReader::new(file);

        while let Some(record) = cancellable(token, reader.next_record()).await?? {
            bus.put(record, token).await?;
            progress.record();
        }
        Ok(())
    }
}

impl Source for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read<'a>(&'a mut self, bus: BusWriter, token: &'a CancellationToken) -> AdapterFuture<'a> {
        Box::pin(self.run(bus, token))
    }
}
