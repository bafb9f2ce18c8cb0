use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use rump_api::KeyValueStore;

use crate::PipelineError;
use crate::bus::bus;
use crate::config::{EndpointKind, PipelineConfig};
use crate::sink::{FileSink, Sink, StoreSink};
use crate::source::{FileSource, Source, StoreSource};

/// How a run that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The source was exhausted and the sink drained the bus.
    Completed,
    /// An external termination request stopped the run early.
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
enum Task {
    Signal,
    Source,
    Sink,
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::Signal => f.write_str("signal"),
            Task::Source => f.write_str("source"),
            Task::Sink => f.write_str("sink"),
        }
    }
}

enum Exit {
    Done,
    ShutdownRequested,
}

// ═══════════════════════════════════════════════════════════════
//  Orchestrator — signal + source + sink under one token
// ═══════════════════════════════════════════════════════════════

/// Wires one source to one sink through a bounded bus.
///
/// Constructed = idle; [`run`](Self::run) moves it to running and consumes
/// it. `Ok(Completed)`, `Ok(Cancelled)` and `Err(_)` are the terminal
/// succeeded / cancelled / failed states.
pub struct Orchestrator {
    source: Box<dyn Source>,
    sink: Box<dyn Sink>,
    capacity: usize,
}

impl Orchestrator {
    pub fn new(source: Box<dyn Source>, sink: Box<dyn Sink>, capacity: usize) -> Self {
        Self { source, sink, capacity }
    }

    /// Select source and sink variants for `cfg`.
    ///
    /// Store endpoints need an opened store handle; file endpoints ignore it.
    pub fn from_config(
        cfg: &PipelineConfig,
        source_store: Option<Arc<dyn KeyValueStore>>,
        target_store: Option<Arc<dyn KeyValueStore>>,
    ) -> Result<Self, PipelineError> {
        cfg.validate()?;

        let source: Box<dyn Source> = match cfg.source.kind {
            EndpointKind::Store => {
                let store = source_store
                    .ok_or_else(|| PipelineError::Config(format!("no store handle for source {}", cfg.source)))?;
                Box::new(
                    StoreSource::new(cfg.source.to_string(), store, cfg.track_ttl, cfg.verbose)
                        .with_scan_count(cfg.scan_count),
                )
            }
            EndpointKind::File => Box::new(FileSource::new(cfg.source.to_string(), &cfg.source.uri, cfg.verbose)),
        };

        let sink: Box<dyn Sink> = match cfg.target.kind {
            EndpointKind::Store => {
                let store = target_store
                    .ok_or_else(|| PipelineError::Config(format!("no store handle for target {}", cfg.target)))?;
                Box::new(StoreSink::new(cfg.target.to_string(), store, cfg.verbose))
            }
            EndpointKind::File => Box::new(FileSink::new(cfg.target.to_string(), &cfg.target.uri, cfg.verbose)),
        };

        Ok(Self::new(source, sink, cfg.bus_capacity))
    }

    /// Run until the source is exhausted and the sink has drained the bus,
    /// a task fails, or `shutdown` resolves.
    ///
    /// Every task is joined before this returns. The first error that is
    /// not a cancellation is reported.
    pub async fn run<F>(self, shutdown: F) -> Result<Outcome, PipelineError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.capacity == 0 {
            return Err(PipelineError::Config("bus_capacity must be at least 1".into()));
        }

        let Orchestrator { mut source, mut sink, capacity } = self;
        tracing::info!(source = %source.name(), sink = %sink.name(), capacity, "pipeline starting");

        let token = CancellationToken::new();
        let (writer, reader) = bus(capacity);
        let mut tasks: JoinSet<(Task, Result<Exit, PipelineError>)> = JoinSet::new();

        let t = token.clone();
        tasks.spawn(async move {
            tokio::select! {
                _ = t.cancelled() => (Task::Signal, Ok(Exit::Done)),
                _ = shutdown => {
                    tracing::info!("termination requested, cancelling");
                    t.cancel();
                    (Task::Signal, Ok(Exit::ShutdownRequested))
                }
            }
        });

        let t = token.clone();
        tasks.spawn(async move {
            let result = source.read(writer, &t).await;
            (Task::Source, result.map(|()| Exit::Done))
        });

        let t = token.clone();
        tasks.spawn(async move {
            let result = sink.write(reader, &t).await;
            // Done or failed, a still-running source must not wait on a bus nobody drains.
            t.cancel();
            (Task::Sink, result.map(|()| Exit::Done))
        });

        let mut first_error: Option<PipelineError> = None;
        let mut shutdown_requested = false;

        while let Some(joined) = tasks.join_next().await {
            let (task, result) = match joined {
                Ok(exit) => exit,
                Err(e) => {
                    token.cancel();
                    let err = PipelineError::TaskPanicked(join_error_detail(e));
                    tracing::error!(error = %err, "task aborted");
                    first_error.get_or_insert(err);
                    continue;
                }
            };

            match result {
                Ok(Exit::ShutdownRequested) => shutdown_requested = true,
                Ok(Exit::Done) => tracing::debug!(%task, "task finished"),
                Err(e) if e.is_cancelled() => tracing::debug!(%task, "task cancelled"),
                Err(e) => {
                    tracing::error!(%task, error = %e, "task failed");
                    token.cancel();
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None if shutdown_requested => {
                tracing::info!("pipeline cancelled");
                Ok(Outcome::Cancelled)
            }
            None => {
                tracing::info!("pipeline completed");
                Ok(Outcome::Completed)
            }
        }
    }
}

fn join_error_detail(e: tokio::task::JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
