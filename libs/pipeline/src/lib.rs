//! Streaming pipeline: a source adapter feeds records through a bounded
//! bus into a sink adapter, all under one cancellation token.

pub mod bus;
pub mod config;
pub mod error;
pub mod frame;
pub mod progress;
pub mod run;
pub mod sink;
pub mod source;

pub use bus::{BusError, BusReader, BusWriter, Taken, bus};
pub use config::{Endpoint, EndpointKind, PipelineConfig};
pub use error::{FrameError, PipelineError};
pub use run::{Orchestrator, Outcome};
pub use sink::{FileSink, Sink, StoreSink};
pub use source::{FileSource, Source, StoreSource};
