use std::path::PathBuf;

use rump_api::StoreError;

/// Malformed or unreadable frame stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("truncated record at byte {offset}")]
    Truncated { offset: u64 },

    #[error("invalid length prefix at byte {offset}")]
    InvalidLength { offset: u64 },

    #[error("empty key in record at byte {offset}")]
    EmptyKey { offset: u64 },

    #[error("record at byte {offset}: {source}")]
    InvalidTtl { offset: u64, source: rump_api::InvalidTtl },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(String),

    #[error("open '{}': {source}", path.display())]
    Open { path: PathBuf, source: std::io::Error },

    #[error("write '{}': {source}", path.display())]
    Write { path: PathBuf, source: std::io::Error },

    #[error("frame: {0}")]
    Frame(#[from] FrameError),

    #[error("scan: {0}")]
    Scan(StoreError),

    #[error("restore '{key}': {source}")]
    Restore { key: String, source: StoreError },

    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Cancellation unwinds tasks but is never reported as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}
