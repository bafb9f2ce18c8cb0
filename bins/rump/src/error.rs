use rump_api::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RumpError {
    #[error("config: {0}")]
    Config(String),

    #[error("connect {endpoint}: {source}")]
    Connect { endpoint: String, source: StoreError },

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
