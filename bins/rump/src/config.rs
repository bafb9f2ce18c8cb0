use std::path::Path;

use clap::Args;
use serde::Deserialize;

use pipeline::{Endpoint, PipelineConfig};

use crate::error::RumpError;

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub from: Option<String>,
    pub to: Option<String>,
    pub ttl: Option<bool>,
    pub silent: Option<bool>,
    pub buffer: Option<usize>,
    pub scan_count: Option<usize>,
}

/// A missing file is an empty config; an unreadable or malformed one is an error.
pub fn load_config(path: &str) -> Result<Config, RumpError> {
    if !Path::new(path).exists() {
        return Ok(Config::default());
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| RumpError::Config(format!("cannot read config {path}: {e}")))?;
    toml::from_str(&content).map_err(|e| RumpError::Config(format!("bad config {path}: {e}")))
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Path to rump.toml
    #[arg(long, default_value = "rump.toml", env = "RUMP_CONFIG")]
    pub config: String,

    /// Source: redis://[user:password@]host[:port][/db] or a dump file path
    #[arg(long, env = "RUMP_FROM")]
    pub from: Option<String>,

    /// Target: redis://[user:password@]host[:port][/db] or a dump file path
    #[arg(long, env = "RUMP_TO")]
    pub to: Option<String>,

    /// Carry key expirations over (one extra PTTL per key)
    #[arg(long, env = "RUMP_TTL")]
    pub ttl: bool,

    /// Only log warnings, errors and the final outcome
    #[arg(long, env = "RUMP_SILENT")]
    pub silent: bool,

    /// Records buffered between source and target
    #[arg(long, env = "RUMP_BUFFER")]
    pub buffer: Option<usize>,

    /// Keys requested per SCAN page
    #[arg(long, env = "RUMP_SCAN_COUNT")]
    pub scan_count: Option<usize>,
}

// ═══════════════════════════════════════════════════════════════
//  Effective — merged config
// ═══════════════════════════════════════════════════════════════

/// Final configuration: rump.toml < env/CLI.
#[derive(Debug)]
pub struct Effective {
    pub pipeline: PipelineConfig,
}

impl Effective {
    pub fn new(args: &RunArgs) -> Result<Self, RumpError> {
        let cfg = load_config(&args.config)?;
        Self::merge(args, cfg)
    }

    fn merge(args: &RunArgs, cfg: Config) -> Result<Self, RumpError> {
        let from = args
            .from
            .clone()
            .or(cfg.from)
            .ok_or_else(|| RumpError::Config("no source: pass --from or set `from` in the config file".into()))?;
        let to = args
            .to
            .clone()
            .or(cfg.to)
            .ok_or_else(|| RumpError::Config("no target: pass --to or set `to` in the config file".into()))?;

        let mut pipeline = PipelineConfig::new(Endpoint::parse(&from)?, Endpoint::parse(&to)?);
        pipeline.track_ttl = args.ttl || cfg.ttl.unwrap_or(false);
        pipeline.verbose = !(args.silent || cfg.silent.unwrap_or(false));
        if let Some(n) = args.buffer.or(cfg.buffer) {
            pipeline.bus_capacity = n;
        }
        if let Some(n) = args.scan_count.or(cfg.scan_count) {
            pipeline.scan_count = n;
        }
        pipeline.validate()?;

        Ok(Self { pipeline })
    }
}
