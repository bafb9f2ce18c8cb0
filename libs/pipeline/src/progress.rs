use std::time::Instant;

use crate::PipelineError;

/// Records between two progress lines.
const REPORT_EVERY: u64 = 1000;

/// Per-adapter record counter. Logs throughput only when verbose.
#[derive(Debug)]
pub struct Progress {
    role: &'static str,
    name: String,
    verbose: bool,
    count: u64,
    skipped: u64,
    start: Instant,
}

impl Progress {
    pub fn new(role: &'static str, name: impl Into<String>, verbose: bool) -> Self {
        Self {
            role,
            name: name.into(),
            verbose,
            count: 0,
            skipped: 0,
            start: Instant::now(),
        }
    }

    pub fn record(&mut self) {
        self.count += 1;
        if self.verbose && self.count % REPORT_EVERY == 0 {
            let elapsed = self.start.elapsed().as_secs_f64();
            tracing::info!(
                role = self.role,
                name = %self.name,
                records = self.count,
                rate = format_args!("{:.1}", self.count as f64 / elapsed.max(f64::EPSILON)),
                "progress"
            );
        }
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Final summary line, emitted once when the adapter exits.
    pub fn finish(&self, outcome: &str) {
        let elapsed = self.start.elapsed();
        if self.verbose {
            tracing::info!(
                role = self.role,
                name = %self.name,
                records = self.count,
                skipped = self.skipped,
                elapsed_s = format_args!("{:.1}", elapsed.as_secs_f64()),
                outcome,
                "finished"
            );
        } else {
            tracing::debug!(
                role = self.role,
                name = %self.name,
                records = self.count,
                skipped = self.skipped,
                outcome,
                "finished"
            );
        }
    }
}

/// Label for the summary line of an adapter that returned `result`.
pub(crate) fn outcome_of(result: &Result<(), PipelineError>) -> &'static str {
    match result {
        Ok(()) => "completed",
        Err(e) if e.is_cancelled() => "cancelled",
        Err(_) => "failed",
    }
}
