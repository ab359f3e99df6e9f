//! Pipeline run summaries.

use std::path::PathBuf;
use std::time::Instant;

/// Result of a single pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Files written, in write order
    pub written: Vec<PathBuf>,

    /// Inputs skipped: output up to date, or no encoder for the input
    pub skipped: usize,

    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl PipelineReport {
    pub(crate) fn record(&mut self, path: PathBuf) {
        tracing::debug!("Wrote {}", path.display());
        self.written.push(path);
    }

    pub(crate) fn skip(&mut self) {
        self.skipped += 1;
    }

    pub(crate) fn merge(&mut self, other: PipelineReport) {
        self.written.extend(other.written);
        self.skipped += other.skipped;
    }

    pub(crate) fn finish(mut self, start: Instant) -> Self {
        self.duration_ms = start.elapsed().as_millis() as u64;
        self
    }
}
