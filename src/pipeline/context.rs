use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Runtime statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessingStats {
    pub sources_processed: usize,
    pub sources_failed: usize,
    pub lines_read: usize,
    pub records_output: usize,
    pub parse_failures: usize,
    pub processing_time: Duration,
}

impl ProcessingStats {
    /// Fold one source's numbers into a running total
    pub fn add(&mut self, other: &ProcessingStats) {
        self.sources_processed += other.sources_processed;
        self.sources_failed += other.sources_failed;
        self.lines_read += other.lines_read;
        self.records_output += other.records_output;
        self.parse_failures += other.parse_failures;
        self.processing_time += other.processing_time;
    }
}

/// Shared flag checked between lines; set it to stop the run early.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
