use crate::runtime::fatal::RunError;
use std::fmt;
use std::time::Duration;

/// Successful settlement of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Final known total of the source (the completion target's basis).
    pub fetched: u64,
    /// Items successfully processed.
    pub processed: u64,
    /// Wall-clock duration from start to the completion latch.
    pub elapsed: Duration,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "done: fetched={} processed={} time={:.3}s",
            self.fetched,
            self.processed,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Failed settlement of a run: the terminal error plus a summary of how far
/// the run got.
#[derive(Debug)]
pub struct RunFailure {
    pub error: RunError,
    /// Items fetched into the backlog before the failure.
    pub fetched: u64,
    /// Items successfully processed before the failure.
    pub processed: u64,
    pub elapsed: Duration,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (fetched={} processed={} time={:.3}s)",
            self.error,
            self.fetched,
            self.processed,
            self.elapsed.as_secs_f64()
        )
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Snapshot emitted after every successfully processed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Cursor position at the time the item completed.
    pub offset: u64,
    /// Backlog length at the time the item completed.
    pub queue_size: usize,
    /// Processed count including this item.
    pub processed: u64,
}
