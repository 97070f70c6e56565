use anyhow::{bail, Result};
use std::time::Duration;

/// Default number of items requested per fetch.
pub const DEFAULT_PAGE_SIZE: usize = 50;
/// Default advisory bound on the backlog size.
pub const DEFAULT_QUEUE_LIMIT: usize = 1_000;
const DEFAULT_REQUEST_LIMIT: usize = 1;
const DEFAULT_PROCESSING_LIMIT: usize = 1;
const DEFAULT_MAX_RUNTIME_SECS: u64 = 15_000;
const DEFAULT_METRICS_INTERVAL_SECS: u64 = 5;

/// Source-side options: page size, starting cursor, cursor semantics, and the
/// optional hard cap and forced total.
///
/// All instances must be constructed via [`FetchOptions::builder`] so
/// invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    limit: usize,
    offset: u64,
    max_limit: Option<u64>,
    paged: bool,
    total: Option<u64>,
    fetch_delay: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
            max_limit: None,
            paged: false,
            total: None,
            fetch_delay: None,
        }
    }
}

impl FetchOptions {
    /// Returns a builder seeded with the documented defaults.
    pub fn builder() -> FetchOptionsBuilder {
        FetchOptionsBuilder::default()
    }

    /// Number of items requested per fetch.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Starting cursor position.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Optional hard cap on cursor advancement. Counts pages in paged mode,
    /// items otherwise.
    pub fn max_limit(&self) -> Option<u64> {
        self.max_limit
    }

    /// Whether the cursor is a page index (advances by 1 per fetch) rather
    /// than a raw item offset (advances by `limit`).
    pub fn paged(&self) -> bool {
        self.paged
    }

    /// Caller-forced total, skipping discovery from fetch responses.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Artificial delay applied before each fetch result is delivered.
    pub fn fetch_delay(&self) -> Option<Duration> {
        self.fetch_delay
    }

    /// How far the cursor advances per issued fetch.
    pub fn cursor_step(&self) -> u64 {
        if self.paged {
            1
        } else {
            self.limit as u64
        }
    }

    /// Performs validation on an existing options instance.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            bail!("limit must be greater than 0");
        }

        if let Some(max_limit) = self.max_limit {
            if max_limit == 0 {
                bail!("max_limit must be greater than 0 when set");
            }
        }

        if let Some(delay) = self.fetch_delay {
            if delay.is_zero() {
                bail!("fetch_delay must be greater than 0 when set");
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct FetchOptionsBuilder {
    limit: Option<usize>,
    offset: Option<u64>,
    max_limit: Option<u64>,
    paged: Option<bool>,
    total: Option<u64>,
    fetch_delay: Option<Duration>,
}

impl FetchOptionsBuilder {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn max_limit(mut self, max_limit: u64) -> Self {
        self.max_limit = Some(max_limit);
        self
    }

    pub fn paged(mut self, paged: bool) -> Self {
        self.paged = Some(paged);
        self
    }

    pub fn total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn build(self) -> Result<FetchOptions> {
        let options = FetchOptions {
            limit: self.limit.unwrap_or(DEFAULT_PAGE_SIZE),
            offset: self.offset.unwrap_or(0),
            max_limit: self.max_limit,
            paged: self.paged.unwrap_or(false),
            total: self.total,
            fetch_delay: self.fetch_delay,
        };

        options.validate()?;
        Ok(options)
    }
}

/// Engine-side options: concurrency limits, the advisory backlog bound, and
/// the runtime budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    request_limit: usize,
    processing_limit: usize,
    queue_limit: usize,
    max_runtime: Duration,
    process_delay: Option<Duration>,
    metrics_interval: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            request_limit: DEFAULT_REQUEST_LIMIT,
            processing_limit: DEFAULT_PROCESSING_LIMIT,
            queue_limit: DEFAULT_QUEUE_LIMIT,
            max_runtime: Duration::from_secs(DEFAULT_MAX_RUNTIME_SECS),
            process_delay: None,
            metrics_interval: Duration::from_secs(DEFAULT_METRICS_INTERVAL_SECS),
        }
    }
}

impl QueueOptions {
    /// Returns a builder seeded with the documented defaults.
    pub fn builder() -> QueueOptionsBuilder {
        QueueOptionsBuilder::default()
    }

    /// Maximum number of fetches in flight at once.
    pub fn request_limit(&self) -> usize {
        self.request_limit
    }

    /// Maximum number of process calls in flight at once.
    pub fn processing_limit(&self) -> usize {
        self.processing_limit
    }

    /// Advisory bound on backlog growth. The fetch loop's admission check
    /// keeps its projected backlog below this value; it is not a hard cap.
    pub fn queue_limit(&self) -> usize {
        self.queue_limit
    }

    /// Wall-clock budget for the whole run.
    pub fn max_runtime(&self) -> Duration {
        self.max_runtime
    }

    /// Artificial delay applied before each process result is delivered.
    pub fn process_delay(&self) -> Option<Duration> {
        self.process_delay
    }

    /// Interval used by the metrics reporter task.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Performs validation on an existing options instance.
    pub fn validate(&self) -> Result<()> {
        if self.request_limit == 0 {
            bail!("request_limit must be greater than 0");
        }

        if self.processing_limit == 0 {
            bail!("processing_limit must be greater than 0");
        }

        if self.queue_limit == 0 {
            bail!("queue_limit must be greater than 0");
        }

        if self.max_runtime.is_zero() {
            bail!("max_runtime must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if let Some(delay) = self.process_delay {
            if delay.is_zero() {
                bail!("process_delay must be greater than 0 when set");
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct QueueOptionsBuilder {
    request_limit: Option<usize>,
    processing_limit: Option<usize>,
    queue_limit: Option<usize>,
    max_runtime: Option<Duration>,
    process_delay: Option<Duration>,
    metrics_interval: Option<Duration>,
}

impl QueueOptionsBuilder {
    pub fn request_limit(mut self, limit: usize) -> Self {
        self.request_limit = Some(limit);
        self
    }

    pub fn processing_limit(mut self, limit: usize) -> Self {
        self.processing_limit = Some(limit);
        self
    }

    pub fn queue_limit(mut self, limit: usize) -> Self {
        self.queue_limit = Some(limit);
        self
    }

    pub fn max_runtime(mut self, budget: Duration) -> Self {
        self.max_runtime = Some(budget);
        self
    }

    pub fn process_delay(mut self, delay: Duration) -> Self {
        self.process_delay = Some(delay);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<QueueOptions> {
        let options = QueueOptions {
            request_limit: self.request_limit.unwrap_or(DEFAULT_REQUEST_LIMIT),
            processing_limit: self.processing_limit.unwrap_or(DEFAULT_PROCESSING_LIMIT),
            queue_limit: self.queue_limit.unwrap_or(DEFAULT_QUEUE_LIMIT),
            max_runtime: self
                .max_runtime
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_MAX_RUNTIME_SECS)),
            process_delay: self.process_delay,
            metrics_interval: self
                .metrics_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_METRICS_INTERVAL_SECS)),
        };

        options.validate()?;
        Ok(options)
    }
}
