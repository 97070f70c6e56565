use anyhow::Error as AnyError;
use core::future::Future;
use core::pin::Pin;

pub type FetchFuture<T> =
    Pin<Box<dyn Future<Output = Result<FetchedPage<T>, CapabilityError>> + Send + 'static>>;
pub type ProcessFuture =
    Pin<Box<dyn Future<Output = Result<(), CapabilityError>> + Send + 'static>>;

/// Identifies which capability surfaced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityStage {
    Fetch,
    Process,
}

/// Error surfaced by a fetch or process capability. Every instance is fatal to
/// the run; the payload is propagated verbatim and never retried.
#[derive(Debug)]
pub struct CapabilityError {
    stage: CapabilityStage,
    source: AnyError,
}

impl CapabilityError {
    pub fn new(stage: CapabilityStage, source: AnyError) -> Self {
        Self { stage, source }
    }

    pub fn fetch(source: impl Into<AnyError>) -> Self {
        Self::new(CapabilityStage::Fetch, source.into())
    }

    pub fn process(source: impl Into<AnyError>) -> Self {
        Self::new(CapabilityStage::Process, source.into())
    }

    pub fn stage(&self) -> CapabilityStage {
        self.stage
    }

    pub fn into_source(self) -> AnyError {
        self.source
    }
}

impl core::fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?} capability error: {}", self.stage, self.source)
    }
}

impl std::error::Error for CapabilityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// One page of results from a [`PageSource`].
///
/// `total` is the source's current report of how many items (pages, in paged
/// mode) it holds overall. The engine treats the latest report as
/// authoritative, so a source may grow or shrink the target mid-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage<T> {
    pub total: u64,
    pub items: Vec<T>,
}

impl<T> FetchedPage<T> {
    pub fn new(total: u64, items: Vec<T>) -> Self {
        Self { total, items }
    }
}

/// Fetch capability supplied by the caller.
///
/// `fetch_page` must be callable repeatedly with an advancing cursor: a raw
/// item offset by default, or a page index when the paged fetch option is set.
pub trait PageSource: Send + Sync + 'static {
    type Item: Send + 'static;

    fn fetch_page(&self, limit: usize, cursor: u64) -> FetchFuture<Self::Item>;
}

/// Process capability supplied by the caller. Invoked once per backlog item,
/// with up to `processing_limit` calls outstanding at a time.
pub trait ItemSink<T>: Send + Sync + 'static {
    fn process(&self, item: T) -> ProcessFuture;
}

impl<T, F> PageSource for F
where
    T: Send + 'static,
    F: Fn(usize, u64) -> FetchFuture<T> + Send + Sync + 'static,
{
    type Item = T;

    fn fetch_page(&self, limit: usize, cursor: u64) -> FetchFuture<T> {
        self(limit, cursor)
    }
}

impl<T, F> ItemSink<T> for F
where
    T: Send + 'static,
    F: Fn(T) -> ProcessFuture + Send + Sync + 'static,
{
    fn process(&self, item: T) -> ProcessFuture {
        self(item)
    }
}
