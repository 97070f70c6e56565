use anyhow::anyhow;
use pagedrain::{
    CapabilityError, FetchFuture, FetchedPage, ItemSink, PageSource, ProcessFuture,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

pub use pagedrain::init_tracing;

/// Deterministic paginated source over the items `0..size` (raw offset
/// cursor). Records every cursor it is called with.
pub struct ScriptedSource {
    size: u64,
    latency: Option<Duration>,
    fail_at_cursor: Option<u64>,
    cursors: Arc<Mutex<Vec<u64>>>,
}

impl ScriptedSource {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            latency: None,
            fail_at_cursor: None,
            cursors: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn failing_at(mut self, cursor: u64) -> Self {
        self.fail_at_cursor = Some(cursor);
        self
    }

    pub fn cursors(&self) -> Arc<Mutex<Vec<u64>>> {
        Arc::clone(&self.cursors)
    }
}

impl PageSource for ScriptedSource {
    type Item = u64;

    fn fetch_page(&self, limit: usize, cursor: u64) -> FetchFuture<u64> {
        let size = self.size;
        let latency = self.latency;
        let fail_at_cursor = self.fail_at_cursor;
        let cursors = Arc::clone(&self.cursors);
        Box::pin(async move {
            cursors.lock().unwrap().push(cursor);
            if let Some(latency) = latency {
                sleep(latency).await;
            }
            if fail_at_cursor == Some(cursor) {
                return Err(CapabilityError::fetch(anyhow!(
                    "scripted fetch failure at cursor {cursor}"
                )));
            }
            let start = cursor.min(size);
            let end = cursor.saturating_add(limit as u64).min(size);
            Ok(FetchedPage::new(size, (start..end).collect()))
        })
    }
}

/// Paged-mode variant: the cursor is a page index and the reported total
/// counts pages. Indices at or past the last page yield an empty page.
pub struct PagedScriptedSource {
    pages: u64,
    page_size: u64,
    cursors: Arc<Mutex<Vec<u64>>>,
}

impl PagedScriptedSource {
    pub fn new(pages: u64, page_size: u64) -> Self {
        Self {
            pages,
            page_size,
            cursors: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn cursors(&self) -> Arc<Mutex<Vec<u64>>> {
        Arc::clone(&self.cursors)
    }
}

impl PageSource for PagedScriptedSource {
    type Item = u64;

    fn fetch_page(&self, _limit: usize, cursor: u64) -> FetchFuture<u64> {
        let pages = self.pages;
        let page_size = self.page_size;
        let cursors = Arc::clone(&self.cursors);
        Box::pin(async move {
            cursors.lock().unwrap().push(cursor);
            let items = if cursor < pages {
                let start = cursor * page_size;
                (start..start + page_size).collect()
            } else {
                Vec::new()
            };
            Ok(FetchedPage::new(pages, items))
        })
    }
}

/// Sink that records every item it processes, with optional per-item latency
/// and an optional scripted failure.
pub struct RecordingSink {
    seen: Arc<Mutex<Vec<u64>>>,
    latency: Option<Duration>,
    fail_at_item: Option<u64>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
            latency: None,
            fail_at_item: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn failing_at(mut self, item: u64) -> Self {
        self.fail_at_item = Some(item);
        self
    }

    pub fn seen(&self) -> Arc<Mutex<Vec<u64>>> {
        Arc::clone(&self.seen)
    }
}

impl ItemSink<u64> for RecordingSink {
    fn process(&self, item: u64) -> ProcessFuture {
        let seen = Arc::clone(&self.seen);
        let latency = self.latency;
        let fail_at_item = self.fail_at_item;
        Box::pin(async move {
            if let Some(latency) = latency {
                sleep(latency).await;
            }
            if fail_at_item == Some(item) {
                return Err(CapabilityError::process(anyhow!(
                    "scripted process failure at item {item}"
                )));
            }
            seen.lock().unwrap().push(item);
            Ok(())
        })
    }
}
