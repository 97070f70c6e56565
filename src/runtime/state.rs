use crate::runtime::config::FetchOptions;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

const TOTAL_UNKNOWN: u64 = u64::MAX;

/// Mutable record shared by the fetch loop, the process loop, and in-flight
/// capability tasks. Owned by exactly one run; never reused.
///
/// The cursor is advanced only by the fetch loop, before the corresponding
/// fetch result is known, which is what allows pipelined read-ahead when
/// `request_limit` exceeds 1. Everything else is updated by task completions.
pub struct RunState {
    cursor: AtomicU64,
    cursor_step: u64,
    page_size: u64,
    paged: bool,
    max_limit: Option<u64>,
    total_forced: bool,
    total: AtomicU64,
    active_fetches: AtomicUsize,
    active_processes: AtomicUsize,
    processed: AtomicU64,
    fetched_items: AtomicU64,
    started_at: Instant,
    finished: AtomicBool,
    finished_at: Mutex<Option<Instant>>,
    wake: Notify,
    done: CancellationToken,
}

impl RunState {
    pub fn new(options: &FetchOptions) -> Self {
        let forced = options.total().map(|total| clamp_total(total, options.max_limit()));
        Self {
            cursor: AtomicU64::new(options.offset()),
            cursor_step: options.cursor_step(),
            page_size: options.limit() as u64,
            paged: options.paged(),
            max_limit: options.max_limit(),
            total_forced: forced.is_some(),
            total: AtomicU64::new(forced.unwrap_or(TOTAL_UNKNOWN)),
            active_fetches: AtomicUsize::new(0),
            active_processes: AtomicUsize::new(0),
            processed: AtomicU64::new(0),
            fetched_items: AtomicU64::new(0),
            started_at: Instant::now(),
            finished: AtomicBool::new(false),
            finished_at: Mutex::new(None),
            wake: Notify::new(),
            done: CancellationToken::new(),
        }
    }

    /// State for an array-mode run over `len` pre-materialized items. The
    /// total is known up front and no fetch loop ever observes this state.
    pub fn for_array(len: u64) -> Self {
        let mut state = Self::new(&FetchOptions::default());
        state.total = AtomicU64::new(len);
        state.total_forced = true;
        state.fetched_items = AtomicU64::new(len);
        state
    }

    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Reserves the next fetch position, returning the cursor value the fetch
    /// should be issued with.
    pub fn advance_cursor(&self) -> u64 {
        self.cursor.fetch_add(self.cursor_step, Ordering::SeqCst)
    }

    pub fn total(&self) -> Option<u64> {
        match self.total.load(Ordering::SeqCst) {
            TOTAL_UNKNOWN => None,
            value => Some(value),
        }
    }

    /// Records the total reported by a fetch response. The latest report is
    /// authoritative and may grow or shrink the target; values above
    /// `max_limit` are clamped to it. Returns `false` when the source
    /// reported empty before any total was known, which is fatal to the run.
    pub fn observe_total(&self, reported: u64) -> bool {
        if self.total_forced {
            return true;
        }

        if reported == 0 && self.total().is_none() {
            return false;
        }

        self.total
            .store(clamp_total(reported, self.max_limit), Ordering::SeqCst);
        self.wake.notify_waiters();
        true
    }

    pub fn active_fetches(&self) -> usize {
        self.active_fetches.load(Ordering::SeqCst)
    }

    pub fn begin_fetch(&self) {
        self.active_fetches.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end_fetch(&self) {
        self.active_fetches.fetch_sub(1, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn active_processes(&self) -> usize {
        self.active_processes.load(Ordering::SeqCst)
    }

    pub fn begin_process(&self) {
        self.active_processes.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end_process(&self) {
        self.active_processes.fetch_sub(1, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn fetched_items(&self) -> u64 {
        self.fetched_items.load(Ordering::SeqCst)
    }

    pub fn record_fetched_items(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.fetched_items.fetch_add(count, Ordering::SeqCst);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// Counts one successfully processed item and returns the new count.
    /// Returns `None` for straggler completions: once the run has latched, or
    /// the count has reached the target, the count no longer moves. The
    /// compare-and-swap keeps concurrent completions from racing past a
    /// target that shrank while they were in flight.
    pub fn try_record_processed(&self) -> Option<u64> {
        let target = self.item_target();
        let mut current = self.processed.load(Ordering::SeqCst);
        loop {
            if self.is_finished() {
                return None;
            }
            if let Some(target) = target {
                if current >= target {
                    return None;
                }
            }
            match self.processed.compare_exchange(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Some(current + 1),
                Err(actual) => current = actual,
            }
        }
    }

    /// Number of processed items at which the run is complete. `None` while
    /// the total is undiscovered and no `max_limit` is configured.
    ///
    /// In paged mode both the reported total and `max_limit` count pages, so
    /// the target scales by the page size. When both a total and `max_limit`
    /// are known the smaller wins, so a source larger than the cap stops at
    /// the cap and a source smaller than the cap still completes.
    pub fn item_target(&self) -> Option<u64> {
        let scale = if self.paged { self.page_size } else { 1 };
        let bound = match (self.total(), self.max_limit) {
            (Some(total), Some(max_limit)) => total.min(max_limit),
            (Some(total), None) => total,
            (None, Some(max_limit)) => max_limit,
            (None, None) => return None,
        };
        Some(bound.saturating_mul(scale))
    }

    /// Whether the cursor has reached the end of what may be fetched. In
    /// paged mode the cursor may run one page past the reported total, per
    /// the page-index semantics of the cursor.
    pub fn cursor_exhausted(&self) -> bool {
        let cursor = self.cursor();

        if let Some(max_limit) = self.max_limit {
            if cursor >= max_limit {
                return true;
            }
        }

        if let Some(total) = self.total() {
            let bound = if self.paged { total + 1 } else { total };
            if cursor >= bound {
                return true;
            }
        }

        false
    }

    /// Latches completion if the processed count has reached the target.
    /// Returns `true` only for the call that performed the latch; the latch
    /// is permanent and cancels the `done` token exactly once.
    pub fn maybe_finish(&self) -> bool {
        let Some(target) = self.item_target() else {
            return false;
        };

        if self.processed() < target {
            return false;
        }

        if self.finished.swap(true, Ordering::SeqCst) {
            return false;
        }

        {
            let mut slot = self.finished_at.lock().unwrap();
            *slot = Some(Instant::now());
        }
        self.done.cancel();
        self.wake.notify_waiters();
        true
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn done_token(&self) -> CancellationToken {
        self.done.clone()
    }

    /// Run duration: up to `finished_at` once the run has completed,
    /// otherwise up to now.
    pub fn elapsed(&self) -> Duration {
        let finished_at = *self.finished_at.lock().unwrap();
        match finished_at {
            Some(instant) => instant.duration_since(self.started_at),
            None => self.started_at.elapsed(),
        }
    }

    pub fn notify(&self) {
        self.wake.notify_waiters();
    }

    /// Wake-up future for the register-then-recheck wait pattern used by both
    /// scheduler loops.
    pub fn wake_notified(&self) -> Notified<'_> {
        self.wake.notified()
    }
}

fn clamp_total(total: u64, max_limit: Option<u64>) -> u64 {
    match max_limit {
        Some(max_limit) if max_limit < total => max_limit,
        _ => total,
    }
}
