use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// FIFO of fetched-but-unprocessed items.
///
/// Pages are appended at the tail in arrival order and items leave from the
/// head one at a time. The length is mirrored into an atomic so the fetch
/// loop's throttle math can read it without taking the lock. Growth is
/// bounded by the fetch loop's admission check, not by the backlog itself.
pub struct Backlog<T> {
    items: Mutex<VecDeque<T>>,
    len: AtomicUsize,
}

impl<T> Backlog<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// Backlog pre-filled with an array-mode run's entire input.
    pub fn seeded(items: Vec<T>) -> Self {
        let items: VecDeque<T> = items.into();
        let len = items.len();
        Self {
            items: Mutex::new(items),
            len: AtomicUsize::new(len),
        }
    }

    /// Appends one fetched page at the tail.
    pub async fn push_page(&self, page: Vec<T>) {
        if page.is_empty() {
            return;
        }
        let mut items = self.items.lock().await;
        items.extend(page);
        self.len.store(items.len(), Ordering::SeqCst);
    }

    /// Removes and returns the head item, if any.
    pub async fn pop(&self) -> Option<T> {
        let mut items = self.items.lock().await;
        let item = items.pop_front();
        self.len.store(items.len(), Ordering::SeqCst);
        item
    }

    /// Current number of queued items. Lock-free; may be momentarily stale
    /// relative to a concurrent push or pop, which the advisory throttle
    /// tolerates.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Backlog<T> {
    fn default() -> Self {
        Self::new()
    }
}
