//! Advisory backlog throttle.
//!
//! The fetch loop bounds backlog growth with a projection rather than a
//! measurement: it assumes every in-flight fetch plus the one it is about to
//! issue will land a full page. The estimate errs high for partial pages, so
//! the real backlog can transiently overshoot `queue_limit` by at most the
//! in-flight pages that were already admitted. `queue_limit` is therefore an
//! advisory bound, not a hard cap.

/// Backlog size if every in-flight fetch and one more admitted fetch each
/// return a full page.
pub fn projected_backlog(backlog_len: usize, page_size: usize, active_fetches: usize) -> usize {
    backlog_len.saturating_add(page_size.saturating_mul(active_fetches.saturating_add(1)))
}

/// Whether one more fetch may be admitted under the advisory bound.
pub fn fetch_admitted(
    backlog_len: usize,
    page_size: usize,
    active_fetches: usize,
    queue_limit: usize,
) -> bool {
    projected_backlog(backlog_len, page_size, active_fetches) < queue_limit
}
