use crate::queue::backlog::Backlog;
use crate::queue::throttle;
use crate::runtime::config::{FetchOptions, QueueOptions};
use crate::runtime::fatal::{ErrorSlot, RunError};
use crate::runtime::source::PageSource;
use crate::runtime::state::RunState;
use crate::runtime::telemetry::Telemetry;
use core::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Fetch scheduler: issues fetches against the source capability while the
/// concurrency, throttle, and cursor admission checks all hold.
pub(crate) struct FetchLoop<S: PageSource> {
    pub(crate) source: Arc<S>,
    pub(crate) state: Arc<RunState>,
    pub(crate) backlog: Arc<Backlog<S::Item>>,
    pub(crate) errors: ErrorSlot,
    pub(crate) telemetry: Arc<Telemetry>,
    pub(crate) fetch_options: FetchOptions,
    pub(crate) queue_options: QueueOptions,
    pub(crate) abort: CancellationToken,
}

enum Admission {
    Admit,
    Wait,
    Drained,
}

impl<S: PageSource> FetchLoop<S> {
    pub(crate) async fn run(self) {
        tracing::debug!("fetch loop started");
        let mut inflight: JoinSet<()> = JoinSet::new();

        loop {
            while inflight.try_join_next().is_some() {}

            if self.abort.is_cancelled() || self.errors.is_triggered() || self.state.is_finished()
            {
                break;
            }

            match self.admission() {
                Admission::Admit => {
                    // Reserve the slot and advance the cursor before the
                    // result is known; admission is immediately re-checked so
                    // request_limit saturates.
                    self.state.begin_fetch();
                    let cursor = self.state.advance_cursor();
                    tracing::debug!(cursor, "issuing fetch");
                    inflight.spawn(self.fetch_one(cursor));
                }
                Admission::Wait => {
                    let wake = self.state.wake_notified();
                    tokio::pin!(wake);
                    wake.as_mut().enable();
                    if !matches!(self.admission(), Admission::Wait)
                        || self.abort.is_cancelled()
                        || self.state.is_finished()
                    {
                        continue;
                    }
                    tokio::select! {
                        _ = &mut wake => {}
                        _ = self.abort.cancelled() => break,
                    }
                }
                Admission::Drained => break,
            }
        }

        // In-flight fetches observe the abort token themselves; wait for them
        // so no task outlives the run.
        while inflight.join_next().await.is_some() {}
        tracing::debug!("fetch loop stopped");
    }

    fn admission(&self) -> Admission {
        if self.state.cursor_exhausted() {
            if self.state.active_fetches() == 0 {
                return Admission::Drained;
            }
            // A pending response may still grow the reported total.
            return Admission::Wait;
        }

        if self.state.active_fetches() >= self.queue_options.request_limit() {
            return Admission::Wait;
        }

        if !throttle::fetch_admitted(
            self.backlog.len(),
            self.fetch_options.limit(),
            self.state.active_fetches(),
            self.queue_options.queue_limit(),
        ) {
            return Admission::Wait;
        }

        Admission::Admit
    }

    fn fetch_one(&self, cursor: u64) -> impl Future<Output = ()> + Send + 'static {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let backlog = Arc::clone(&self.backlog);
        let errors = self.errors.clone();
        let telemetry = Arc::clone(&self.telemetry);
        let abort = self.abort.clone();
        let limit = self.fetch_options.limit();
        let delay = self.fetch_options.fetch_delay();

        async move {
            let outcome = tokio::select! {
                result = source.fetch_page(limit, cursor) => Some(result),
                _ = abort.cancelled() => None,
            };

            match outcome {
                None => {
                    tracing::debug!(cursor, "fetch abandoned after run settled");
                }
                Some(Err(err)) => {
                    if state.is_finished() {
                        tracing::debug!(cursor, "discarding fetch error after completion");
                    } else {
                        telemetry.record_fetch_error();
                        errors.trigger(RunError::Capability(err));
                    }
                }
                Some(Ok(page)) => {
                    if let Some(delay) = delay {
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = abort.cancelled() => {}
                        }
                    }

                    if errors.is_triggered() || abort.is_cancelled() || state.is_finished() {
                        tracing::debug!(cursor, "discarding fetch result after settlement");
                    } else if !state.observe_total(page.total) {
                        errors.trigger(RunError::SourceEmpty);
                    } else {
                        let count = page.items.len() as u64;
                        telemetry.record_page_fetched(count);
                        state.record_fetched_items(count);
                        backlog.push_page(page.items).await;
                        tracing::debug!(
                            cursor,
                            items = count,
                            backlog = backlog.len(),
                            "page appended to backlog"
                        );
                    }
                }
            }

            state.end_fetch();
            // A shrunken total can make the current processed count terminal.
            state.maybe_finish();
        }
    }
}
