use crate::engine::outcome::ProgressUpdate;
use crate::queue::backlog::Backlog;
use crate::runtime::fatal::{ErrorSlot, RunError};
use crate::runtime::source::ItemSink;
use crate::runtime::state::RunState;
use crate::runtime::telemetry::Telemetry;
use core::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Process scheduler: drains the backlog head through the sink capability
/// while the error slot is clean and `processing_limit` is not saturated.
pub(crate) struct ProcessLoop<T, K: ItemSink<T>> {
    pub(crate) sink: Arc<K>,
    pub(crate) state: Arc<RunState>,
    pub(crate) backlog: Arc<Backlog<T>>,
    pub(crate) errors: ErrorSlot,
    pub(crate) telemetry: Arc<Telemetry>,
    pub(crate) processing_limit: usize,
    pub(crate) process_delay: Option<Duration>,
    pub(crate) progress: Option<mpsc::UnboundedSender<ProgressUpdate>>,
    pub(crate) abort: CancellationToken,
}

impl<T: Send + 'static, K: ItemSink<T>> ProcessLoop<T, K> {
    pub(crate) async fn run(self) {
        tracing::debug!("process loop started");
        let mut inflight: JoinSet<()> = JoinSet::new();

        loop {
            while inflight.try_join_next().is_some() {}

            if self.abort.is_cancelled() || self.errors.is_triggered() || self.state.is_finished()
            {
                break;
            }

            if self.state.active_processes() < self.processing_limit {
                if let Some(item) = self.backlog.pop().await {
                    self.state.begin_process();
                    inflight.spawn(self.process_one(item));
                    continue;
                }
            }

            let wake = self.state.wake_notified();
            tokio::pin!(wake);
            wake.as_mut().enable();
            if self.admission_open() || self.abort.is_cancelled() || self.state.is_finished() {
                continue;
            }
            tokio::select! {
                _ = &mut wake => {}
                _ = self.abort.cancelled() => break,
            }
        }

        while inflight.join_next().await.is_some() {}
        tracing::debug!("process loop stopped");
    }

    fn admission_open(&self) -> bool {
        self.state.active_processes() < self.processing_limit && !self.backlog.is_empty()
    }

    fn process_one(&self, item: T) -> impl Future<Output = ()> + Send + 'static {
        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);
        let backlog = Arc::clone(&self.backlog);
        let errors = self.errors.clone();
        let telemetry = Arc::clone(&self.telemetry);
        let progress = self.progress.clone();
        let abort = self.abort.clone();
        let delay = self.process_delay;

        async move {
            let outcome = tokio::select! {
                result = sink.process(item) => Some(result),
                _ = abort.cancelled() => None,
            };

            match outcome {
                None => {
                    tracing::debug!("process abandoned after run settled");
                }
                Some(Err(err)) => {
                    if state.is_finished() {
                        tracing::debug!("discarding process error after completion");
                    } else {
                        telemetry.record_process_error();
                        errors.trigger(RunError::Capability(err));
                    }
                }
                Some(Ok(())) => {
                    if let Some(delay) = delay {
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = abort.cancelled() => {}
                        }
                    }

                    if errors.is_triggered() || abort.is_cancelled() || state.is_finished() {
                        tracing::debug!("discarding process result after settlement");
                    } else if let Some(processed) = state.try_record_processed() {
                        telemetry.record_item_processed();

                        let update = ProgressUpdate {
                            offset: state.cursor(),
                            queue_size: backlog.len(),
                            processed,
                        };
                        tracing::debug!(
                            offset = update.offset,
                            queue_size = update.queue_size,
                            processed = update.processed,
                            "item processed"
                        );
                        if let Some(progress) = &progress {
                            let _ = progress.send(update);
                        }

                        state.maybe_finish();
                    } else {
                        tracing::debug!("discarding completion past the item target");
                    }
                }
            }

            state.end_process();
        }
    }
}
