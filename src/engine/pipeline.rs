use crate::engine::fetch_loop::FetchLoop;
use crate::engine::outcome::{ProgressUpdate, RunFailure, RunReport};
use crate::engine::process_loop::ProcessLoop;
use crate::queue::backlog::Backlog;
use crate::runtime::config::{FetchOptions, QueueOptions};
use crate::runtime::fatal::{ErrorSlot, RunError};
use crate::runtime::source::{ItemSink, PageSource};
use crate::runtime::state::RunState;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Pull-pipeline engine.
///
/// One `DrainPipeline` carries the resolved options, telemetry, and the
/// optional progress channel; each call to [`DrainPipeline::run`] or
/// [`DrainPipeline::run_items`] owns its own run state and settles exactly
/// once, either with a [`RunReport`] or a [`RunFailure`].
pub struct DrainPipeline {
    fetch_options: FetchOptions,
    queue_options: QueueOptions,
    telemetry: Arc<Telemetry>,
    progress: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

impl DrainPipeline {
    pub fn new(fetch_options: FetchOptions, queue_options: QueueOptions) -> Self {
        Self {
            fetch_options,
            queue_options,
            telemetry: Arc::new(Telemetry::default()),
            progress: None,
        }
    }

    /// Returns a clone of the telemetry handle for observability.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Opens the progress channel. Every successfully processed item emits
    /// one [`ProgressUpdate`] into it; dropping the receiver is harmless.
    pub fn progress_channel(&mut self) -> mpsc::UnboundedReceiver<ProgressUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.progress = Some(tx);
        rx
    }

    /// Drains `source` through `sink` until the discovered target is reached,
    /// an error is recorded, or the runtime budget elapses.
    pub async fn run<S, K>(&self, source: S, sink: K) -> Result<RunReport, RunFailure>
    where
        S: PageSource,
        K: ItemSink<S::Item>,
    {
        let state = Arc::new(RunState::new(&self.fetch_options));
        let backlog: Arc<Backlog<S::Item>> = Arc::new(Backlog::new());
        let abort = CancellationToken::new();
        let errors = ErrorSlot::new(abort.clone());

        tracing::info!(
            limit = self.fetch_options.limit(),
            offset = self.fetch_options.offset(),
            paged = self.fetch_options.paged(),
            request_limit = self.queue_options.request_limit(),
            processing_limit = self.queue_options.processing_limit(),
            queue_limit = self.queue_options.queue_limit(),
            "starting drain run"
        );

        let fetch_loop = FetchLoop {
            source: Arc::new(source),
            state: Arc::clone(&state),
            backlog: Arc::clone(&backlog),
            errors: errors.clone(),
            telemetry: Arc::clone(&self.telemetry),
            fetch_options: self.fetch_options.clone(),
            queue_options: self.queue_options.clone(),
            abort: abort.clone(),
        };
        let process_loop = ProcessLoop {
            sink: Arc::new(sink),
            state: Arc::clone(&state),
            backlog: Arc::clone(&backlog),
            errors: errors.clone(),
            telemetry: Arc::clone(&self.telemetry),
            processing_limit: self.queue_options.processing_limit(),
            process_delay: self.queue_options.process_delay(),
            progress: self.progress.clone(),
            abort: abort.clone(),
        };

        let handles = vec![
            tokio::spawn(fetch_loop.run()),
            tokio::spawn(process_loop.run()),
        ];
        self.settle(state, backlog, errors, abort, handles).await
    }

    /// Array mode: drains a pre-materialized item vector through `sink`. The
    /// vector's length is the total, the whole vector seeds the backlog, and
    /// no fetch is ever issued. An empty input resolves immediately without
    /// spawning anything.
    pub async fn run_items<T, K>(&self, items: Vec<T>, sink: K) -> Result<RunReport, RunFailure>
    where
        T: Send + 'static,
        K: ItemSink<T>,
    {
        if items.is_empty() {
            tracing::info!("array-mode input empty; resolving immediately");
            return Ok(RunReport {
                fetched: 0,
                processed: 0,
                elapsed: Duration::ZERO,
            });
        }

        let len = items.len() as u64;
        let state = Arc::new(RunState::for_array(len));
        let backlog = Arc::new(Backlog::seeded(items));
        let abort = CancellationToken::new();
        let errors = ErrorSlot::new(abort.clone());

        tracing::info!(items = len, "starting array-mode drain run");

        let process_loop = ProcessLoop {
            sink: Arc::new(sink),
            state: Arc::clone(&state),
            backlog: Arc::clone(&backlog),
            errors: errors.clone(),
            telemetry: Arc::clone(&self.telemetry),
            processing_limit: self.queue_options.processing_limit(),
            process_delay: self.queue_options.process_delay(),
            progress: self.progress.clone(),
            abort: abort.clone(),
        };

        let handles = vec![tokio::spawn(process_loop.run())];
        self.settle(state, backlog, errors, abort, handles).await
    }

    async fn settle<T: Send + 'static>(
        &self,
        state: Arc<RunState>,
        backlog: Arc<Backlog<T>>,
        errors: ErrorSlot,
        abort: CancellationToken,
        handles: Vec<JoinHandle<()>>,
    ) -> Result<RunReport, RunFailure> {
        let reporter_shutdown = CancellationToken::new();
        let reporter = spawn_metrics_reporter(
            self.telemetry.clone(),
            Arc::clone(&state),
            backlog,
            reporter_shutdown.clone(),
            self.queue_options.metrics_interval(),
        );

        let done = state.done_token();
        let succeeded = tokio::select! {
            biased;
            _ = done.cancelled() => true,
            _ = abort.cancelled() => false,
            _ = sleep(self.queue_options.max_runtime()) => {
                errors.trigger(RunError::Timeout {
                    budget: self.queue_options.max_runtime(),
                });
                false
            }
        };

        // Settlement is final: abandon in-flight capability calls, then wait
        // for both loops so nothing outlives the run.
        abort.cancel();
        state.notify();
        let _ = join_all(handles).await;
        reporter_shutdown.cancel();
        let _ = reporter.await;

        let processed = state.processed();
        let elapsed = state.elapsed();

        if succeeded {
            let report = RunReport {
                fetched: state.total().unwrap_or(processed),
                processed,
                elapsed,
            };
            tracing::info!(%report, "drain run completed");
            Ok(report)
        } else {
            let error = errors
                .take_error()
                .expect("run aborted without a recorded error");
            let failure = RunFailure {
                error,
                fetched: state.fetched_items(),
                processed,
                elapsed,
            };
            tracing::warn!(%failure, "drain run failed");
            Err(failure)
        }
    }
}

impl Default for DrainPipeline {
    fn default() -> Self {
        Self::new(FetchOptions::default(), QueueOptions::default())
    }
}
