use crate::queue::backlog::Backlog;
use crate::runtime::state::RunState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters used to derive runtime metrics.
#[derive(Default, Debug)]
pub struct Telemetry {
    pages_fetched: AtomicU64,
    items_fetched: AtomicU64,
    items_processed: AtomicU64,
    fetch_errors: AtomicU64,
    process_errors: AtomicU64,
}

impl Telemetry {
    pub fn record_page_fetched(&self, items: u64) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        if items > 0 {
            self.items_fetched.fetch_add(items, Ordering::Relaxed);
        }
    }

    pub fn record_item_processed(&self) {
        self.items_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_process_error(&self) {
        self.process_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched.load(Ordering::Relaxed)
    }

    pub fn items_fetched(&self) -> u64 {
        self.items_fetched.load(Ordering::Relaxed)
    }

    pub fn items_processed(&self) -> u64 {
        self.items_processed.load(Ordering::Relaxed)
    }

    pub fn fetch_errors(&self) -> u64 {
        self.fetch_errors.load(Ordering::Relaxed)
    }

    pub fn process_errors(&self) -> u64 {
        self.process_errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            items_fetched: self.items_fetched.load(Ordering::Relaxed),
            items_processed: self.items_processed.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            process_errors: self.process_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TelemetrySnapshot {
    pub pages_fetched: u64,
    pub items_fetched: u64,
    pub items_processed: u64,
    pub fetch_errors: u64,
    pub process_errors: u64,
}

/// Spawns a background task that periodically logs cursor position, backlog
/// size, processed count, and throughput for the duration of a run.
pub fn spawn_metrics_reporter<T: Send + 'static>(
    telemetry: Arc<Telemetry>,
    state: Arc<RunState>,
    backlog: Arc<Backlog<T>>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(target: "pagedrain::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let processed_delta = current_snapshot
                        .items_processed
                        .saturating_sub(last_snapshot.items_processed);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        processed_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "pagedrain::metrics",
                        throughput = format!("{throughput:.2}"),
                        cursor = state.cursor(),
                        backlog = backlog.len(),
                        processed = current_snapshot.items_processed,
                        pages_fetched = current_snapshot.pages_fetched,
                        fetch_errors = current_snapshot.fetch_errors,
                        process_errors = current_snapshot.process_errors,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
