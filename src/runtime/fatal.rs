use crate::runtime::source::CapabilityError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Terminal failure of a run.
#[derive(Debug)]
pub enum RunError {
    /// The source reported a total of zero before any total was known.
    SourceEmpty,
    /// A fetch or process capability failed; the payload is the caller's own
    /// error, untouched.
    Capability(CapabilityError),
    /// The run exceeded its wall-clock budget.
    Timeout { budget: Duration },
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceEmpty => write!(f, "source reported empty with no prior known total"),
            Self::Capability(err) => fmt::Display::fmt(err, f),
            Self::Timeout { budget } => {
                write!(f, "run exceeded its {:.3}s runtime budget", budget.as_secs_f64())
            }
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Capability(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CapabilityError> for RunError {
    fn from(err: CapabilityError) -> Self {
        Self::Capability(err)
    }
}

/// Single shared error slot for a run: the first failure wins and is
/// permanent, and recording it cancels the run's abort token so both
/// scheduler loops stop admitting work. Later failures are discarded.
#[derive(Clone)]
pub struct ErrorSlot {
    inner: Arc<SlotInner>,
}

struct SlotInner {
    triggered: AtomicBool,
    abort: CancellationToken,
    captured: Mutex<Option<RunError>>,
}

impl ErrorSlot {
    pub fn new(abort: CancellationToken) -> Self {
        Self {
            inner: Arc::new(SlotInner {
                triggered: AtomicBool::new(false),
                abort,
                captured: Mutex::new(None),
            }),
        }
    }

    /// Records the run's terminal error and initiates shutdown. Only the
    /// first call has any effect.
    pub fn trigger(&self, error: RunError) {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            tracing::debug!(error = %error, "error slot already set; discarding");
            return;
        }

        tracing::error!(error = %error, "fatal run error; aborting pipeline");

        {
            let mut slot = self.inner.captured.lock().unwrap();
            *slot = Some(error);
        }
        self.inner.abort.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Removes the recorded error. Intended for the settlement path, which
    /// runs exactly once.
    pub fn take_error(&self) -> Option<RunError> {
        self.inner.captured.lock().unwrap().take()
    }
}
