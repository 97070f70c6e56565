//! Bounded pull pipeline: repeatedly fetch pages of items from a paginated
//! source and drain them through an asynchronous sink, with caps on in-flight
//! fetches, in-flight processing, and in-memory backlog growth.

pub mod engine;
pub mod queue;
pub mod runtime;

pub use engine::outcome::{ProgressUpdate, RunFailure, RunReport};
pub use engine::pipeline::DrainPipeline;
pub use queue::backlog::Backlog;
pub use queue::throttle::{fetch_admitted, projected_backlog};
pub use runtime::config::{FetchOptions, FetchOptionsBuilder, QueueOptions, QueueOptionsBuilder};
pub use runtime::fatal::{ErrorSlot, RunError};
pub use runtime::source::{
    CapabilityError, CapabilityStage, FetchFuture, FetchedPage, ItemSink, PageSource,
    ProcessFuture,
};
pub use runtime::state::RunState;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
