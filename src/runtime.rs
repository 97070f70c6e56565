//! Runtime glue that wires options, capability traits, shared run state, the
//! error slot, and telemetry.

pub mod config;
pub mod fatal;
pub mod source;
pub mod state;
pub mod telemetry;
