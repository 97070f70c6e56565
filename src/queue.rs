//! Backlog primitives: the FIFO holding fetched-but-unprocessed items and the
//! advisory throttle that bounds its growth.

pub mod backlog;
pub mod throttle;
