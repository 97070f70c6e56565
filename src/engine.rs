//! Engine orchestration covering the fetch and process worker loops, run
//! settlement, and outcome types.

pub mod fetch_loop;
pub mod outcome;
pub mod pipeline;
pub mod process_loop;
