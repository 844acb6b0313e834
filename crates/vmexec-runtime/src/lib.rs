//! Runtime orchestrator — drives concurrent execution threads against an
//! injected instruction executor.
//!
//! Owns the thread registry, the start/stop lifecycle and aggregate
//! execution statistics.

pub mod orchestrator;
mod stats;
mod thread;
pub mod types;

pub use orchestrator::Orchestrator;
pub use types::*;
