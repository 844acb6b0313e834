//! vmexec Control — host-facing facade over the orchestrator core.
//!
//! The orchestrator is an optional acceleration path. `ControlFacade`
//! establishes it at most once per process and, when that fails, answers
//! every call with `Error::Unavailable` so the host can fall back to its
//! own execution path.

pub mod facade;

pub use facade::{load_core, ControlFacade, CoreLoader, FacadeStatus};
