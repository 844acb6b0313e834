//! vmexec Core — error type, configuration, host capabilities, executor capability.

pub mod capabilities;
pub mod config;
pub mod error;
pub mod executor;

pub use capabilities::HostCapabilities;
pub use config::OrchestratorConfig;
pub use error::{Error, Result};
pub use executor::{ExecutorFault, InstructionExecutor, SharedExecutor};
