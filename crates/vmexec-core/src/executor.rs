//! Instruction executor capability.
//!
//! The orchestrator has no knowledge of the instruction format. A host
//! supplies one `InstructionExecutor`, which performs a single unit of
//! emulated work at a program counter and reports whether the calling
//! thread may continue.

use std::sync::Arc;

use thiserror::Error;

/// A failed instruction step. Halts the calling thread only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("executor fault at {program_counter:#x}: {message}")]
pub struct ExecutorFault {
    pub program_counter: u64,
    pub message: String,
}

impl ExecutorFault {
    pub fn new(program_counter: u64, message: impl Into<String>) -> Self {
        Self {
            program_counter,
            message: message.into(),
        }
    }
}

/// Host-provided capability that executes one instruction.
pub trait InstructionExecutor: Send + Sync {
    /// Execute the instruction at `program_counter`.
    ///
    /// `Ok(true)` continues the thread, `Ok(false)` halts it. An `Err` is
    /// treated exactly like a halt.
    fn execute_instruction(&self, program_counter: u64) -> Result<bool, ExecutorFault>;
}

impl<F> InstructionExecutor for F
where
    F: Fn(u64) -> bool + Send + Sync,
{
    fn execute_instruction(&self, program_counter: u64) -> Result<bool, ExecutorFault> {
        Ok(self(program_counter))
    }
}

/// Executor handle as stored by the orchestrator.
pub type SharedExecutor = Arc<dyn InstructionExecutor>;
