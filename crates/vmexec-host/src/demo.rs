//! Demo executor used by the host shell.

use vmexec_core::{ExecutorFault, InstructionExecutor};

/// Size of the program image each demo thread walks through.
pub const PAGE_SIZE: u64 = 0x1000;

/// Runs straight-line code to the end of the page it started on, then halts.
pub struct PageExecutor {
    page_size: u64,
    instruction_width: u64,
}

impl PageExecutor {
    pub fn new(page_size: u64, instruction_width: u64) -> Self {
        Self {
            page_size,
            instruction_width,
        }
    }
}

impl InstructionExecutor for PageExecutor {
    fn execute_instruction(&self, program_counter: u64) -> Result<bool, ExecutorFault> {
        if program_counter % self.instruction_width != 0 {
            return Err(ExecutorFault::new(program_counter, "misaligned program counter"));
        }
        let offset = program_counter % self.page_size;
        Ok(offset
            .checked_add(self.instruction_width)
            .is_some_and(|next| next < self.page_size))
    }
}
