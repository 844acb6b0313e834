//! Execution thread record held in the orchestrator's registry.

use parking_lot::Mutex;

use crate::types::{ThreadId, ThreadInfo, ThreadStatus};

/// One execution thread. Its state is guarded by a per-thread lock.
pub(crate) struct ExecutionThread {
    id: ThreadId,
    state: Mutex<ThreadState>,
}

struct ThreadState {
    program_counter: u64,
    status: ThreadStatus,
    ip_stack: Vec<u64>,
}

impl ExecutionThread {
    pub fn new(id: ThreadId, program_counter: u64) -> Self {
        Self {
            id,
            state: Mutex::new(ThreadState {
                program_counter,
                status: ThreadStatus::Running,
                ip_stack: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn program_counter(&self) -> u64 {
        self.state.lock().program_counter
    }

    pub fn status(&self) -> ThreadStatus {
        self.state.lock().status
    }

    /// Move the program counter past the instruction just executed.
    pub fn advance(&self, width: u64) {
        let mut state = self.state.lock();
        state.program_counter = state.program_counter.wrapping_add(width);
    }

    /// Apply a state-machine transition. Returns false if it is not legal.
    pub fn transition(&self, next: ThreadStatus) -> bool {
        let mut state = self.state.lock();
        if !state.status.can_transition_to(next) {
            return false;
        }
        state.status = next;
        true
    }

    /// Force the terminal state. Idempotent.
    pub fn terminate(&self) {
        self.state.lock().status = ThreadStatus::Terminated;
    }

    pub fn info(&self) -> ThreadInfo {
        let state = self.state.lock();
        ThreadInfo {
            id: self.id,
            program_counter: state.program_counter,
            status: state.status,
            stack_depth: state.ip_stack.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_thread() {
        let thread = ExecutionThread::new(ThreadId(1), 0x1000);
        let info = thread.info();
        assert_eq!(info.id, ThreadId(1));
        assert_eq!(info.program_counter, 0x1000);
        assert_eq!(info.status, ThreadStatus::Running);
        assert_eq!(info.stack_depth, 0);
    }

    #[test]
    fn test_advance() {
        let thread = ExecutionThread::new(ThreadId(1), 0x1000);
        thread.advance(4);
        thread.advance(4);
        assert_eq!(thread.program_counter(), 0x1008);
    }

    #[test]
    fn test_terminated_is_final() {
        let thread = ExecutionThread::new(ThreadId(2), 0);
        assert!(thread.transition(ThreadStatus::Waiting));
        thread.terminate();
        assert!(!thread.transition(ThreadStatus::Running));
        assert_eq!(thread.status(), ThreadStatus::Terminated);
    }
}
