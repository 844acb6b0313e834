//! Runtime types.

use serde::Serialize;

/// Identifier of an execution thread. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ThreadId(pub(crate) u64);

impl ThreadId {
    /// Value reported to hosts when no thread could be created.
    pub const HOST_INVALID: i64 = -1;

    pub fn get(self) -> u64 {
        self.0
    }

    /// Numeric form used at the host boundary, `-1` for "no thread".
    pub fn to_host_value(id: Option<Self>) -> i64 {
        id.and_then(|id| i64::try_from(id.0).ok())
            .unwrap_or(Self::HOST_INVALID)
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-thread state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    /// Executing instructions.
    Running,
    /// Yielded to the scheduler between two instructions.
    Waiting,
    /// Finished. No transition leaves this state.
    Terminated,
}

impl ThreadStatus {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: ThreadStatus) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::Waiting)
                | (Self::Waiting, Self::Running)
                | (Self::Running, Self::Terminated)
                | (Self::Waiting, Self::Terminated)
        )
    }
}

impl std::fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Waiting => write!(f, "waiting"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Point-in-time view of one registered thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadInfo {
    pub id: ThreadId,
    #[serde(rename = "programCounter")]
    pub program_counter: u64,
    pub status: ThreadStatus,
    #[serde(rename = "stackDepth")]
    pub stack_depth: usize,
}

/// Statistics snapshot returned by `get_stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    #[serde(rename = "instructionsExecuted")]
    pub instructions_executed: u64,
    #[serde(rename = "memoryAllocated")]
    pub memory_allocated: u64,
    #[serde(rename = "threadsCreated")]
    pub threads_created: u64,
    #[serde(rename = "threadsTerminated")]
    pub threads_terminated: u64,
    #[serde(rename = "executionTimeMs")]
    pub execution_time_ms: u64,
    #[serde(rename = "activeThreads")]
    pub active_threads: usize,
    /// RFC 3339 wall-clock time of the last successful start.
    #[serde(rename = "startedAt", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}
