//! Aggregate execution counters, guarded by the orchestrator's stats lock.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::types::ExecutionStats;

#[derive(Debug, Default)]
pub(crate) struct Statistics {
    pub instructions_executed: u64,
    pub memory_allocated: u64,
    pub threads_created: u64,
    pub threads_terminated: u64,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    started_wall: Option<DateTime<Utc>>,
}

impl Statistics {
    /// Reset the execution-time baseline.
    pub fn mark_started(&mut self) {
        self.started_at = Some(Instant::now());
        self.stopped_at = None;
        self.started_wall = Some(Utc::now());
    }

    /// Freeze execution time at the current instant.
    pub fn mark_stopped(&mut self) {
        if self.started_at.is_some() {
            self.stopped_at = Some(Instant::now());
        }
    }

    /// Time since the last start, frozen once stopped.
    pub fn execution_time(&self) -> Duration {
        self.started_at
            .map(|start| {
                self.stopped_at
                    .map(|end| end.duration_since(start))
                    .unwrap_or_else(|| start.elapsed())
            })
            .unwrap_or_default()
    }

    /// Execution loops that have been launched and not yet exited.
    pub fn live_loops(&self) -> u64 {
        self.threads_created - self.threads_terminated
    }

    /// Copy the counters. `active_threads` is filled in by the caller.
    pub fn snapshot(&self) -> ExecutionStats {
        ExecutionStats {
            instructions_executed: self.instructions_executed,
            memory_allocated: self.memory_allocated,
            threads_created: self.threads_created,
            threads_terminated: self.threads_terminated,
            execution_time_ms: u64::try_from(self.execution_time().as_millis())
                .unwrap_or(u64::MAX),
            active_threads: 0,
            started_at: self.started_wall.map(|t| t.to_rfc3339()),
        }
    }
}
