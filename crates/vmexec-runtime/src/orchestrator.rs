//! Orchestrator — drives execution threads against the instruction executor.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use vmexec_core::{Error, OrchestratorConfig, Result, SharedExecutor};

use crate::stats::Statistics;
use crate::thread::ExecutionThread;
use crate::types::*;

/// Poll interval used while waiting for execution loops to drain.
const QUIESCE_POLL: Duration = Duration::from_millis(1);

/// Owns the thread registry, lifecycle flag and statistics.
///
/// Construct one per process and share it by reference; the host owns it.
pub struct Orchestrator {
    shared: Arc<Shared>,
    runtime: Handle,
}

/// State reachable from every execution loop.
///
/// `threads` and `stats` have independent locks and are never held together.
struct Shared {
    config: OrchestratorConfig,
    running: AtomicBool,
    thread_counter: AtomicU64,
    threads: Mutex<HashMap<ThreadId, Arc<ExecutionThread>>>,
    stats: Mutex<Statistics>,
    executor: RwLock<Option<SharedExecutor>>,
}

/// Outcome of one executor call.
enum Step {
    Continue,
    Halt,
    Fault(String),
}

impl Orchestrator {
    /// Create an orchestrator bound to the current tokio runtime.
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Runtime(format!("no async runtime available: {}", e)))?;
        Self::with_handle(config, handle)
    }

    /// Create an orchestrator that launches execution loops on `runtime`.
    pub fn with_handle(config: OrchestratorConfig, runtime: Handle) -> Result<Self> {
        config.validate()?;

        info!(
            "Orchestrator created: entry_point={:#x}, instruction_width={}",
            config.entry_point, config.instruction_width
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                running: AtomicBool::new(false),
                thread_counter: AtomicU64::new(0),
                threads: Mutex::new(HashMap::new()),
                stats: Mutex::new(Statistics::default()),
                executor: RwLock::new(None),
            }),
            runtime,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    /// Store the executor handle. Returns false if the handle is absent.
    ///
    /// Calling it again only replaces the handle; an active run keeps going
    /// with the new executor from its next instruction.
    pub fn initialize(&self, executor: Option<SharedExecutor>) -> bool {
        let Some(executor) = executor else {
            warn!("Initialize rejected: executor handle is absent");
            return false;
        };

        let replaced = self.shared.executor.write().replace(executor).is_some();
        if replaced {
            debug!("Executor handle replaced");
        } else {
            info!("Orchestrator initialized");
        }
        true
    }

    /// Transition stopped → running and launch the entry thread.
    ///
    /// Returns false if already running. Concurrent callers race on a single
    /// compare-and-swap; at most one wins.
    pub fn start(&self) -> bool {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Start ignored: already running");
            return false;
        }

        self.shared.stats.lock().mark_started();
        let entry = self.shared.config.entry_point;
        let id = self.create_thread(entry);
        info!("Orchestrator started: entry thread {} at {:#x}", id, entry);
        true
    }

    /// Transition running → stopped and invalidate every tracked thread.
    ///
    /// The registry is cleared before returning. In-flight loops are not
    /// awaited; each exits on its next iteration and counts itself terminated.
    pub fn stop(&self) -> bool {
        if self
            .shared
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Stop ignored: not running");
            return false;
        }

        let drained = {
            let mut threads = self.shared.threads.lock();
            for thread in threads.values() {
                thread.terminate();
            }
            let count = threads.len();
            threads.clear();
            count
        };

        self.shared.stats.lock().mark_stopped();
        info!("Orchestrator stopped: {} threads terminated", drained);
        true
    }

    /// Register a thread at `start_pc` and launch its execution loop.
    ///
    /// Never waits for the thread to make progress. Without an executor the
    /// loop exits on its first step.
    pub fn create_thread(&self, start_pc: u64) -> ThreadId {
        let id = ThreadId(self.shared.thread_counter.fetch_add(1, Ordering::Relaxed) + 1);
        let thread = Arc::new(ExecutionThread::new(id, start_pc));

        self.shared.threads.lock().insert(id, thread.clone());
        self.shared.stats.lock().threads_created += 1;

        debug!("Thread {} created at {:#x}", id, start_pc);
        self.runtime.spawn(run_thread(self.shared.clone(), thread));
        id
    }

    /// Snapshot of the counters plus the live registry size.
    pub fn get_stats(&self) -> ExecutionStats {
        let mut stats = self.shared.stats.lock().snapshot();
        stats.active_threads = self.thread_count();
        stats
    }

    pub fn thread_count(&self) -> usize {
        self.shared.threads.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Account for emulated memory reported by the executor or host.
    pub fn record_memory_allocation(&self, bytes: u64) {
        let mut stats = self.shared.stats.lock();
        stats.memory_allocated = stats.memory_allocated.saturating_add(bytes);
    }

    /// Registered threads, ordered by id.
    pub fn threads(&self) -> Vec<ThreadInfo> {
        let mut infos: Vec<ThreadInfo> = self
            .shared
            .threads
            .lock()
            .values()
            .map(|t| t.info())
            .collect();
        infos.sort_by_key(|t| t.id);
        infos
    }

    /// Wait until every launched execution loop has exited.
    ///
    /// Returns false if loops are still alive when `timeout` elapses.
    pub async fn quiesce(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.shared.stats.lock().live_loops() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(QUIESCE_POLL).await;
        }
    }

    /// Stop if running and release the executor handle.
    pub fn teardown(&self) {
        self.stop();
        if self.shared.executor.write().take().is_some() {
            info!("Orchestrator torn down");
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Shared {
    /// Run one instruction. Panics inside the executor count as faults.
    fn step(&self, program_counter: u64) -> Step {
        let executor = self.executor.read().clone();
        let Some(executor) = executor else {
            return Step::Fault("no executor initialized".into());
        };

        match panic::catch_unwind(AssertUnwindSafe(|| {
            executor.execute_instruction(program_counter)
        })) {
            Ok(Ok(true)) => Step::Continue,
            Ok(Ok(false)) => Step::Halt,
            Ok(Err(fault)) => Step::Fault(fault.to_string()),
            Err(_) => Step::Fault(format!("executor panicked at {:#x}", program_counter)),
        }
    }
}

/// Execution loop for one thread. The only path that removes a thread from
/// the registry on its own behalf and counts it terminated.
async fn run_thread(shared: Arc<Shared>, thread: Arc<ExecutionThread>) {
    let id = thread.id();

    while shared.running.load(Ordering::Acquire) && thread.status() == ThreadStatus::Running {
        let pc = thread.program_counter();
        match shared.step(pc) {
            Step::Continue => {
                thread.advance(shared.config.instruction_width);
                shared.stats.lock().instructions_executed += 1;

                if thread.transition(ThreadStatus::Waiting) {
                    tokio::task::yield_now().await;
                    thread.transition(ThreadStatus::Running);
                }
            }
            Step::Halt => {
                debug!("Thread {} halted at {:#x}", id, pc);
                break;
            }
            Step::Fault(reason) => {
                warn!("Thread {} faulted: {}", id, reason);
                break;
            }
        }
    }

    thread.terminate();
    shared.threads.lock().remove(&id);
    shared.stats.lock().threads_terminated += 1;
    debug!("Thread {} exited", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use vmexec_core::{ExecutorFault, InstructionExecutor};

    const WAIT: Duration = Duration::from_secs(5);

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(OrchestratorConfig::default()).unwrap()
    }

    fn always_continue() -> Option<SharedExecutor> {
        let exec: SharedExecutor = Arc::new(|_pc: u64| true);
        Some(exec)
    }

    struct FailingExecutor;

    impl InstructionExecutor for FailingExecutor {
        fn execute_instruction(&self, program_counter: u64) -> std::result::Result<bool, ExecutorFault> {
            Err(ExecutorFault::new(program_counter, "illegal instruction"))
        }
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let result = Orchestrator::new(OrchestratorConfig::default());
        assert!(matches!(result, Err(Error::Runtime(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let config = OrchestratorConfig {
            entry_point: 0,
            instruction_width: 0,
        };
        let result = Orchestrator::with_handle(config, rt.handle().clone());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_initialize_requires_handle() {
        let orch = orchestrator();
        assert!(!orch.initialize(None));
        assert!(orch.initialize(always_continue()));
        assert!(orch.initialize(always_continue()));
        assert!(!orch.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_stop_cycle() {
        let orch = orchestrator();
        orch.initialize(always_continue());

        assert!(!orch.stop());
        assert!(orch.start());
        assert!(orch.is_running());
        assert!(!orch.start());
        assert!(orch.stop());
        assert!(!orch.is_running());
        assert!(!orch.stop());
        assert_eq!(orch.thread_count(), 0);
        assert!(orch.quiesce(WAIT).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_program_counter_advances_by_width() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let exec: SharedExecutor = Arc::new(move |pc: u64| {
            log.lock().push(pc);
            pc < 0x100c
        });

        let orch = orchestrator();
        orch.initialize(Some(exec));
        assert!(orch.start());
        assert!(orch.quiesce(WAIT).await);

        assert_eq!(*seen.lock(), vec![0x1000, 0x1004, 0x1008, 0x100c]);
        let stats = orch.get_stats();
        assert_eq!(stats.instructions_executed, 3);
        assert_eq!(stats.threads_terminated, 1);
        assert_eq!(stats.active_threads, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_executor_fault_halts_only_that_thread() {
        let orch = orchestrator();
        let exec: SharedExecutor = Arc::new(FailingExecutor);
        orch.initialize(Some(exec));
        assert!(orch.start());
        assert!(orch.quiesce(WAIT).await);

        assert!(orch.is_running());
        assert_eq!(orch.thread_count(), 0);
        assert_eq!(orch.get_stats().threads_terminated, 1);
        assert_eq!(orch.get_stats().instructions_executed, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_executor_panic_is_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let exec: SharedExecutor = Arc::new(move |pc: u64| {
            counter.fetch_add(1, Ordering::SeqCst);
            if pc >= 0x1008 {
                panic!("decoder blew up");
            }
            true
        });

        let orch = orchestrator();
        orch.initialize(Some(exec));
        assert!(orch.start());
        assert!(orch.quiesce(WAIT).await);

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(orch.get_stats().instructions_executed, 2);
        assert_eq!(orch.thread_count(), 0);
        assert!(orch.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_executor_exits_immediately() {
        let orch = orchestrator();
        assert!(orch.start());
        assert!(orch.quiesce(WAIT).await);
        let stats = orch.get_stats();
        assert_eq!(stats.threads_created, 1);
        assert_eq!(stats.threads_terminated, 1);
        assert_eq!(stats.instructions_executed, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_thread_created_while_stopped_removes_itself() {
        let orch = orchestrator();
        orch.initialize(always_continue());
        assert!(orch.start());
        assert!(orch.stop());

        // Registered after the registry was cleared; its loop exits unaided.
        let id = orch.create_thread(0x2000);
        assert_eq!(id.get(), 2);
        assert!(orch.quiesce(WAIT).await);

        assert_eq!(orch.thread_count(), 0);
        let stats = orch.get_stats();
        assert_eq!(stats.threads_created, 2);
        assert_eq!(stats.threads_terminated, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_memory_allocation() {
        let orch = orchestrator();
        orch.record_memory_allocation(4096);
        orch.record_memory_allocation(1024);
        assert_eq!(orch.get_stats().memory_allocated, 5120);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_threads_listing() {
        let orch = orchestrator();
        orch.initialize(always_continue());
        assert!(orch.start());
        orch.create_thread(0x2000);

        let threads = orch.threads();
        assert_eq!(threads.len(), 2);
        assert!(threads[0].id < threads[1].id);
        assert!(threads.iter().all(|t| t.status != ThreadStatus::Terminated));
        assert!(threads.iter().all(|t| t.stack_depth == 0));

        assert!(orch.stop());
        assert!(orch.threads().is_empty());
        assert!(orch.quiesce(WAIT).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_teardown_releases_executor() {
        let orch = orchestrator();
        orch.initialize(always_continue());
        assert!(orch.start());
        orch.teardown();
        assert!(!orch.is_running());
        assert!(orch.quiesce(WAIT).await);

        // Without an executor a fresh run halts on its first step.
        assert!(orch.start());
        assert!(orch.quiesce(WAIT).await);
        assert_eq!(orch.thread_count(), 0);
    }
}
