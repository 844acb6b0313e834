//! Control facade — lazily establishes the orchestrator and gates every call
//! on its availability.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use vmexec_core::{Error, HostCapabilities, OrchestratorConfig, Result, SharedExecutor};
use vmexec_runtime::{ExecutionStats, Orchestrator, ThreadId, ThreadInfo};

/// Builds the orchestrator core. Invoked at most once per facade.
pub type CoreLoader = Box<dyn FnOnce() -> Result<Orchestrator> + Send>;

/// Outcome of the single establishment attempt.
enum Availability {
    Ready(Arc<Orchestrator>),
    Unavailable(String),
}

/// Facade availability as reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacadeStatus {
    pub ready: bool,
    pub attempted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Host-facing proxy over an optional orchestrator core.
pub struct ControlFacade {
    state: OnceCell<Availability>,
    loader: Mutex<Option<CoreLoader>>,
}

/// Default loader: check host capabilities, then bind to the current runtime.
pub fn load_core(config: OrchestratorConfig, caps: &HostCapabilities) -> Result<Orchestrator> {
    caps.check_acceleration().map_err(Error::Unavailable)?;
    Orchestrator::new(config)
}

impl ControlFacade {
    /// Facade using the default loader with discovered host capabilities.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_loader(move || load_core(config, &HostCapabilities::discover()))
    }

    /// Facade with a custom core loader.
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: FnOnce() -> Result<Orchestrator> + Send + 'static,
    {
        Self {
            state: OnceCell::new(),
            loader: Mutex::new(Some(Box::new(loader))),
        }
    }

    /// Establish the core if not yet attempted. Returns whether it is ready.
    ///
    /// Concurrent callers share one in-flight attempt. A failed attempt is
    /// final for the lifetime of this facade and is never surfaced as an error.
    pub async fn ensure_initialized(&self) -> bool {
        let availability = self.state.get_or_init(|| async { self.establish() }).await;
        matches!(availability, Availability::Ready(_))
    }

    fn establish(&self) -> Availability {
        let Some(loader) = self.loader.lock().take() else {
            return Availability::Unavailable("core loader already consumed".into());
        };

        match loader() {
            Ok(orchestrator) => {
                info!("Orchestrator core ready");
                Availability::Ready(Arc::new(orchestrator))
            }
            Err(e) => {
                warn!("Orchestrator core unavailable: {}. Falling back to host execution.", e);
                let reason = match e {
                    Error::Unavailable(reason) => reason,
                    other => other.to_string(),
                };
                Availability::Unavailable(reason)
            }
        }
    }

    fn core(&self) -> Result<&Arc<Orchestrator>> {
        match self.state.get() {
            Some(Availability::Ready(orchestrator)) => Ok(orchestrator),
            Some(Availability::Unavailable(reason)) => Err(Error::Unavailable(reason.clone())),
            None => Err(Error::Unavailable("orchestrator core not initialized".into())),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.core().is_ok()
    }

    pub fn status(&self) -> FacadeStatus {
        match self.state.get() {
            Some(Availability::Ready(_)) => FacadeStatus {
                ready: true,
                attempted: true,
                reason: None,
            },
            Some(Availability::Unavailable(reason)) => FacadeStatus {
                ready: false,
                attempted: true,
                reason: Some(reason.clone()),
            },
            None => FacadeStatus {
                ready: false,
                attempted: false,
                reason: None,
            },
        }
    }

    pub fn initialize(&self, executor: Option<SharedExecutor>) -> Result<bool> {
        Ok(self.core()?.initialize(executor))
    }

    pub fn start(&self) -> Result<bool> {
        Ok(self.core()?.start())
    }

    pub fn stop(&self) -> Result<bool> {
        Ok(self.core()?.stop())
    }

    pub fn create_thread(&self, start_pc: u64) -> Result<ThreadId> {
        Ok(self.core()?.create_thread(start_pc))
    }

    /// `create_thread` in host numeric form: the id, or `-1` when unavailable.
    pub fn create_thread_host(&self, start_pc: u64) -> i64 {
        ThreadId::to_host_value(self.create_thread(start_pc).ok())
    }

    pub fn get_stats(&self) -> Result<ExecutionStats> {
        Ok(self.core()?.get_stats())
    }

    pub fn thread_count(&self) -> Result<usize> {
        Ok(self.core()?.thread_count())
    }

    pub fn is_running(&self) -> Result<bool> {
        Ok(self.core()?.is_running())
    }

    pub fn record_memory_allocation(&self, bytes: u64) -> Result<()> {
        self.core()?.record_memory_allocation(bytes);
        Ok(())
    }

    pub fn threads(&self) -> Result<Vec<ThreadInfo>> {
        Ok(self.core()?.threads())
    }

    pub async fn quiesce(&self, timeout: Duration) -> Result<bool> {
        let core = self.core()?.clone();
        Ok(core.quiesce(timeout).await)
    }
}
