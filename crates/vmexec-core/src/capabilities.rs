//! Host capability detection for the acceleration path.

use serde::{Deserialize, Serialize};

/// Environment switch that turns the orchestrator core off for this process.
pub const ACCELERATION_ENV: &str = "VMEXEC_ACCELERATION";

/// Discovered capabilities of the current host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCapabilities {
    /// Number of CPU cores available to the process.
    pub cpu_cores: usize,
    /// Whether the host permits the acceleration path.
    pub acceleration_enabled: bool,
}

impl HostCapabilities {
    /// Discover capabilities of the current system.
    pub fn discover() -> Self {
        let acceleration_enabled = std::env::var(ACCELERATION_ENV)
            .map(|v| !is_disabled_flag(&v))
            .unwrap_or(true);

        Self {
            cpu_cores: num_cpus(),
            acceleration_enabled,
        }
    }

    /// Whether the orchestrator core can be established here.
    ///
    /// Returns the reason when it cannot.
    pub fn check_acceleration(&self) -> Result<(), String> {
        if !self.acceleration_enabled {
            return Err(format!("disabled via {}", ACCELERATION_ENV));
        }
        if self.cpu_cores == 0 {
            return Err("no CPU cores reported".into());
        }
        Ok(())
    }
}

fn is_disabled_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "off" | "false" | "disabled"
    )
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_flags() {
        assert!(is_disabled_flag("0"));
        assert!(is_disabled_flag(" OFF "));
        assert!(is_disabled_flag("Disabled"));
        assert!(!is_disabled_flag("1"));
        assert!(!is_disabled_flag("on"));
    }

    #[test]
    fn test_check_acceleration() {
        let caps = HostCapabilities {
            cpu_cores: 4,
            acceleration_enabled: true,
        };
        assert!(caps.check_acceleration().is_ok());

        let off = HostCapabilities {
            cpu_cores: 4,
            acceleration_enabled: false,
        };
        assert!(off.check_acceleration().unwrap_err().contains(ACCELERATION_ENV));
    }

    #[test]
    fn test_discover_reports_cores() {
        assert!(HostCapabilities::discover().cpu_cores >= 1);
    }
}
