//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Entry address handed to the initial thread on `start`.
pub const DEFAULT_ENTRY_POINT: u64 = 0x1000;

/// Bytes the program counter advances per executed instruction.
pub const DEFAULT_INSTRUCTION_WIDTH: u64 = 4;

/// Tunables for the orchestrator core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Program counter of the thread created by a successful `start`.
    #[serde(rename = "entryPoint")]
    pub entry_point: u64,
    /// Program counter increment applied after each continued instruction.
    #[serde(rename = "instructionWidth")]
    pub instruction_width: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            entry_point: DEFAULT_ENTRY_POINT,
            instruction_width: DEFAULT_INSTRUCTION_WIDTH,
        }
    }
}

impl OrchestratorConfig {
    /// Create configuration from environment and defaults.
    ///
    /// Reads `VMEXEC_ENTRY_POINT` (decimal or `0x` hex) and
    /// `VMEXEC_INSTRUCTION_WIDTH`. Unparseable values fall back to defaults.
    pub fn from_env() -> Result<Self> {
        let entry_point = std::env::var("VMEXEC_ENTRY_POINT")
            .ok()
            .and_then(|v| parse_address(&v))
            .unwrap_or(DEFAULT_ENTRY_POINT);

        let instruction_width = std::env::var("VMEXEC_INSTRUCTION_WIDTH")
            .ok()
            .and_then(|v| parse_address(&v))
            .unwrap_or(DEFAULT_INSTRUCTION_WIDTH);

        let config = Self {
            entry_point,
            instruction_width,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the execution loop cannot apply.
    pub fn validate(&self) -> Result<()> {
        if self.instruction_width == 0 {
            return Err(Error::Config(
                "instruction width must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal address.
pub fn parse_address(s: &str) -> Option<u64> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}
