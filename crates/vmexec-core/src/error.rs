//! Error types for vmexec.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The orchestrator core could not be established for this process.
    #[error("Feature unavailable: {0}")]
    Unavailable(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this is the "feature unavailable" outcome rather than a real fault.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
