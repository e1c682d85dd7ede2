//! Error types for the gated workflow engine.

use thiserror::Error;

/// Top-level error type for workflow runs.
#[derive(Error, Debug)]
pub enum Error {
    /// Run configuration is malformed or references something unresolvable.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error while reading artifacts or writing evidence.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Evidence could not be written or verified.
    #[error("evidence error: {0}")]
    Evidence(String),

    /// A gate recorded a domain failure and the workflow halted.
    #[error("workflow halted at gate '{gate}': {reason}")]
    GateFailed { gate: String, reason: String },

    /// A gate hit an unexpected error; no outcome was recorded for it.
    #[error("gate {gate} encountered an unexpected error: {reason}")]
    GateExecution { gate: String, reason: String },
}

impl Error {
    /// Returns true for configuration problems detected before or while loading gates.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Returns true when a gate halted the workflow with a domain failure.
    pub fn is_gate_failure(&self) -> bool {
        matches!(self, Error::GateFailed { .. })
    }
}

/// Result type alias for workflow operations.
pub type Result<T> = std::result::Result<T, Error>;
