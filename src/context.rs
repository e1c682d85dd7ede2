//! Run context shared by every gate during one orchestrator invocation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{GateDescriptor, RunConfiguration};
use crate::error::Result;

/// Status of an executed gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    /// Gate validated its artifacts.
    Passed,
    /// Gate recorded a domain failure.
    Failed,
}

/// Recorded result of running a gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateOutcome {
    /// Gate name.
    pub name: String,
    /// Final status.
    pub status: GateStatus,
    /// Human-readable details or failure reason.
    pub details: String,
    /// Evidence paths produced by the gate, relative to the evidence root.
    pub evidence: Vec<String>,
}

impl GateOutcome {
    /// Creates a passed outcome.
    pub fn passed(
        name: impl Into<String>,
        details: impl Into<String>,
        evidence: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: GateStatus::Passed,
            details: details.into(),
            evidence,
        }
    }

    /// Creates a failed outcome.
    pub fn failed(
        name: impl Into<String>,
        reason: impl Into<String>,
        evidence: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: GateStatus::Failed,
            details: reason.into(),
            evidence,
        }
    }

    /// Returns true if the gate passed.
    pub fn is_passed(&self) -> bool {
        self.status == GateStatus::Passed
    }
}

/// Mutable state threaded through every gate.
///
/// Outcomes are append-only: gates may add to the list but never remove.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Identifier of this run.
    pub run_id: String,
    /// Absolute project root.
    pub project_root: PathBuf,
    /// Configuration the run was started with.
    pub config: RunConfiguration,
    /// Absolute evidence root.
    pub evidence_root: PathBuf,
    /// Project metadata, populated by the intake gate.
    pub metadata: Map<String, Value>,
    /// Project brief, populated by the intake gate.
    pub brief: Option<String>,
    outcomes: Vec<GateOutcome>,
}

impl RunContext {
    /// Creates a context for a new run.
    pub fn new(
        project_root: &Path,
        config: RunConfiguration,
        evidence_root: &Path,
    ) -> Result<Self> {
        Ok(Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            project_root: absolutize(project_root)?,
            config,
            evidence_root: absolutize(evidence_root)?,
            metadata: Map::new(),
            brief: None,
            outcomes: Vec::new(),
        })
    }

    /// Appends a gate outcome.
    pub fn add_outcome(&mut self, outcome: GateOutcome) {
        tracing::info!(gate = %outcome.name, status = ?outcome.status, "gate result");
        self.outcomes.push(outcome);
    }

    /// Returns the outcomes recorded so far, in execution order.
    pub fn outcomes(&self) -> &[GateOutcome] {
        &self.outcomes
    }

    /// Looks up the configuration of a gate by name.
    pub fn gate_config(&self, gate_name: &str) -> Option<&GateDescriptor> {
        self.config.gate(gate_name)
    }

    /// Resolves a path relative to the project root.
    pub fn project_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.project_root.join(relative)
    }
}

/// Makes a path absolute, resolving symlinks when the path exists.
fn absolutize(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(absolute.canonicalize().unwrap_or(absolute))
}
