//! Gate contract and the built-in gate catalog.
//!
//! A gate validates one category of project artifacts and writes a snapshot
//! of what it validated to the evidence store. Gates signal expected
//! problems with [`GateError::Failed`]; anything else is unexpected.
//! [`run_gate`] classifies the result and records the outcome.

mod environment;
mod generation;
mod intake;
mod planning;
mod prd;
mod quality;
mod registry;
mod stack;
mod submission;

pub use environment::{
    compare_versions, extract_version, parse_version, EnvironmentGate, EnvironmentSettings,
    ProbeOutput, SystemProbe, ToolProbe, ToolReport, ToolRequirement, ToolStatus, PROBE_TIMEOUT,
};
pub use generation::{DryRunGate, DryRunSettings, GenerationGate, GenerationSettings};
pub use intake::{IntakeGate, IntakeSettings};
pub use planning::{PlanningGate, PlanningSettings, TaskGraphGate, TaskGraphSettings};
pub use prd::{PrdGate, PrdSettings};
pub use quality::{
    ComplianceGate, ComplianceRequirement, ComplianceSettings, MetricsGate, MetricsSettings,
    TestingGate, TestingSettings,
};
pub use registry::{GateConstructor, GateRegistry};
pub use stack::{StackGate, StackSettings};
pub use submission::{SubmissionGate, SubmissionSettings};

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{GateDescriptor, ValidationResult};
use crate::context::{GateOutcome, RunContext};
use crate::error::{Error, Result};
use crate::evidence::EvidenceStore;

/// Result returned by a gate that completed normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateResult {
    /// Whether the gate passed. A false value is recorded as a domain failure.
    pub passed: bool,
    /// Human-readable summary.
    pub details: String,
    /// Evidence paths produced, relative to the evidence root.
    pub evidence: Vec<String>,
}

impl GateResult {
    /// Creates a passing result.
    pub fn passed(details: impl Into<String>, evidence: Vec<String>) -> Self {
        Self {
            passed: true,
            details: details.into(),
            evidence,
        }
    }
}

/// Error raised from inside a gate.
#[derive(Error, Debug)]
pub enum GateError {
    /// Expected, data-describable failure. Recorded as a failed outcome.
    #[error("{0}")]
    Failed(String),

    /// Anything else. Not recorded; aborts the run.
    #[error(transparent)]
    Unexpected(#[from] Error),
}

impl From<std::io::Error> for GateError {
    fn from(e: std::io::Error) -> Self {
        GateError::Unexpected(Error::Io(e))
    }
}

impl From<serde_json::Error> for GateError {
    fn from(e: serde_json::Error) -> Self {
        GateError::Unexpected(Error::Json(e))
    }
}

/// Result type alias for gate execution.
pub type GateOutput = std::result::Result<GateResult, GateError>;

/// A single validation-and-evidence step.
pub trait Gate: Send + Sync {
    /// Returns the configured gate name.
    fn name(&self) -> &str;

    /// Validates artifacts and writes evidence.
    fn execute(&self, ctx: &mut RunContext, evidence: &mut EvidenceStore) -> GateOutput;
}

/// Gates that can be built from a configured descriptor.
pub trait BuildGate: Gate + Sized {
    /// Builds the gate, decoding its settings.
    fn from_descriptor(descriptor: &GateDescriptor) -> Result<Self>;
}

/// Runs a gate and records its outcome in the context.
///
/// Domain failures are recorded as a failed outcome and returned as
/// [`Error::GateFailed`]. Unexpected errors are not recorded and come back as
/// [`Error::GateExecution`].
pub fn run_gate(
    gate: &dyn Gate,
    ctx: &mut RunContext,
    evidence: &mut EvidenceStore,
) -> Result<GateOutcome> {
    let name = gate.name().to_string();
    tracing::info!(gate = %name, "running gate");

    match gate.execute(ctx, evidence) {
        Ok(result) if result.passed => {
            let outcome = GateOutcome::passed(&name, result.details, result.evidence);
            ctx.add_outcome(outcome.clone());
            Ok(outcome)
        }
        Ok(result) => {
            tracing::error!(gate = %name, reason = %result.details, "gate failed");
            ctx.add_outcome(GateOutcome::failed(&name, &result.details, result.evidence));
            Err(Error::GateFailed {
                gate: name,
                reason: result.details,
            })
        }
        Err(GateError::Failed(reason)) => {
            tracing::error!(gate = %name, reason = %reason, "gate failed");
            ctx.add_outcome(GateOutcome::failed(&name, &reason, Vec::new()));
            Err(Error::GateFailed { gate: name, reason })
        }
        Err(GateError::Unexpected(e)) => {
            tracing::error!(gate = %name, error = %e, "unexpected error executing gate");
            Err(Error::GateExecution {
                gate: name,
                reason: e.to_string(),
            })
        }
    }
}

/// Decodes a descriptor's settings into a gate's typed settings.
pub(crate) fn parse_settings<T: DeserializeOwned>(descriptor: &GateDescriptor) -> Result<T> {
    serde_json::from_value(Value::Object(descriptor.settings.clone())).map_err(|e| {
        Error::Config(format!(
            "gate '{}' has invalid settings: {}",
            descriptor.name, e
        ))
    })
}

/// Loads and parses a JSON artifact.
pub(crate) fn load_json(path: &Path) -> std::result::Result<Value, GateError> {
    if !path.exists() {
        return Err(GateError::Failed(format!(
            "required file missing: {}",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path).map_err(|e| {
        GateError::Failed(format!("unable to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        GateError::Failed(format!(
            "failed to parse JSON from {}: {}",
            path.display(),
            e
        ))
    })
}

/// Loads a JSON artifact that must be an object.
pub(crate) fn load_json_object(
    path: &Path,
) -> std::result::Result<Map<String, Value>, GateError> {
    match load_json(path)? {
        Value::Object(map) => Ok(map),
        _ => Err(GateError::Failed(format!(
            "expected a JSON object in {}",
            path.display()
        ))),
    }
}

/// Reads a text artifact, failing with `"<what> missing: <path>"` if absent.
pub(crate) fn read_text(path: &Path, what: &str) -> std::result::Result<String, GateError> {
    if !path.is_file() {
        return Err(GateError::Failed(format!(
            "{} missing: {}",
            what,
            path.display()
        )));
    }
    std::fs::read_to_string(path)
        .map_err(|e| GateError::Failed(format!("unable to read {}: {}", path.display(), e)))
}

/// Reads an optional numeric field that may be a JSON number or numeric string.
pub(crate) fn number_field(
    object: &Map<String, Value>,
    field: &str,
) -> std::result::Result<Option<f64>, GateError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|_| {
            GateError::Failed(format!("field '{}' is not numeric: '{}'", field, s))
        }),
        Some(other) => Err(GateError::Failed(format!(
            "field '{}' is not numeric: {}",
            field, other
        ))),
    }
}

/// Renders a JSON value for a message without quoting strings.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fails with every collected violation joined into one message.
pub(crate) fn ensure_valid(violations: ValidationResult) -> std::result::Result<(), GateError> {
    if violations.is_valid() {
        Ok(())
    } else {
        Err(GateError::Failed(violations.errors.join("; ")))
    }
}
