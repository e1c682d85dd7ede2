//! Workflow Gates - sequential, fail-fast validation of project artifacts
//!
//! A run configuration lists gates in order. Each gate validates one category
//! of artifacts, writes a snapshot of what it validated to an evidence store,
//! and either passes or halts the workflow. Every run ends with a gate report
//! and a checksummed evidence manifest.

pub mod config;
pub mod context;
pub mod error;
pub mod evidence;
pub mod gate;
pub mod orchestrator;
pub mod task;

pub use config::{GateDescriptor, RunConfiguration, Validate, ValidationResult};
pub use context::{GateOutcome, GateStatus, RunContext};
pub use error::{Error, Result};
pub use evidence::{verify_manifest, EvidenceRecord, EvidenceStore, EvidenceSummary, MANIFEST_NAME};
pub use gate::{run_gate, BuildGate, Gate, GateError, GateOutput, GateRegistry, GateResult};
pub use orchestrator::{run_workflow, Orchestrator, RunReport};
pub use task::{
    collect_tasks, validate_task_file, validate_tasks, Persona, Task, TaskGraphReport, TaskState,
};
