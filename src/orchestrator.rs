//! Sequential, fail-fast gate execution.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{RunConfiguration, Validate};
use crate::context::{GateOutcome, RunContext};
use crate::error::Result;
use crate::evidence::{EvidenceStore, MANIFEST_NAME};
use crate::gate::{run_gate, Gate, GateRegistry};

/// Evidence path of the per-run gate report.
pub const GATES_REPORT: &str = "gates/gates_report.json";

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub outcomes: Vec<GateOutcome>,
    pub manifest_path: PathBuf,
}

#[derive(Serialize)]
struct GatesReport<'a> {
    run_id: &'a str,
    results: &'a [GateOutcome],
}

/// Runs the enabled gates of a configuration in declaration order.
///
/// Every gate is built before the first one runs, so an unknown
/// implementation or invalid settings stop the run before any evidence is
/// written. After the gate loop the report and manifest are written whether
/// or not a gate failed.
pub struct Orchestrator {
    config: RunConfiguration,
    project_root: PathBuf,
    registry: GateRegistry,
}

impl Orchestrator {
    /// Creates an orchestrator using the built-in gate registry.
    pub fn new(config: RunConfiguration, project_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            project_root: project_root.into(),
            registry: GateRegistry::builtin(),
        }
    }

    /// Replaces the gate registry.
    pub fn with_registry(mut self, registry: GateRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Builds every enabled gate.
    fn build_gates(&self) -> Result<Vec<Box<dyn Gate>>> {
        let mut gates = Vec::new();
        for descriptor in &self.config.gates {
            if !descriptor.enabled {
                tracing::warn!(gate = %descriptor.name, "gate disabled; skipping");
                continue;
            }
            gates.push(self.registry.build(descriptor)?);
        }
        Ok(gates)
    }

    /// Executes the workflow.
    pub fn run(&self) -> Result<RunReport> {
        for warning in self.config.validate().into_result()? {
            tracing::warn!(warning = %warning, "configuration warning");
        }
        let gates = self.build_gates()?;

        let evidence_root = self.project_root.join(&self.config.evidence_root);
        let mut store = EvidenceStore::open(&evidence_root)?;
        let mut ctx = RunContext::new(&self.project_root, self.config.clone(), store.root())?;

        tracing::info!(
            run_id = %ctx.run_id,
            gates = gates.len(),
            evidence_root = %store.root().display(),
            "starting workflow"
        );

        let gate_result = gates
            .iter()
            .try_for_each(|gate| run_gate(gate.as_ref(), &mut ctx, &mut store).map(|_| ()));

        let finalized = Self::finalize(&ctx, &mut store);

        gate_result?;
        let manifest_path = finalized?;

        tracing::info!(run_id = %ctx.run_id, gates = ctx.outcomes().len(), "workflow completed");
        Ok(RunReport {
            run_id: ctx.run_id.clone(),
            outcomes: ctx.outcomes().to_vec(),
            manifest_path,
        })
    }

    /// Writes the gate report and the evidence manifest.
    fn finalize(ctx: &RunContext, store: &mut EvidenceStore) -> Result<PathBuf> {
        let report = GatesReport {
            run_id: &ctx.run_id,
            results: ctx.outcomes(),
        };
        let written = store
            .write_json(GATES_REPORT, &report, "gates", "Gate execution report")
            .and_then(|_| store.finalize(MANIFEST_NAME));
        if let Err(e) = &written {
            tracing::error!(error = %e, "failed to persist run evidence");
        }
        written
    }
}

/// Loads a configuration file and runs it against a project root.
pub fn run_workflow(config_path: &Path, project_root: &Path) -> Result<RunReport> {
    let config = RunConfiguration::load(config_path)?;
    Orchestrator::new(config, project_root).run()
}
