//! Maps implementation references to gate constructors.

use std::collections::BTreeMap;

use super::{
    BuildGate, ComplianceGate, DryRunGate, EnvironmentGate, Gate, GenerationGate, IntakeGate,
    MetricsGate, PlanningGate, PrdGate, StackGate, SubmissionGate, TaskGraphGate, TestingGate,
};
use crate::config::GateDescriptor;
use crate::error::{Error, Result};

/// Builds a gate from its descriptor.
pub type GateConstructor = fn(&GateDescriptor) -> Result<Box<dyn Gate>>;

fn construct<G: BuildGate + 'static>(descriptor: &GateDescriptor) -> Result<Box<dyn Gate>> {
    Ok(Box::new(G::from_descriptor(descriptor)?))
}

/// Resolves `implementation` references from the run configuration.
///
/// A reference matches a registered key exactly, or by its last dotted
/// segment, so `gates.implementations.IntakeGate` resolves to `IntakeGate`.
#[derive(Clone)]
pub struct GateRegistry {
    constructors: BTreeMap<String, GateConstructor>,
}

impl GateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Creates a registry holding every built-in gate under its key and type name.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, &str, GateConstructor); 12] = [
            ("intake", "IntakeGate", construct::<IntakeGate>),
            ("environment", "EnvironmentGate", construct::<EnvironmentGate>),
            ("planning", "PlanningGate", construct::<PlanningGate>),
            ("task_graph", "TaskGraphGate", construct::<TaskGraphGate>),
            ("prd", "PrdGate", construct::<PrdGate>),
            ("stack", "StackGate", construct::<StackGate>),
            ("dry_run", "DryRunGate", construct::<DryRunGate>),
            ("generation", "GenerationGate", construct::<GenerationGate>),
            ("testing", "TestingGate", construct::<TestingGate>),
            ("metrics", "MetricsGate", construct::<MetricsGate>),
            ("compliance", "ComplianceGate", construct::<ComplianceGate>),
            ("submission", "SubmissionGate", construct::<SubmissionGate>),
        ];
        for (key, type_name, ctor) in builtins {
            registry.register(key, ctor);
            registry.register(type_name, ctor);
        }
        registry
    }

    /// Registers a constructor, replacing any previous one under the same key.
    pub fn register(&mut self, key: impl Into<String>, constructor: GateConstructor) {
        self.constructors.insert(key.into(), constructor);
    }

    /// Looks up the constructor for an implementation reference.
    pub fn resolve(&self, reference: &str) -> Result<GateConstructor> {
        let reference = reference.trim();
        let short = reference.rsplit('.').next().unwrap_or(reference);
        self.constructors
            .get(reference)
            .or_else(|| self.constructors.get(short))
            .copied()
            .ok_or_else(|| Error::Config(format!("unknown gate implementation '{}'", reference)))
    }

    /// Builds the gate a descriptor refers to.
    pub fn build(&self, descriptor: &GateDescriptor) -> Result<Box<dyn Gate>> {
        let constructor = self.resolve(&descriptor.implementation)?;
        constructor(descriptor)
    }
}

impl Default for GateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_resolves_keys_type_names_and_paths() {
        let registry = GateRegistry::builtin();
        for reference in [
            "intake",
            "IntakeGate",
            "gates.implementations.IntakeGate",
            "workflow.gates.task_graph",
            "submission",
            "gates.implementations.SubmissionGate",
        ] {
            assert!(registry.resolve(reference).is_ok(), "{}", reference);
        }
    }

    #[test]
    fn unknown_reference_is_config_error() {
        let err = GateRegistry::builtin().resolve("gates.NopeGate").err().unwrap();
        assert!(err.is_config());
        assert!(err.to_string().contains("NopeGate"));
    }

    #[test]
    fn build_uses_descriptor_name_and_settings() {
        let registry = GateRegistry::default();
        let descriptor = GateDescriptor::new("Docs", "PrdGate")
            .with_settings(json!({"prd_file": "docs/PRD.md"}));
        let gate = registry.build(&descriptor).unwrap();
        assert_eq!(gate.name(), "Docs");

        let bad = GateDescriptor::new("Docs", "prd").with_settings(json!({"prd_file": 3}));
        assert!(registry.build(&bad).err().unwrap().is_config());
    }

    #[test]
    fn custom_registration() {
        let mut registry = GateRegistry::new();
        assert!(registry.resolve("intake").is_err());
        registry.register("custom.Intake", construct::<IntakeGate>);
        assert!(registry.resolve("custom.Intake").is_ok());
    }
}
