//! Technology stack selection.

use serde::Deserialize;
use serde_json::Value;

use super::{
    display_value, ensure_valid, load_json_object, parse_settings, BuildGate, Gate, GateOutput,
    GateResult,
};
use crate::config::{GateDescriptor, ValidationResult};
use crate::context::RunContext;
use crate::error::Result;
use crate::evidence::EvidenceStore;

fn default_stack_file() -> String {
    "stack_report.json".to_string()
}

fn default_required_keys() -> Vec<String> {
    ["frontend", "backend", "database"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Settings for [`StackGate`].
#[derive(Debug, Clone, Deserialize)]
pub struct StackSettings {
    #[serde(default = "default_stack_file")]
    pub stack_file: String,
    #[serde(default = "default_required_keys")]
    pub required_keys: Vec<String>,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            stack_file: default_stack_file(),
            required_keys: default_required_keys(),
        }
    }
}

/// Checks the stack report for required layers and unresolved discrepancies.
pub struct StackGate {
    name: String,
    settings: StackSettings,
}

impl StackGate {
    pub fn new(name: impl Into<String>, settings: StackSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

impl BuildGate for StackGate {
    fn from_descriptor(descriptor: &GateDescriptor) -> Result<Self> {
        Ok(Self::new(&descriptor.name, parse_settings(descriptor)?))
    }
}

impl Gate for StackGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut RunContext, evidence: &mut EvidenceStore) -> GateOutput {
        let report = load_json_object(&ctx.project_path(&self.settings.stack_file))?;
        let mut violations = ValidationResult::default();

        let missing: Vec<&str> = self
            .settings
            .required_keys
            .iter()
            .map(String::as_str)
            .filter(|key| !report.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            violations.add_error(format!("Stack report missing keys: {}", missing.join(", ")));
        }

        let discrepancies: Vec<String> = match report.get("discrepancies") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().map(display_value).collect(),
            Some(other) => vec![display_value(other)],
        };
        if !discrepancies.is_empty() {
            violations.add_error(format!(
                "Stack discrepancies unresolved: {}",
                discrepancies.join(", ")
            ));
        }
        ensure_valid(violations)?;

        let path = evidence.write_json(
            "stack/stack_report.json",
            &report,
            "stack",
            "Stack selection validation",
        )?;
        Ok(GateResult::passed("Stack selection validated", vec![path]))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{descriptor, Fixture};
    use super::*;
    use serde_json::json;

    fn gate(settings: Value) -> StackGate {
        StackGate::from_descriptor(&descriptor("stack", settings)).unwrap()
    }

    #[test]
    fn stack_passes_with_all_layers() {
        let mut fx = Fixture::new();
        fx.write_json(
            "stack_report.json",
            json!({
                "frontend": "react",
                "backend": "axum",
                "database": "postgres",
                "discrepancies": [],
            }),
        );

        let result = gate(json!({})).execute(&mut fx.ctx, &mut fx.store).unwrap();
        assert_eq!(result.evidence, vec!["stack/stack_report.json"]);
    }

    #[test]
    fn stack_aggregates_missing_keys_and_discrepancies() {
        let mut fx = Fixture::new();
        fx.write_json(
            "stack_report.json",
            json!({"frontend": "react", "discrepancies": ["node 16 EOL", "orm mismatch"]}),
        );

        let err = gate(json!({})).execute(&mut fx.ctx, &mut fx.store).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Stack report missing keys: backend, database; \
             Stack discrepancies unresolved: node 16 EOL, orm mismatch"
        );
    }

    #[test]
    fn stack_honors_custom_keys() {
        let mut fx = Fixture::new();
        fx.write_json("custom.json", json!({"runtime": "wasm"}));

        let settings = json!({"stack_file": "custom.json", "required_keys": ["runtime"]});
        assert!(gate(settings).execute(&mut fx.ctx, &mut fx.store).is_ok());
    }
}
