//! Run configuration loading and validation.
//!
//! A run configuration is an ordered list of gate descriptors plus run-level
//! settings, read once from a YAML, TOML or JSON file at process start.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Opaque per-gate settings, interpreted by each gate.
pub type Settings = Map<String, Value>;

/// Default evidence directory, relative to the project root.
pub const DEFAULT_EVIDENCE_ROOT: &str = "evidence";

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing with a configuration error if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

/// Configuration for a single gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDescriptor {
    /// Gate name, unique within a run.
    pub name: String,
    /// Registry key or dotted path naming the gate implementation.
    pub implementation: String,
    /// Disabled gates are skipped entirely.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Gate-specific settings.
    #[serde(default)]
    pub settings: Settings,
}

fn default_enabled() -> bool {
    true
}

impl GateDescriptor {
    /// Creates an enabled descriptor with no settings.
    pub fn new(name: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implementation: implementation.into(),
            enabled: true,
            settings: Settings::new(),
        }
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the gate settings from a JSON object. Non-object values are ignored.
    pub fn with_settings(mut self, settings: Value) -> Self {
        if let Value::Object(map) = settings {
            self.settings = map;
        }
        self
    }

    fn from_value(index: usize, value: &Value) -> Result<Self> {
        let entry = value.as_object().ok_or_else(|| {
            Error::Config(format!(
                "gate entry #{} must be an object with gate metadata",
                index + 1
            ))
        })?;

        let name = required_str(entry, "name", index)?;
        let implementation = required_str(entry, "implementation", index)?;

        let enabled = match entry.get("enabled") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(Error::Config(format!(
                    "gate '{}' has non-boolean 'enabled' value: {}",
                    name, other
                )))
            }
        };

        let settings = match entry.get("settings") {
            None | Some(Value::Null) => Settings::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(Error::Config(format!(
                    "gate '{}' settings must be a mapping",
                    name
                )))
            }
        };

        Ok(Self {
            name,
            implementation,
            enabled,
            settings,
        })
    }
}

fn required_str(entry: &Map<String, Value>, field: &str, index: usize) -> Result<String> {
    match entry.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        _ => Err(Error::Config(format!(
            "gate entry #{} missing required field: '{}'",
            index + 1,
            field
        ))),
    }
}

/// Top-level configuration for orchestrating gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    /// Gates in execution order.
    pub gates: Vec<GateDescriptor>,
    /// Evidence directory, relative to the project root unless absolute.
    pub evidence_root: PathBuf,
    /// Default metadata file for gates that need one.
    pub metadata_file: Option<String>,
    /// Default brief file for gates that need one.
    pub brief_file: Option<String>,
}

impl RunConfiguration {
    /// Creates a configuration with the given gates and default run settings.
    pub fn new(gates: Vec<GateDescriptor>) -> Self {
        Self {
            gates,
            evidence_root: PathBuf::from(DEFAULT_EVIDENCE_ROOT),
            metadata_file: None,
            brief_file: None,
        }
    }

    /// Sets the evidence root.
    pub fn with_evidence_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.evidence_root = root.into();
        self
    }

    /// Loads configuration from a YAML, TOML or JSON file, chosen by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "unable to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let parsed: std::result::Result<Value, String> = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&text).map_err(|e| e.to_string()),
            "toml" => toml::from_str(&text).map_err(|e| e.to_string()),
            _ => serde_json::from_str(&text).map_err(|e| e.to_string()),
        };
        let data = parsed.map_err(|e| {
            Error::Config(format!(
                "failed to parse configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::from_value(&data)?;
        tracing::debug!(path = ?path, gates = config.gates.len(), "loaded run configuration");
        Ok(config)
    }

    /// Builds a configuration from an already-parsed document.
    ///
    /// Unknown fields are ignored.
    pub fn from_value(data: &Value) -> Result<Self> {
        let root = data.as_object().ok_or_else(|| {
            Error::Config("configuration root must be a mapping".to_string())
        })?;

        let gates_payload = match root.get("gates") {
            Some(Value::Array(items)) if !items.is_empty() => items,
            _ => {
                return Err(Error::Config(
                    "configuration must include a non-empty 'gates' list".to_string(),
                ))
            }
        };

        let gates = gates_payload
            .iter()
            .enumerate()
            .map(|(i, v)| GateDescriptor::from_value(i, v))
            .collect::<Result<Vec<_>>>()?;

        let evidence_root = root
            .get("evidence_root")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_EVIDENCE_ROOT);

        let config = Self {
            gates,
            evidence_root: PathBuf::from(evidence_root),
            metadata_file: optional_str(root, "metadata_file"),
            brief_file: optional_str(root, "brief_file"),
        };

        config.validate().into_result()?;
        Ok(config)
    }

    /// Looks up a gate descriptor by name.
    pub fn gate(&self, name: &str) -> Option<&GateDescriptor> {
        self.gates.iter().find(|g| g.name == name)
    }

    /// Returns the enabled gates in declared order.
    pub fn enabled_gates(&self) -> impl Iterator<Item = &GateDescriptor> {
        self.gates.iter().filter(|g| g.enabled)
    }
}

fn optional_str(root: &Map<String, Value>, field: &str) -> Option<String> {
    root.get(field).and_then(Value::as_str).map(str::to_string)
}

impl Validate for RunConfiguration {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.gates.is_empty() {
            result.add_error("configuration must include a non-empty 'gates' list");
        }

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for gate in &self.gates {
            if !seen.insert(gate.name.as_str()) && !duplicates.contains(&gate.name) {
                duplicates.push(gate.name.clone());
            }
        }
        if !duplicates.is_empty() {
            result.add_error(format!("duplicate gate names: {}", duplicates.join(", ")));
        }

        if self.enabled_gates().next().is_none() && !self.gates.is_empty() {
            result.add_warning("all gates are disabled; the run will only write a report");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn loads_yaml_configuration() {
        let temp = TempDir::new().unwrap();
        let path = write(
            &temp,
            "gates.yaml",
            r#"
evidence_root: out/evidence
metadata_file: meta.json
gates:
  - name: Intake
    implementation: intake
    settings:
      required_fields: [name, owner]
  - name: Environment
    implementation: scripts.workflow_automation.gates.EnvironmentGate
    enabled: false
unknown_field: ignored
"#,
        );

        let config = RunConfiguration::load(&path).unwrap();
        assert_eq!(config.gates.len(), 2);
        assert_eq!(config.gates[0].name, "Intake");
        assert!(config.gates[0].enabled);
        assert_eq!(
            config.gates[0].settings.get("required_fields"),
            Some(&json!(["name", "owner"]))
        );
        assert!(!config.gates[1].enabled);
        assert_eq!(config.evidence_root, PathBuf::from("out/evidence"));
        assert_eq!(config.metadata_file.as_deref(), Some("meta.json"));
        assert_eq!(config.brief_file, None);
        assert_eq!(config.enabled_gates().count(), 1);
    }

    #[test]
    fn loads_json_configuration_with_defaults() {
        let temp = TempDir::new().unwrap();
        let path = write(
            &temp,
            "gates.json",
            r#"{"gates": [{"name": "Plan", "implementation": "planning"}]}"#,
        );

        let config = RunConfiguration::load(&path).unwrap();
        assert_eq!(config.evidence_root, PathBuf::from("evidence"));
        assert!(config.gates[0].settings.is_empty());
    }

    #[test]
    fn loads_toml_configuration() {
        let temp = TempDir::new().unwrap();
        let path = write(
            &temp,
            "gates.toml",
            r#"
evidence_root = "ev"

[[gates]]
name = "Stack"
implementation = "stack"

[gates.settings]
required_keys = ["backend"]
"#,
        );

        let config = RunConfiguration::load(&path).unwrap();
        assert_eq!(config.gates[0].implementation, "stack");
        assert_eq!(
            config.gates[0].settings.get("required_keys"),
            Some(&json!(["backend"]))
        );
    }

    #[test]
    fn missing_gates_is_config_error() {
        let err = RunConfiguration::from_value(&json!({"evidence_root": "x"})).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("gates"));
    }

    #[test]
    fn empty_gates_is_config_error() {
        let err = RunConfiguration::from_value(&json!({"gates": []})).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn non_sequence_gates_is_config_error() {
        let err = RunConfiguration::from_value(&json!({"gates": {"name": "x"}})).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn non_mapping_root_is_config_error() {
        let err = RunConfiguration::from_value(&json!(["gates"])).unwrap_err();
        assert!(err.to_string().contains("mapping"));
    }

    #[test]
    fn gate_without_implementation_is_config_error() {
        let err =
            RunConfiguration::from_value(&json!({"gates": [{"name": "Intake"}]})).unwrap_err();
        assert!(err.to_string().contains("implementation"));
    }

    #[test]
    fn gate_without_name_is_config_error() {
        let err = RunConfiguration::from_value(&json!({"gates": [{"implementation": "intake"}]}))
            .unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn duplicate_gate_names_rejected() {
        let err = RunConfiguration::from_value(&json!({
            "gates": [
                {"name": "Intake", "implementation": "intake"},
                {"name": "Intake", "implementation": "planning"}
            ]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate gate names: Intake"));
    }

    #[test]
    fn unparseable_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "gates.json", "{not json");
        let err = RunConfiguration::load(&path).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = RunConfiguration::load("/nonexistent/gates.yaml").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn all_disabled_warns() {
        let config = RunConfiguration::new(vec![
            GateDescriptor::new("Intake", "intake").with_enabled(false),
        ]);
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("disabled")));
    }

    #[test]
    fn validation_result_into_result_err_on_invalid() {
        let mut result = ValidationResult::default();
        result.add_error("fatal error");
        result.add_warning("warning");
        assert!(result.into_result().is_err());
    }
}
