//! Dry-run scaffolding and generated file manifests.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Value;

use super::{
    display_value, ensure_valid, load_json_object, parse_settings, BuildGate, Gate, GateError,
    GateOutput, GateResult,
};
use crate::config::{GateDescriptor, ValidationResult};
use crate::context::RunContext;
use crate::error::Result;
use crate::evidence::EvidenceStore;

fn default_snapshot_file() -> String {
    "dryrun_snapshot.json".to_string()
}

fn default_manifest_file() -> String {
    "file_manifest.json".to_string()
}

/// Settings for [`DryRunGate`].
#[derive(Debug, Clone, Deserialize)]
pub struct DryRunSettings {
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
    /// Modules the dry run must have produced.
    #[serde(default)]
    pub expected_modules: Vec<String>,
}

impl Default for DryRunSettings {
    fn default() -> Self {
        Self {
            snapshot_file: default_snapshot_file(),
            expected_modules: Vec::new(),
        }
    }
}

/// Settings for [`GenerationGate`].
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            manifest_file: default_manifest_file(),
        }
    }
}

/// Checks the dry-run snapshot status and module coverage.
pub struct DryRunGate {
    name: String,
    settings: DryRunSettings,
}

impl DryRunGate {
    pub fn new(name: impl Into<String>, settings: DryRunSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

impl BuildGate for DryRunGate {
    fn from_descriptor(descriptor: &GateDescriptor) -> Result<Self> {
        Ok(Self::new(&descriptor.name, parse_settings(descriptor)?))
    }
}

impl Gate for DryRunGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut RunContext, evidence: &mut EvidenceStore) -> GateOutput {
        let snapshot = load_json_object(&ctx.project_path(&self.settings.snapshot_file))?;
        let mut violations = ValidationResult::default();

        match snapshot.get("status") {
            Some(Value::String(s)) if s == "success" => {}
            other => violations.add_error(format!(
                "Dry-run reported non-success status: {}",
                other.map(display_value).unwrap_or_else(|| "none".to_string())
            )),
        }

        let actual: BTreeSet<String> = snapshot
            .get("modules")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(display_value).collect())
            .unwrap_or_default();
        let missing: BTreeSet<&str> = self
            .settings
            .expected_modules
            .iter()
            .filter(|m| !actual.contains(*m))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            violations.add_error(format!(
                "Dry-run missing modules: {}",
                missing.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
        ensure_valid(violations)?;

        let path = evidence.write_json(
            "dryrun/snapshot.json",
            &snapshot,
            "generation",
            "Dry-run snapshot",
        )?;
        Ok(GateResult::passed("Dry-run snapshot validated", vec![path]))
    }
}

/// Checks the generated file manifest for missing and duplicate paths.
pub struct GenerationGate {
    name: String,
    settings: GenerationSettings,
}

impl GenerationGate {
    pub fn new(name: impl Into<String>, settings: GenerationSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

impl BuildGate for GenerationGate {
    fn from_descriptor(descriptor: &GateDescriptor) -> Result<Self> {
        Ok(Self::new(&descriptor.name, parse_settings(descriptor)?))
    }
}

impl Gate for GenerationGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut RunContext, evidence: &mut EvidenceStore) -> GateOutput {
        let manifest = load_json_object(&ctx.project_path(&self.settings.manifest_file))?;
        let files = match manifest.get("files") {
            Some(Value::Array(files)) if !files.is_empty() => files,
            _ => {
                return Err(GateError::Failed(
                    "Generation manifest must include at least one file entry".to_string(),
                ))
            }
        };

        let mut violations = ValidationResult::default();
        let mut seen = BTreeSet::new();
        let mut duplicates = BTreeSet::new();
        let mut pathless = 0;
        for entry in files {
            match entry.get("path").and_then(Value::as_str).filter(|p| !p.is_empty()) {
                Some(path) => {
                    if !seen.insert(path) {
                        duplicates.insert(path);
                    }
                }
                None => pathless += 1,
            }
        }
        if pathless > 0 {
            violations.add_error(format!(
                "File manifest entries must include a 'path' ({} without)",
                pathless
            ));
        }
        if !duplicates.is_empty() {
            violations.add_error(format!(
                "Duplicate files detected in manifest: {}",
                duplicates.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
        ensure_valid(violations)?;

        let path = evidence.write_json(
            "generation/file_manifest.json",
            &manifest,
            "generation",
            "Generated file manifest",
        )?;
        Ok(GateResult::passed("Generation manifest validated", vec![path]))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{descriptor, Fixture};
    use super::*;
    use serde_json::json;

    fn dry_run(settings: Value) -> DryRunGate {
        DryRunGate::from_descriptor(&descriptor("dry_run", settings)).unwrap()
    }

    fn generation() -> GenerationGate {
        GenerationGate::from_descriptor(&descriptor("generation", json!({}))).unwrap()
    }

    #[test]
    fn dry_run_passes_with_expected_modules() {
        let mut fx = Fixture::new();
        fx.write_json(
            "dryrun_snapshot.json",
            json!({"status": "success", "modules": ["api", "web", "worker"]}),
        );

        let result = dry_run(json!({"expected_modules": ["api", "web"]}))
            .execute(&mut fx.ctx, &mut fx.store)
            .unwrap();
        assert_eq!(result.evidence, vec!["dryrun/snapshot.json"]);
        assert_eq!(fx.store.records()[0].category, "generation");
    }

    #[test]
    fn dry_run_reports_status_and_sorted_missing_modules() {
        let mut fx = Fixture::new();
        fx.write_json("dryrun_snapshot.json", json!({"status": "failed", "modules": ["api"]}));

        let err = dry_run(json!({"expected_modules": ["web", "api", "cli"]}))
            .execute(&mut fx.ctx, &mut fx.store)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Dry-run reported non-success status: failed; Dry-run missing modules: cli, web"
        );
    }

    #[test]
    fn generation_passes_with_unique_paths() {
        let mut fx = Fixture::new();
        fx.write_json(
            "file_manifest.json",
            json!({"files": [{"path": "src/main.rs"}, {"path": "Cargo.toml"}]}),
        );

        assert!(generation().execute(&mut fx.ctx, &mut fx.store).is_ok());
    }

    #[test]
    fn generation_rejects_empty_manifest() {
        let mut fx = Fixture::new();
        fx.write_json("file_manifest.json", json!({"files": []}));

        let err = generation().execute(&mut fx.ctx, &mut fx.store).unwrap_err();
        assert!(err.to_string().contains("at least one file entry"));
    }

    #[test]
    fn generation_reports_duplicates_sorted() {
        let mut fx = Fixture::new();
        fx.write_json(
            "file_manifest.json",
            json!({"files": [
                {"path": "b.rs"}, {"path": "a.rs"}, {"path": "b.rs"},
                {"path": "a.rs"}, {"size": 3},
            ]}),
        );

        let err = generation().execute(&mut fx.ctx, &mut fx.store).unwrap_err();
        assert_eq!(
            err.to_string(),
            "File manifest entries must include a 'path' (1 without); \
             Duplicate files detected in manifest: a.rs, b.rs"
        );
    }
}
