//! Intake gate: project metadata and brief.

use serde::Deserialize;

use super::{
    ensure_valid, load_json_object, parse_settings, BuildGate, Gate, GateError, GateOutput,
    GateResult,
};
use crate::config::{GateDescriptor, ValidationResult};
use crate::context::RunContext;
use crate::error::Result;
use crate::evidence::EvidenceStore;

/// Settings for [`IntakeGate`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntakeSettings {
    /// Metadata file; falls back to the run configuration, then `metadata.json`.
    pub metadata_file: Option<String>,
    /// Brief file; falls back to the run configuration, then `brief.md`.
    pub brief_file: Option<String>,
    /// Fields the metadata object must contain.
    pub required_fields: Vec<String>,
    /// Number of characters of the brief kept as evidence.
    pub brief_excerpt_chars: usize,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            metadata_file: None,
            brief_file: None,
            required_fields: Vec::new(),
            brief_excerpt_chars: 1000,
        }
    }
}

/// Validates project intake metadata and brief, and loads both into the run context.
pub struct IntakeGate {
    name: String,
    settings: IntakeSettings,
}

impl IntakeGate {
    /// Creates an intake gate.
    pub fn new(name: impl Into<String>, settings: IntakeSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

impl BuildGate for IntakeGate {
    fn from_descriptor(descriptor: &GateDescriptor) -> Result<Self> {
        Ok(Self::new(&descriptor.name, parse_settings(descriptor)?))
    }
}

impl Gate for IntakeGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut RunContext, evidence: &mut EvidenceStore) -> GateOutput {
        let metadata_rel = self
            .settings
            .metadata_file
            .clone()
            .or_else(|| ctx.config.metadata_file.clone())
            .unwrap_or_else(|| "metadata.json".to_string());
        let brief_rel = self
            .settings
            .brief_file
            .clone()
            .or_else(|| ctx.config.brief_file.clone())
            .unwrap_or_else(|| "brief.md".to_string());

        let metadata_path = ctx.project_path(&metadata_rel);
        let metadata = load_json_object(&metadata_path)?;

        let mut violations = ValidationResult::default();
        let missing: Vec<&str> = self
            .settings
            .required_fields
            .iter()
            .map(String::as_str)
            .filter(|field| !metadata.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            violations.add_error(format!(
                "metadata file {} is missing required fields: {}",
                metadata_path.display(),
                missing.join(", ")
            ));
        }

        let brief_path = ctx.project_path(&brief_rel);
        let brief = if brief_path.is_file() {
            Some(std::fs::read_to_string(&brief_path).map_err(|e| {
                GateError::Failed(format!("unable to read {}: {}", brief_path.display(), e))
            })?)
        } else {
            violations.add_error(format!("brief file not found: {}", brief_path.display()));
            None
        };

        ensure_valid(violations)?;
        let brief = brief.unwrap_or_default();

        let excerpt: String = brief.chars().take(self.settings.brief_excerpt_chars).collect();
        let evidence_paths = vec![
            evidence.write_json(
                "intake/metadata_snapshot.json",
                &metadata,
                "intake",
                "Intake metadata snapshot",
            )?,
            evidence.write_text(
                "intake/brief_excerpt.md",
                &excerpt,
                "intake",
                "Brief excerpt captured during intake gate",
            )?,
        ];

        ctx.metadata = metadata;
        ctx.brief = Some(brief);

        Ok(GateResult::passed("Intake metadata validated", evidence_paths))
    }
}
