//! Product requirements and architecture documents.

use serde::Deserialize;

use super::{
    ensure_valid, parse_settings, read_text, BuildGate, Gate, GateError, GateOutput, GateResult,
};
use crate::config::{GateDescriptor, ValidationResult};
use crate::context::RunContext;
use crate::error::Result;
use crate::evidence::{sha256_hex, EvidenceStore};

fn default_prd_file() -> String {
    "PRD.md".to_string()
}

fn default_architecture_file() -> String {
    "ARCHITECTURE.md".to_string()
}

fn default_required_sections() -> Vec<String> {
    vec![
        "# Product Requirements".to_string(),
        "# Architecture Overview".to_string(),
    ]
}

/// Settings for [`PrdGate`].
#[derive(Debug, Clone, Deserialize)]
pub struct PrdSettings {
    #[serde(default = "default_prd_file")]
    pub prd_file: String,
    #[serde(default = "default_architecture_file")]
    pub architecture_file: String,
    /// Headings that must appear in at least one of the two documents.
    #[serde(default = "default_required_sections")]
    pub required_sections: Vec<String>,
}

impl Default for PrdSettings {
    fn default() -> Self {
        Self {
            prd_file: default_prd_file(),
            architecture_file: default_architecture_file(),
            required_sections: default_required_sections(),
        }
    }
}

/// Checks that the PRD and architecture documents exist and cover the required sections.
pub struct PrdGate {
    name: String,
    settings: PrdSettings,
}

impl PrdGate {
    pub fn new(name: impl Into<String>, settings: PrdSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

impl BuildGate for PrdGate {
    fn from_descriptor(descriptor: &GateDescriptor) -> Result<Self> {
        Ok(Self::new(&descriptor.name, parse_settings(descriptor)?))
    }
}

impl Gate for PrdGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut RunContext, evidence: &mut EvidenceStore) -> GateOutput {
        let prd_path = ctx.project_path(&self.settings.prd_file);
        let arch_path = ctx.project_path(&self.settings.architecture_file);

        let missing: Vec<String> = [&prd_path, &arch_path]
            .iter()
            .filter(|p| !p.is_file())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(GateError::Failed(format!(
                "PRD gate missing files: {}",
                missing.join(", ")
            )));
        }

        let prd = read_text(&prd_path, "PRD document")?;
        let architecture = read_text(&arch_path, "Architecture document")?;

        let mut violations = ValidationResult::default();
        for section in &self.settings.required_sections {
            if !prd.contains(section.as_str()) && !architecture.contains(section.as_str()) {
                violations.add_error(format!(
                    "Required section '{}' not found in PRD or architecture docs",
                    section
                ));
            }
        }
        ensure_valid(violations)?;

        let hashes = format!(
            "PRD checksum: {}\nARCH checksum: {}\n",
            sha256_hex(prd.as_bytes()),
            sha256_hex(architecture.as_bytes())
        );
        let path = evidence.write_text(
            "prd/prd_hash.txt",
            &hashes,
            "documentation",
            "PRD and architecture verification hashes",
        )?;
        Ok(GateResult::passed(
            "PRD and architecture assets validated",
            vec![path],
        ))
    }
}
