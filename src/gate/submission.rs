//! Submission package readiness.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ensure_valid, parse_settings, read_text, BuildGate, Gate, GateOutput, GateResult};
use crate::config::{GateDescriptor, ValidationResult};
use crate::context::RunContext;
use crate::error::Result;
use crate::evidence::{sha256_hex, EvidenceStore};

fn default_checklist_file() -> String {
    "submission_index.md".to_string()
}

fn default_dist_dir() -> String {
    "dist".to_string()
}

/// Settings for [`SubmissionGate`].
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionSettings {
    #[serde(default = "default_checklist_file")]
    pub checklist_file: String,
    #[serde(default = "default_dist_dir")]
    pub dist_dir: String,
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        Self {
            checklist_file: default_checklist_file(),
            dist_dir: default_dist_dir(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DistFile {
    path: String,
    checksum: String,
}

/// Checks the submission checklist and distribution directory.
pub struct SubmissionGate {
    name: String,
    settings: SubmissionSettings,
}

impl SubmissionGate {
    pub fn new(name: impl Into<String>, settings: SubmissionSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

impl BuildGate for SubmissionGate {
    fn from_descriptor(descriptor: &GateDescriptor) -> Result<Self> {
        Ok(Self::new(&descriptor.name, parse_settings(descriptor)?))
    }
}

impl Gate for SubmissionGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut RunContext, evidence: &mut EvidenceStore) -> GateOutput {
        let checklist_path = ctx.project_path(&self.settings.checklist_file);
        let dist_dir = ctx.project_path(&self.settings.dist_dir);
        let mut violations = ValidationResult::default();

        if !checklist_path.is_file() {
            violations.add_error(format!(
                "Submission checklist missing: {}",
                checklist_path.display()
            ));
        }

        let mut files = Vec::new();
        if dist_dir.is_dir() {
            collect_files(&dist_dir, &mut files)?;
            files.sort();
            if files.is_empty() {
                violations.add_error("Submission package contains no files");
            }
        } else {
            violations.add_error(format!(
                "Distribution directory missing: {}",
                dist_dir.display()
            ));
        }
        ensure_valid(violations)?;

        let mut entries = Vec::with_capacity(files.len());
        for file in &files {
            let relative = file
                .strip_prefix(&dist_dir)
                .unwrap_or(file)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(DistFile {
                path: relative,
                checksum: sha256_hex(&std::fs::read(file)?),
            });
        }
        tracing::debug!(files = entries.len(), "collected submission package");

        let checklist = read_text(&checklist_path, "Submission checklist")?;
        let evidence_paths = vec![
            evidence.write_json(
                "submission/dist_manifest.json",
                &json!({ "files": entries }),
                "submission",
                "Submission package manifest",
            )?,
            evidence.write_text(
                "submission/checklist.md",
                &checklist,
                "submission",
                "Submission readiness checklist",
            )?,
        ];
        Ok(GateResult::passed("Submission package validated", evidence_paths))
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}
