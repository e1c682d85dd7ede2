//! Evidence store.
//!
//! Writes gate artifacts under a run-scoped root, checksums each artifact at
//! write time and keeps the records in memory until they are finalized into a
//! manifest. A single store is owned by the orchestrator for a whole run.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Default manifest file name, relative to the evidence root.
pub const MANIFEST_NAME: &str = "index.json";

/// An evidence artifact stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// Path relative to the evidence root, always `/`-separated.
    pub path: String,
    /// Category label (usually the gate family).
    pub category: String,
    /// Human-readable description.
    pub description: String,
    /// Hex SHA-256 of the bytes written.
    pub checksum: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Snapshot of everything recorded so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSummary {
    /// Records in write order.
    pub artifacts: Vec<EvidenceRecord>,
    /// When the summary was produced.
    pub generated_at: String,
}

/// A manifest entry whose artifact no longer matches its recorded checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumMismatch {
    /// Artifact path relative to the evidence root.
    pub path: String,
    /// Checksum recorded in the manifest.
    pub expected: String,
    /// Checksum of the current bytes, or `None` if the file is gone.
    pub actual: Option<String>,
}

/// Computes the hex SHA-256 digest of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Writes evidence artifacts and maintains the in-memory record list.
#[derive(Debug)]
pub struct EvidenceStore {
    root: PathBuf,
    records: Vec<EvidenceRecord>,
}

impl EvidenceStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        tracing::debug!(root = ?root, "opened evidence store");
        Ok(Self {
            root,
            records: Vec::new(),
        })
    }

    /// Returns the evidence root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the records written so far, in write order.
    pub fn records(&self) -> &[EvidenceRecord] {
        &self.records
    }

    /// Serializes `payload` as pretty JSON with sorted keys and records it.
    ///
    /// Returns the artifact path relative to the evidence root.
    pub fn write_json<T: Serialize + ?Sized>(
        &mut self,
        relative_path: &str,
        payload: &T,
        category: &str,
        description: &str,
    ) -> Result<String> {
        // Round-tripping through Value sorts object keys.
        let value = serde_json::to_value(payload)?;
        let bytes = serde_json::to_vec_pretty(&value)?;
        self.write_bytes(relative_path, &bytes, category, description)
    }

    /// Writes UTF-8 text and records it.
    ///
    /// Returns the artifact path relative to the evidence root.
    pub fn write_text(
        &mut self,
        relative_path: &str,
        content: &str,
        category: &str,
        description: &str,
    ) -> Result<String> {
        self.write_bytes(relative_path, content.as_bytes(), category, description)
    }

    fn write_bytes(
        &mut self,
        relative_path: &str,
        bytes: &[u8],
        category: &str,
        description: &str,
    ) -> Result<String> {
        let key = normalize_relative(relative_path)?;
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;

        let record = EvidenceRecord {
            path: key.clone(),
            category: category.to_string(),
            description: description.to_string(),
            checksum: sha256_hex(bytes),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        tracing::debug!(
            path = %record.path,
            category = %record.category,
            checksum = %record.checksum,
            "recorded evidence"
        );

        // Rewriting an artifact supersedes its earlier record.
        self.records.retain(|r| r.path != key);
        self.records.push(record);
        Ok(key)
    }

    /// Writes the path-sorted record list to `manifest_name` and returns its path.
    pub fn finalize(&self, manifest_name: &str) -> Result<PathBuf> {
        let manifest_path = self.root.join(normalize_relative(manifest_name)?);
        let mut records = self.records.clone();
        records.sort_by(|a, b| a.path.cmp(&b.path));

        if let Some(parent) = manifest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&manifest_path, serde_json::to_vec_pretty(&records)?)?;
        tracing::info!(
            artifacts = records.len(),
            path = ?manifest_path,
            "wrote evidence manifest"
        );
        Ok(manifest_path)
    }

    /// Returns the current records with a generation timestamp.
    pub fn summary(&self) -> EvidenceSummary {
        EvidenceSummary {
            artifacts: self.records.clone(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Re-reads a finalized manifest and checks every artifact against its checksum.
///
/// Returns the mismatches; an empty list means the evidence trail is intact.
pub fn verify_manifest(root: &Path, manifest_name: &str) -> Result<Vec<ChecksumMismatch>> {
    let manifest_path = root.join(normalize_relative(manifest_name)?);
    let content = std::fs::read(&manifest_path).map_err(|e| {
        Error::Evidence(format!(
            "unable to read manifest {}: {}",
            manifest_path.display(),
            e
        ))
    })?;
    let records: Vec<EvidenceRecord> = serde_json::from_slice(&content)?;

    let mut mismatches = Vec::new();
    for record in records {
        let actual = std::fs::read(root.join(&record.path))
            .ok()
            .map(|bytes| sha256_hex(&bytes));
        if actual.as_deref() != Some(record.checksum.as_str()) {
            mismatches.push(ChecksumMismatch {
                path: record.path,
                expected: record.checksum,
                actual,
            });
        }
    }
    Ok(mismatches)
}

/// Validates an artifact path and renders it `/`-separated.
fn normalize_relative(relative_path: &str) -> Result<String> {
    let path = Path::new(relative_path);
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(Error::Evidence(format!(
                    "evidence path must stay inside the evidence root: {}",
                    relative_path
                )))
            }
        }
    }
    if parts.is_empty() {
        return Err(Error::Evidence("evidence path cannot be empty".to_string()));
    }
    Ok(parts.join("/"))
}
