//! Environment gate: required external tools and their versions.

use std::cmp::Ordering;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{parse_settings, BuildGate, Gate, GateError, GateOutput, GateResult};
use crate::config::GateDescriptor;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::evidence::EvidenceStore;

/// Timeout for a single version probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// First `X.Y.Z` token in probe output.
static VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("version regex is valid"));

/// A tool the environment must provide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequirement {
    /// Display name.
    pub name: String,
    /// Executable looked up on `PATH`; defaults to `name`.
    #[serde(default)]
    pub command: Option<String>,
    /// Minimum dotted version, e.g. `2.0.0`.
    #[serde(default)]
    pub min_version: Option<String>,
    /// Command printing the version; defaults to `<command> --version`.
    #[serde(default)]
    pub version_command: Option<String>,
}

impl ToolRequirement {
    /// Creates a requirement on a tool with no version constraint.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: None,
            min_version: None,
            version_command: None,
        }
    }

    /// Sets the minimum version.
    pub fn with_min_version(mut self, version: impl Into<String>) -> Self {
        self.min_version = Some(version.into());
        self
    }

    /// Returns the executable name.
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or(&self.name)
    }

    /// Returns the version probe as argv.
    pub fn version_argv(&self) -> Vec<String> {
        match &self.version_command {
            Some(cmd) => cmd.split_whitespace().map(str::to_string).collect(),
            None => vec![self.command().to_string(), "--version".to_string()],
        }
    }
}

/// Settings for [`EnvironmentGate`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    /// Tools to check.
    pub required_tools: Vec<ToolRequirement>,
}

/// Availability status of a probed tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Found, and new enough when a minimum is configured.
    Available,
    /// Not found on `PATH`.
    Missing,
    /// Found but older than the configured minimum.
    VersionTooLow,
    /// Found but no version could be read from the probe output.
    UnknownVersion,
    /// The version probe did not finish in time.
    ProbeTimedOut,
    /// The version probe could not be started.
    ProbeFailed,
}

/// Per-tool entry of the environment report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolReport {
    pub name: String,
    pub command: String,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Output of a version probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutput {
    /// The probe exited; stdout, or stderr when stdout was empty.
    Completed(String),
    /// The probe was killed after the timeout.
    TimedOut,
}

/// Locates tools and runs version probes.
pub trait ToolProbe: Send + Sync {
    /// Finds an executable by name.
    fn locate(&self, command: &str) -> Option<PathBuf>;

    /// Runs a version probe, blocking for at most `timeout`.
    fn version_output(&self, argv: &[String], timeout: Duration) -> std::io::Result<ProbeOutput>;
}

/// Probes the real system `PATH` with blocking subprocesses.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl ToolProbe for SystemProbe {
    fn locate(&self, command: &str) -> Option<PathBuf> {
        if command.contains(std::path::MAIN_SEPARATOR) || command.contains('/') {
            let path = PathBuf::from(command);
            return is_executable(&path).then_some(path);
        }
        let paths = std::env::var_os("PATH")?;
        std::env::split_paths(&paths)
            .map(|dir| dir.join(command))
            .find(|candidate| is_executable(candidate))
    }

    fn version_output(&self, argv: &[String], timeout: Duration) -> std::io::Result<ProbeOutput> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty version command")
        })?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Pipes are drained while the child runs so a chatty probe cannot fill them.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + timeout;
        while child.try_wait()?.is_none() {
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(ProbeOutput::TimedOut);
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        let (Some(stdout), Some(stderr)) = (collect(stdout, deadline), collect(stderr, deadline))
        else {
            return Ok(ProbeOutput::TimedOut);
        };
        let stdout = String::from_utf8_lossy(&stdout).trim().to_string();
        if stdout.is_empty() {
            Ok(ProbeOutput::Completed(
                String::from_utf8_lossy(&stderr).trim().to_string(),
            ))
        } else {
            Ok(ProbeOutput::Completed(stdout))
        }
    }
}

/// Reads a pipe to the end on a helper thread.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Waits for a drained pipe until the deadline; `None` means it never closed.
fn collect(pipe: Option<Receiver<Vec<u8>>>, deadline: Instant) -> Option<Vec<u8>> {
    match pipe {
        Some(rx) => rx
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .ok(),
        None => Some(Vec::new()),
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Parses a dotted numeric version such as `2.0.1`.
pub fn parse_version(raw: &str) -> Option<Vec<u64>> {
    let raw = raw.trim().trim_start_matches('v');
    if raw.is_empty() {
        return None;
    }
    raw.split('.').map(|part| part.parse::<u64>().ok()).collect()
}

/// Compares two versions component-wise; missing components count as zero.
pub fn compare_versions(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Extracts the first `X.Y.Z` version from free-form tool output.
pub fn extract_version(output: &str) -> Option<String> {
    VERSION_REGEX
        .find(output)
        .map(|version| version.as_str().to_string())
}

/// Ensures required tools are available with acceptable versions.
///
/// Every tool is probed before failing, so one failure lists all problems.
pub struct EnvironmentGate {
    name: String,
    settings: EnvironmentSettings,
    probe: Box<dyn ToolProbe>,
}

impl EnvironmentGate {
    /// Creates an environment gate probing the real system.
    pub fn new(name: impl Into<String>, settings: EnvironmentSettings) -> Result<Self> {
        Self::with_probe(name, settings, Box::new(SystemProbe))
    }

    /// Creates an environment gate with a custom probe.
    pub fn with_probe(
        name: impl Into<String>,
        settings: EnvironmentSettings,
        probe: Box<dyn ToolProbe>,
    ) -> Result<Self> {
        let name = name.into();
        for tool in &settings.required_tools {
            if tool.name.trim().is_empty() || tool.command().trim().is_empty() {
                return Err(Error::Config(format!(
                    "gate '{}': each required tool must include a name and command",
                    name
                )));
            }
            if let Some(min) = &tool.min_version {
                if parse_version(min).is_none() {
                    return Err(Error::Config(format!(
                        "gate '{}': unable to parse minimum version '{}' for {}",
                        name, min, tool.name
                    )));
                }
            }
        }
        Ok(Self {
            name,
            settings,
            probe,
        })
    }

    /// Probes one tool; the second element is its failure entry, if any.
    fn check_tool(&self, tool: &ToolRequirement) -> (ToolReport, Option<String>) {
        let command = tool.command().to_string();
        let mut report = ToolReport {
            name: tool.name.clone(),
            command: command.clone(),
            status: ToolStatus::Available,
            executable: None,
            version: None,
            output: None,
        };

        let Some(executable) = self.probe.locate(&command) else {
            report.status = ToolStatus::Missing;
            return (report, Some(tool.name.clone()));
        };
        report.executable = Some(executable.display().to_string());

        let output = match self.probe.version_output(&tool.version_argv(), PROBE_TIMEOUT) {
            Ok(ProbeOutput::Completed(text)) => text,
            Err(e) => {
                tracing::warn!(tool = %tool.name, error = %e, "version probe failed");
                report.status = ToolStatus::ProbeFailed;
                let failure = format!("{} (unable to execute version command: {})", tool.name, e);
                return (report, Some(failure));
            }
            Ok(ProbeOutput::TimedOut) => {
                tracing::warn!(tool = %tool.name, "version probe timed out");
                report.status = ToolStatus::ProbeTimedOut;
                let failure = tool
                    .min_version
                    .as_ref()
                    .map(|min| format!("{} >= {} (version probe timed out)", tool.name, min));
                return (report, failure);
            }
        };

        let detected = extract_version(&output);
        report.version = detected.clone();
        report.output = Some(output);

        let Some(min) = &tool.min_version else {
            return (report, None);
        };
        let Some(found) = detected else {
            tracing::warn!(tool = %tool.name, "could not determine tool version");
            report.status = ToolStatus::UnknownVersion;
            return (report, None);
        };

        let (Some(found_parts), Some(min_parts)) = (parse_version(&found), parse_version(min))
        else {
            report.status = ToolStatus::UnknownVersion;
            return (report, None);
        };
        if compare_versions(&found_parts, &min_parts) == Ordering::Less {
            report.status = ToolStatus::VersionTooLow;
            let failure = format!("{} >= {} (found {})", tool.name, min, found);
            return (report, Some(failure));
        }
        (report, None)
    }
}

impl BuildGate for EnvironmentGate {
    fn from_descriptor(descriptor: &GateDescriptor) -> Result<Self> {
        Self::new(&descriptor.name, parse_settings(descriptor)?)
    }
}

impl Gate for EnvironmentGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, _ctx: &mut RunContext, evidence: &mut EvidenceStore) -> GateOutput {
        let mut reports = Vec::new();
        let mut failures = Vec::new();

        for tool in &self.settings.required_tools {
            let (report, failure) = self.check_tool(tool);
            tracing::debug!(tool = %report.name, status = ?report.status, "probed tool");
            reports.push(report);
            failures.extend(failure);
        }

        if !failures.is_empty() {
            failures.sort();
            return Err(GateError::Failed(format!(
                "Environment checks failed for: {}",
                failures.join(", ")
            )));
        }

        let path = evidence.write_json(
            "environment/tool_report.json",
            &serde_json::json!({ "tools": reports }),
            "environment",
            "Tool availability report",
        )?;
        Ok(GateResult::passed("Environment validation passed", vec![path]))
    }
}
