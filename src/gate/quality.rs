//! Quality gates: automated tests, metrics thresholds and compliance attestations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    display_value, ensure_valid, load_json_object, number_field, parse_settings, BuildGate, Gate,
    GateOutput, GateResult,
};
use crate::config::{GateDescriptor, ValidationResult};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::evidence::EvidenceStore;

/// Reads a numeric field, recording a violation instead of failing when it is not numeric.
fn checked_number(
    object: &Map<String, Value>,
    field: &str,
    violations: &mut ValidationResult,
) -> Option<f64> {
    match number_field(object, field) {
        Ok(value) => Some(value.unwrap_or(0.0)),
        Err(e) => {
            violations.add_error(e.to_string());
            None
        }
    }
}

fn default_results_file() -> String {
    "test_results.json".to_string()
}

fn default_metrics_file() -> String {
    "metrics_report.json".to_string()
}

fn default_compliance_file() -> String {
    "compliance_report.json".to_string()
}

/// Settings for [`TestingGate`].
#[derive(Debug, Clone, Deserialize)]
pub struct TestingSettings {
    #[serde(default = "default_results_file")]
    pub results_file: String,
    #[serde(default)]
    pub minimum_coverage: f64,
}

impl Default for TestingSettings {
    fn default() -> Self {
        Self {
            results_file: default_results_file(),
            minimum_coverage: 0.0,
        }
    }
}

/// Settings for [`MetricsGate`].
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    #[serde(default = "default_metrics_file")]
    pub metrics_file: String,
    #[serde(default)]
    pub minimum_coverage: f64,
    /// Upper bound on p95 latency; zero disables the check.
    #[serde(default)]
    pub maximum_latency_ms: f64,
    #[serde(default)]
    pub maximum_vulnerabilities: u64,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            metrics_file: default_metrics_file(),
            minimum_coverage: 0.0,
            maximum_latency_ms: 0.0,
            maximum_vulnerabilities: 0,
        }
    }
}

/// A compliance requirement that must be attested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRequirement {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Settings for [`ComplianceGate`].
#[derive(Debug, Clone, Deserialize)]
pub struct ComplianceSettings {
    #[serde(default = "default_compliance_file")]
    pub compliance_file: String,
    #[serde(default)]
    pub requirements: Vec<ComplianceRequirement>,
}

impl Default for ComplianceSettings {
    fn default() -> Self {
        Self {
            compliance_file: default_compliance_file(),
            requirements: Vec::new(),
        }
    }
}

/// Checks automated test results and coverage.
pub struct TestingGate {
    name: String,
    settings: TestingSettings,
}

impl TestingGate {
    pub fn new(name: impl Into<String>, settings: TestingSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

impl BuildGate for TestingGate {
    fn from_descriptor(descriptor: &GateDescriptor) -> Result<Self> {
        Ok(Self::new(&descriptor.name, parse_settings(descriptor)?))
    }
}

impl Gate for TestingGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut RunContext, evidence: &mut EvidenceStore) -> GateOutput {
        let results = load_json_object(&ctx.project_path(&self.settings.results_file))?;
        let mut violations = ValidationResult::default();

        match results.get("status") {
            Some(Value::String(s)) if s == "passed" => {}
            other => violations.add_error(format!(
                "Automated tests did not pass: {}",
                other.map(display_value).unwrap_or_else(|| "none".to_string())
            )),
        }

        if let Some(coverage) = checked_number(&results, "coverage", &mut violations) {
            if coverage < self.settings.minimum_coverage {
                violations.add_error(format!(
                    "Coverage {} below minimum threshold {}",
                    coverage, self.settings.minimum_coverage
                ));
            }
        }
        ensure_valid(violations)?;

        let path = evidence.write_json(
            "testing/test_results.json",
            &results,
            "testing",
            "Automated test results",
        )?;
        Ok(GateResult::passed("Automated tests validated", vec![path]))
    }
}

/// Checks coverage, latency and vulnerability thresholds.
pub struct MetricsGate {
    name: String,
    settings: MetricsSettings,
}

impl MetricsGate {
    pub fn new(name: impl Into<String>, settings: MetricsSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

impl BuildGate for MetricsGate {
    fn from_descriptor(descriptor: &GateDescriptor) -> Result<Self> {
        Ok(Self::new(&descriptor.name, parse_settings(descriptor)?))
    }
}

impl Gate for MetricsGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut RunContext, evidence: &mut EvidenceStore) -> GateOutput {
        let metrics = load_json_object(&ctx.project_path(&self.settings.metrics_file))?;
        let settings = &self.settings;
        let mut violations = ValidationResult::default();

        let coverage = checked_number(&metrics, "coverage", &mut violations);
        let latency = checked_number(&metrics, "p95_latency_ms", &mut violations);
        let vulnerabilities = checked_number(&metrics, "critical_vulnerabilities", &mut violations);

        if let Some(coverage) = coverage.filter(|c| *c < settings.minimum_coverage) {
            violations.add_error(format!(
                "Coverage metric {} below required threshold {}",
                coverage, settings.minimum_coverage
            ));
        }
        if let Some(latency) = latency
            .filter(|l| settings.maximum_latency_ms > 0.0 && *l > settings.maximum_latency_ms)
        {
            violations.add_error(format!(
                "Performance latency {} exceeds maximum allowed {}",
                latency, settings.maximum_latency_ms
            ));
        }
        if let Some(count) =
            vulnerabilities.filter(|v| *v > settings.maximum_vulnerabilities as f64)
        {
            violations.add_error(format!(
                "Detected {} critical vulnerabilities (limit {})",
                count, settings.maximum_vulnerabilities
            ));
        }
        ensure_valid(violations)?;

        let path = evidence.write_json(
            "metrics/metrics_report.json",
            &metrics,
            "metrics",
            "Aggregated metrics report",
        )?;
        Ok(GateResult::passed("Metrics thresholds satisfied", vec![path]))
    }
}

/// Checks that every configured requirement is approved or waived.
pub struct ComplianceGate {
    name: String,
    settings: ComplianceSettings,
}

impl ComplianceGate {
    pub fn new(name: impl Into<String>, settings: ComplianceSettings) -> Result<Self> {
        let name = name.into();
        if settings.requirements.iter().any(|r| r.id.trim().is_empty()) {
            return Err(Error::Config(format!(
                "gate '{}': compliance requirements must include an 'id'",
                name
            )));
        }
        Ok(Self { name, settings })
    }
}

impl BuildGate for ComplianceGate {
    fn from_descriptor(descriptor: &GateDescriptor) -> Result<Self> {
        Self::new(&descriptor.name, parse_settings(descriptor)?)
    }
}

impl Gate for ComplianceGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut RunContext, evidence: &mut EvidenceStore) -> GateOutput {
        let compliance = load_json_object(&ctx.project_path(&self.settings.compliance_file))?;

        let mut failures: Vec<&str> = self
            .settings
            .requirements
            .iter()
            .filter(|req| {
                !matches!(
                    compliance.get(&req.id).and_then(Value::as_str),
                    Some("approved") | Some("waived")
                )
            })
            .map(|req| req.id.as_str())
            .collect();

        let mut violations = ValidationResult::default();
        if !failures.is_empty() {
            failures.sort_unstable();
            violations.add_error(format!(
                "Compliance requirements not satisfied: {}",
                failures.join(", ")
            ));
        }
        ensure_valid(violations)?;

        let path = evidence.write_json(
            "compliance/compliance_report.json",
            &compliance,
            "compliance",
            "Compliance attestation snapshot",
        )?;
        Ok(GateResult::passed("Compliance requirements satisfied", vec![path]))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{descriptor, Fixture};
    use super::super::GateError;
    use super::*;
    use serde_json::json;

    fn testing(settings: Value) -> TestingGate {
        TestingGate::from_descriptor(&descriptor("testing", settings)).unwrap()
    }

    fn metrics(settings: Value) -> MetricsGate {
        MetricsGate::from_descriptor(&descriptor("metrics", settings)).unwrap()
    }

    fn compliance(settings: Value) -> ComplianceGate {
        ComplianceGate::from_descriptor(&descriptor("compliance", settings)).unwrap()
    }

    #[test]
    fn testing_passes_above_minimum() {
        let mut fx = Fixture::new();
        fx.write_json("test_results.json", json!({"status": "passed", "coverage": 91.5}));

        let result = testing(json!({"minimum_coverage": 80}))
            .execute(&mut fx.ctx, &mut fx.store)
            .unwrap();
        assert_eq!(result.evidence, vec!["testing/test_results.json"]);
    }

    #[test]
    fn testing_aggregates_status_and_coverage() {
        let mut fx = Fixture::new();
        fx.write_json("test_results.json", json!({"status": "failed", "coverage": "42"}));

        let err = testing(json!({"minimum_coverage": 80}))
            .execute(&mut fx.ctx, &mut fx.store)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Automated tests did not pass: failed; Coverage 42 below minimum threshold 80"
        );
    }

    #[test]
    fn testing_rejects_non_numeric_coverage() {
        let mut fx = Fixture::new();
        fx.write_json("test_results.json", json!({"status": "passed", "coverage": "lots"}));

        let err = testing(json!({})).execute(&mut fx.ctx, &mut fx.store).unwrap_err();
        assert!(matches!(
            err,
            GateError::Failed(ref m) if m == "field 'coverage' is not numeric: 'lots'"
        ));
    }

    #[test]
    fn testing_reports_status_with_non_numeric_coverage() {
        let mut fx = Fixture::new();
        fx.write_json("test_results.json", json!({"status": "failed", "coverage": "lots"}));

        let err = testing(json!({})).execute(&mut fx.ctx, &mut fx.store).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Automated tests did not pass: failed; field 'coverage' is not numeric: 'lots'"
        );
    }

    #[test]
    fn metrics_pass_within_thresholds() {
        let mut fx = Fixture::new();
        fx.write_json(
            "metrics_report.json",
            json!({"coverage": 85, "p95_latency_ms": 120, "critical_vulnerabilities": 0}),
        );

        let settings = json!({"minimum_coverage": 80, "maximum_latency_ms": 200});
        assert!(metrics(settings).execute(&mut fx.ctx, &mut fx.store).is_ok());
    }

    #[test]
    fn metrics_zero_latency_limit_is_unchecked() {
        let mut fx = Fixture::new();
        fx.write_json("metrics_report.json", json!({"p95_latency_ms": 99999}));

        assert!(metrics(json!({})).execute(&mut fx.ctx, &mut fx.store).is_ok());
    }

    #[test]
    fn metrics_aggregate_violations() {
        let mut fx = Fixture::new();
        fx.write_json(
            "metrics_report.json",
            json!({"coverage": 50, "p95_latency_ms": 350, "critical_vulnerabilities": 2}),
        );

        let settings = json!({
            "minimum_coverage": 80,
            "maximum_latency_ms": 200,
            "maximum_vulnerabilities": 1,
        });
        let err = metrics(settings).execute(&mut fx.ctx, &mut fx.store).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Coverage metric 50 below required threshold 80; \
             Performance latency 350 exceeds maximum allowed 200; \
             Detected 2 critical vulnerabilities (limit 1)"
        );
    }

    #[test]
    fn metrics_report_every_violation_alongside_non_numeric_fields() {
        let mut fx = Fixture::new();
        fx.write_json(
            "metrics_report.json",
            json!({"coverage": "n/a", "p95_latency_ms": 999, "critical_vulnerabilities": 5}),
        );

        let settings = json!({"maximum_latency_ms": 200, "maximum_vulnerabilities": 0});
        let err = metrics(settings).execute(&mut fx.ctx, &mut fx.store).unwrap_err();
        assert_eq!(
            err.to_string(),
            "field 'coverage' is not numeric: 'n/a'; \
             Performance latency 999 exceeds maximum allowed 200; \
             Detected 5 critical vulnerabilities (limit 0)"
        );
    }

    #[test]
    fn compliance_accepts_approved_and_waived() {
        let mut fx = Fixture::new();
        fx.write_json("compliance_report.json", json!({"SOC2": "approved", "GDPR": "waived"}));

        let settings = json!({"requirements": [{"id": "SOC2"}, {"id": "GDPR"}]});
        assert!(compliance(settings).execute(&mut fx.ctx, &mut fx.store).is_ok());
    }

    #[test]
    fn compliance_lists_failures_sorted() {
        let mut fx = Fixture::new();
        fx.write_json("compliance_report.json", json!({"SOC2": "pending", "A11Y": "approved"}));

        let settings = json!({"requirements": [{"id": "SOC2"}, {"id": "A11Y"}, {"id": "HIPAA"}]});
        let err = compliance(settings).execute(&mut fx.ctx, &mut fx.store).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Compliance requirements not satisfied: HIPAA, SOC2"
        );
    }

    #[test]
    fn compliance_requirement_without_id_is_config_error() {
        let err = ComplianceGate::from_descriptor(&descriptor(
            "compliance",
            json!({"requirements": [{"id": ""}]}),
        ))
        .err()
        .unwrap();
        assert!(err.is_config());
    }
}
