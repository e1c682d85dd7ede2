//! End-to-end workflow runs against temporary project directories.
//!
//! Run with: `cargo test --test workflow_integration`

use std::path::Path;

use serde_json::{json, Value};
use tempfile::TempDir;
use workflow_gates::{
    run_workflow, verify_manifest, Error, GateDescriptor, GateStatus, Orchestrator,
    RunConfiguration, MANIFEST_NAME,
};

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

fn seed_project(root: &Path) {
    write(root, "metadata.json", r#"{"name": "demo", "owner": "ops"}"#);
    write(root, "brief.md", "# Brief\nShip the demo.");
    write(root, "PLAN.md", "# Plan");
    write(
        root,
        "PLAN.tasks.json",
        &json!({"tasks": [
            {"id": "T1", "title": "Scaffold", "tags": ["infra"]},
            {"id": "T2", "title": "Test", "tags": ["qa"], "blocked_by": ["T1"]},
        ]})
        .to_string(),
    );
}

#[test]
fn missing_tool_halts_before_planning() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    seed_project(root);
    write(
        root,
        "workflow/gate_controller.yaml",
        r#"
evidence_root: evidence
gates:
  - name: Intake
    implementation: gates.implementations.IntakeGate
    settings:
      required_fields: [name, owner]
  - name: Environment
    implementation: environment
    settings:
      required_tools:
        - name: no-such-tool-9c1e
  - name: Planning
    implementation: planning
"#,
    );

    let err = run_workflow(&root.join("workflow/gate_controller.yaml"), root).unwrap_err();
    match &err {
        Error::GateFailed { gate, reason } => {
            assert_eq!(gate, "Environment");
            assert_eq!(reason, "Environment checks failed for: no-such-tool-9c1e");
        }
        other => panic!("expected gate failure, got {other:?}"),
    }

    let report = read_json(&root.join("evidence/gates/gates_report.json"));
    let results = report["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["name"], "Intake");
    assert_eq!(results[0]["status"], "passed");
    assert_eq!(results[1]["name"], "Environment");
    assert_eq!(results[1]["status"], "failed");

    assert!(root.join("evidence/intake/metadata_snapshot.json").exists());
    assert!(!root.join("evidence/planning").exists());
    assert!(root.join("evidence").join(MANIFEST_NAME).exists());
}

#[test]
fn later_gates_never_run_after_a_failure() {
    for failing in 0..3 {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        seed_project(root);

        // Gate `failing` points at a file that does not exist.
        let gates: Vec<GateDescriptor> = (0..3)
            .map(|i| {
                let plan = if i == failing { "MISSING.md" } else { "PLAN.md" };
                GateDescriptor::new(format!("Planning{i}"), "planning")
                    .with_settings(json!({"plan_file": plan}))
            })
            .collect();

        let err = Orchestrator::new(RunConfiguration::new(gates), root)
            .run()
            .unwrap_err();
        assert!(err.is_gate_failure());

        let report = read_json(&root.join("evidence/gates/gates_report.json"));
        let results = report["results"].as_array().unwrap();
        assert_eq!(results.len(), failing + 1);
        assert_eq!(results[failing]["status"], "failed");
        assert!(results[..failing].iter().all(|r| r["status"] == "passed"));
    }
}

#[test]
fn successful_run_manifest_matches_files() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    seed_project(root);

    let config = RunConfiguration::new(vec![
        GateDescriptor::new("Intake", "IntakeGate"),
        GateDescriptor::new("Planning", "PlanningGate")
            .with_settings(json!({"required_topics": ["INFRA", "qa"]})),
        GateDescriptor::new("Graph", "TaskGraphGate"),
    ]);

    let report = Orchestrator::new(config, root).run().unwrap();
    assert_eq!(report.outcomes.len(), 3);
    assert!(report.outcomes.iter().all(|o| o.status == GateStatus::Passed));

    let evidence_root = root.join("evidence");
    let manifest = read_json(&report.manifest_path);
    let paths: Vec<&str> = manifest
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["path"].as_str().unwrap())
        .collect();
    assert_eq!(
        paths,
        vec![
            "gates/gates_report.json",
            "intake/brief_excerpt.md",
            "intake/metadata_snapshot.json",
            "planning/task_graph_validation.json",
            "planning/tasks_snapshot.json",
        ]
    );
    assert!(verify_manifest(&evidence_root, MANIFEST_NAME).unwrap().is_empty());

    std::fs::write(evidence_root.join("intake/brief_excerpt.md"), "tampered").unwrap();
    let mismatches = verify_manifest(&evidence_root, MANIFEST_NAME).unwrap();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].path, "intake/brief_excerpt.md");
}

#[test]
fn empty_gate_list_is_a_config_error() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "workflow.json", r#"{"gates": []}"#);

    let err = run_workflow(&temp.path().join("workflow.json"), temp.path()).unwrap_err();
    assert!(err.is_config());
    assert!(!temp.path().join("evidence").exists());
}

#[test]
fn missing_config_file_is_a_config_error() {
    let temp = TempDir::new().unwrap();
    let err = run_workflow(&temp.path().join("nope.yaml"), temp.path()).unwrap_err();
    assert!(err.is_config());
}

fn environment_config(version_output: &str) -> RunConfiguration {
    RunConfiguration::new(vec![GateDescriptor::new("Environment", "environment")
        .with_settings(json!({
            "required_tools": [{
                "name": "fake",
                "command": "sh",
                "min_version": "2.0.0",
                "version_command": format!("echo {version_output}"),
            }]
        }))])
}

#[test]
fn tool_below_minimum_version_fails() {
    let temp = TempDir::new().unwrap();
    let err = Orchestrator::new(environment_config("fake 1.9.9"), temp.path())
        .run()
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "workflow halted at gate 'Environment': \
         Environment checks failed for: fake >= 2.0.0 (found 1.9.9)"
    );
}

#[test]
fn tool_above_minimum_version_passes() {
    let temp = TempDir::new().unwrap();
    let report = Orchestrator::new(environment_config("fake 2.0.1"), temp.path())
        .run()
        .unwrap();
    assert_eq!(report.outcomes[0].evidence, vec!["environment/tool_report.json"]);

    let tools = read_json(&temp.path().join("evidence/environment/tool_report.json"));
    assert_eq!(tools["tools"][0]["version"], "2.0.1");
    assert_eq!(tools["tools"][0]["status"], "available");
}
