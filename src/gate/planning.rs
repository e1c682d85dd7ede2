//! Planning gates: plan document coverage and task graph integrity.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    ensure_valid, load_json, parse_settings, BuildGate, Gate, GateError, GateOutput, GateResult,
};
use crate::config::{GateDescriptor, ValidationResult};
use crate::context::RunContext;
use crate::error::Result;
use crate::evidence::EvidenceStore;
use crate::task::{collect_tasks, validate_tasks, Task};

fn default_plan_file() -> String {
    "PLAN.md".to_string()
}

fn default_tasks_file() -> String {
    "PLAN.tasks.json".to_string()
}

/// Settings for [`PlanningGate`].
#[derive(Debug, Clone, Deserialize)]
pub struct PlanningSettings {
    #[serde(default = "default_plan_file")]
    pub plan_file: String,
    #[serde(default = "default_tasks_file")]
    pub tasks_file: String,
    /// Topics that must appear among task tags, compared case-insensitively.
    #[serde(default)]
    pub required_topics: Vec<String>,
}

impl Default for PlanningSettings {
    fn default() -> Self {
        Self {
            plan_file: default_plan_file(),
            tasks_file: default_tasks_file(),
            required_topics: Vec::new(),
        }
    }
}

/// Settings for [`TaskGraphGate`].
#[derive(Debug, Clone, Deserialize)]
pub struct TaskGraphSettings {
    #[serde(default = "default_tasks_file")]
    pub tasks_file: String,
}

impl Default for TaskGraphSettings {
    fn default() -> Self {
        Self {
            tasks_file: default_tasks_file(),
        }
    }
}

fn load_tasks(
    ctx: &RunContext,
    tasks_file: &str,
) -> std::result::Result<(Value, Vec<Task>), GateError> {
    let path = ctx.project_path(tasks_file);
    let data = load_json(&path)?;
    let tasks = collect_tasks(&data).map_err(|e| {
        GateError::Failed(format!("invalid task records in {}: {}", path.display(), e))
    })?;
    Ok((data, tasks))
}

/// Checks the plan document and the coverage of its task list.
pub struct PlanningGate {
    name: String,
    settings: PlanningSettings,
}

impl PlanningGate {
    pub fn new(name: impl Into<String>, settings: PlanningSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

impl BuildGate for PlanningGate {
    fn from_descriptor(descriptor: &GateDescriptor) -> Result<Self> {
        Ok(Self::new(&descriptor.name, parse_settings(descriptor)?))
    }
}

impl Gate for PlanningGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut RunContext, evidence: &mut EvidenceStore) -> GateOutput {
        let plan_path = ctx.project_path(&self.settings.plan_file);
        if !plan_path.is_file() {
            return Err(GateError::Failed(format!(
                "Planning document missing: {}",
                plan_path.display()
            )));
        }

        let (data, tasks) = load_tasks(ctx, &self.settings.tasks_file)?;
        if tasks.is_empty() {
            return Err(GateError::Failed(
                "Task plan must include a non-empty 'tasks' array".to_string(),
            ));
        }

        let mut violations = ValidationResult::default();
        let incomplete = tasks
            .iter()
            .filter(|t| t.id.is_empty() || t.title.is_empty())
            .count();
        if incomplete > 0 {
            violations.add_error(format!(
                "{} task(s) missing 'id' or 'title'",
                incomplete
            ));
        }

        let covered: HashSet<String> = tasks
            .iter()
            .flat_map(|t| t.tags.iter().map(|tag| tag.to_lowercase()))
            .collect();
        let missing: Vec<&str> = self
            .settings
            .required_topics
            .iter()
            .filter(|topic| !covered.contains(&topic.to_lowercase()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            violations.add_error(format!(
                "Planning artifacts missing coverage for topics: {}",
                missing.join(", ")
            ));
        }
        ensure_valid(violations)?;

        let path = evidence.write_json(
            "planning/tasks_snapshot.json",
            &data,
            "planning",
            "Task plan snapshot",
        )?;
        Ok(GateResult::passed("Planning artifacts validated", vec![path]))
    }
}

/// Validates the task graph: unique ids, known references, valid enums, no cycles.
pub struct TaskGraphGate {
    name: String,
    settings: TaskGraphSettings,
}

impl TaskGraphGate {
    pub fn new(name: impl Into<String>, settings: TaskGraphSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

impl BuildGate for TaskGraphGate {
    fn from_descriptor(descriptor: &GateDescriptor) -> Result<Self> {
        Ok(Self::new(&descriptor.name, parse_settings(descriptor)?))
    }
}

impl Gate for TaskGraphGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut RunContext, evidence: &mut EvidenceStore) -> GateOutput {
        let (_, tasks) = load_tasks(ctx, &self.settings.tasks_file)?;
        let report = validate_tasks(&tasks);
        ensure_valid(report.validation)?;

        tracing::debug!(tasks = report.task_count, "task graph is acyclic");
        let path = evidence.write_json(
            "planning/task_graph_validation.json",
            &json!({
                "validated_tasks": report.task_count,
                "order": report.order,
            }),
            "planning",
            "Task graph validation report",
        )?;
        Ok(GateResult::passed("Task graph validated", vec![path]))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{descriptor, Fixture};
    use super::*;

    fn planning(settings: Value) -> PlanningGate {
        PlanningGate::from_descriptor(&descriptor("planning", settings)).unwrap()
    }

    fn task_graph() -> TaskGraphGate {
        TaskGraphGate::from_descriptor(&descriptor("task_graph", json!({}))).unwrap()
    }

    #[test]
    fn planning_passes_with_covered_topics() {
        let mut fx = Fixture::new();
        fx.write("PLAN.md", "# Plan");
        fx.write_json(
            "PLAN.tasks.json",
            json!({"tasks": [
                {"id": "T1", "title": "Set up CI", "tags": ["Infra"]},
                {"id": "T2", "title": "Write tests", "tags": ["qa", 7]},
            ]}),
        );

        let result = planning(json!({"required_topics": ["infra", "QA"]}))
            .execute(&mut fx.ctx, &mut fx.store)
            .unwrap();
        assert_eq!(result.evidence, vec!["planning/tasks_snapshot.json"]);
    }

    #[test]
    fn planning_fails_without_plan_document() {
        let mut fx = Fixture::new();
        fx.write_json("PLAN.tasks.json", json!({"tasks": [{"id": "T1", "title": "x"}]}));

        let err = planning(json!({})).execute(&mut fx.ctx, &mut fx.store).unwrap_err();
        assert!(err.to_string().starts_with("Planning document missing"));
    }

    #[test]
    fn planning_fails_on_empty_task_list() {
        let mut fx = Fixture::new();
        fx.write("PLAN.md", "# Plan");
        fx.write_json("PLAN.tasks.json", json!({"tasks": []}));

        let err = planning(json!({})).execute(&mut fx.ctx, &mut fx.store).unwrap_err();
        assert!(err.to_string().contains("non-empty 'tasks' array"));
    }

    #[test]
    fn planning_aggregates_incomplete_tasks_and_topics() {
        let mut fx = Fixture::new();
        fx.write("PLAN.md", "# Plan");
        fx.write_json(
            "PLAN.tasks.json",
            json!({"tasks": [{"id": "T1"}, {"title": "orphan", "tags": ["infra"]}]}),
        );

        let err = planning(json!({"required_topics": ["infra", "security", "qa"]}))
            .execute(&mut fx.ctx, &mut fx.store)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "2 task(s) missing 'id' or 'title'; \
             Planning artifacts missing coverage for topics: security, qa"
        );
        assert!(fx.store.records().is_empty());
    }

    #[test]
    fn task_graph_records_order() {
        let mut fx = Fixture::new();
        fx.write_json(
            "PLAN.tasks.json",
            json!({"tasks": [
                {"id": "B", "title": "b", "blocked_by": ["A"]},
                {"id": "A", "title": "a"},
            ]}),
        );

        task_graph().execute(&mut fx.ctx, &mut fx.store).unwrap();
        let report: Value = serde_json::from_slice(
            &std::fs::read(fx.store.root().join("planning/task_graph_validation.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(report, json!({"order": ["A", "B"], "validated_tasks": 2}));
    }

    #[test]
    fn task_graph_reports_every_problem() {
        let mut fx = Fixture::new();
        fx.write_json(
            "PLAN.tasks.json",
            json!({"tasks": [
                {"id": "A", "title": "a", "dependencies": ["B"]},
                {"id": "B", "title": "b", "dependencies": ["A", "Z"]},
            ]}),
        );

        let err = task_graph().execute(&mut fx.ctx, &mut fx.store).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("B: blocked_by references unknown id 'Z'"));
        assert!(message.contains(crate::task::CYCLE_ERROR));
    }
}
