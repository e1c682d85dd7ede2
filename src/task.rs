//! Task collections and task graph validation.
//!
//! A task collection is either a flat list of task objects, a mapping from
//! lane name to a list of task objects, or an object with a `tasks` list.
//! The validator checks id uniqueness, `blocked_by` references, enumerated
//! fields and acyclicity, and always reports every problem it finds.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::ValidationResult;
use crate::error::Error;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Not started.
    Pending,
    /// Being worked on.
    InProgress,
    /// Waiting on something outside the plan.
    Blocked,
    /// Done.
    Completed,
    /// Dropped from the plan.
    Cancelled,
}

impl TaskState {
    /// All states, sorted by name.
    pub const ALL: [TaskState; 5] = [
        TaskState::Blocked,
        TaskState::Cancelled,
        TaskState::Completed,
        TaskState::InProgress,
        TaskState::Pending,
    ];

    /// Returns the serialized name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::InProgress => "in_progress",
            TaskState::Blocked => "blocked",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("invalid state '{}'", s))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persona responsible for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Persona {
    /// Wires components and environments together.
    SystemIntegrator,
    /// Owns structure and interfaces.
    CodeArchitect,
    /// Owns verification.
    Qa,
}

impl Persona {
    /// All personas, sorted by name.
    pub const ALL: [Persona; 3] = [Persona::CodeArchitect, Persona::Qa, Persona::SystemIntegrator];

    /// Returns the serialized name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::SystemIntegrator => "system-integrator",
            Persona::CodeArchitect => "code-architect",
            Persona::Qa => "qa",
        }
    }
}

impl FromStr for Persona {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Persona::ALL
            .into_iter()
            .find(|persona| persona.as_str() == s)
            .ok_or_else(|| format!("invalid persona '{}'", s))
    }
}

/// A task record as found in a task artifact.
///
/// Enumerated fields are kept as raw strings so that invalid values can be
/// reported rather than rejected at parse time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier; empty when the record has none.
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    /// Task title; empty when the record has none.
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    /// Free-form area classification.
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub area: Option<String>,
    /// Persona, expected to be one of [`Persona::ALL`].
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub persona: Option<String>,
    /// State, expected to be one of [`TaskState::ALL`].
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<String>,
    /// Ids of tasks that must complete before this one.
    #[serde(default, alias = "dependencies", deserialize_with = "string_or_list")]
    pub blocked_by: Vec<String>,
    /// Topic tags.
    #[serde(default, deserialize_with = "string_tags")]
    pub tags: Vec<String>,
}

impl Task {
    /// Creates a new task with the given id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Sets the dependencies.
    pub fn with_blocked_by(mut self, deps: Vec<String>) -> Self {
        self.blocked_by = deps;
        self
    }

    /// Sets the state.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Sets the persona.
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Parses the state, if present.
    pub fn parsed_state(&self) -> Option<Result<TaskState, String>> {
        self.state.as_deref().map(str::parse)
    }

    /// Parses the persona, if present.
    pub fn parsed_persona(&self) -> Option<Result<Persona, String>> {
        self.persona.as_deref().map(str::parse)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(&value).unwrap_or_default())
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(&value))
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    Ok(items
        .iter()
        .filter_map(scalar_to_string)
        .filter(|s| !s.is_empty())
        .collect())
}

fn string_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Value::String(s) => vec![s],
        _ => Vec::new(),
    })
}

/// Extracts task records from a task artifact.
///
/// Accepts a flat list, an object with a `tasks` list, or a lane map of
/// lists. Entries that are not objects are ignored.
pub fn collect_tasks(root: &Value) -> serde_json::Result<Vec<Task>> {
    let entries: Vec<&Value> = match root {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get("tasks") {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => map
                .values()
                .filter_map(Value::as_array)
                .flatten()
                .collect(),
        },
        _ => Vec::new(),
    };

    entries
        .into_iter()
        .filter(|v| v.is_object())
        .map(|v| Task::deserialize(v))
        .collect()
}

/// Loads a task artifact from disk and validates it.
///
/// An unreadable file, invalid JSON or a file with no task records is an
/// error rather than a report.
pub fn validate_task_file(path: &Path) -> crate::error::Result<TaskGraphReport> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("input not found: {} ({})", path.display(), e)))?;
    let root: Value = serde_json::from_str(&text)
        .map_err(|e| Error::Config(format!("failed to parse JSON: {}", e)))?;
    let tasks = collect_tasks(&root)?;
    if tasks.is_empty() {
        return Err(Error::Config(
            "no tasks found in input (expect list or dict-of-lists)".to_string(),
        ));
    }
    Ok(validate_tasks(&tasks))
}

/// Outcome of validating a task collection.
#[derive(Debug, Clone, Default)]
pub struct TaskGraphReport {
    /// Every individual problem found.
    pub validation: ValidationResult,
    /// Topological order of task ids; complete only when the graph is acyclic.
    pub order: Vec<String>,
    /// Number of task records inspected.
    pub task_count: usize,
}

impl TaskGraphReport {
    /// Returns true if every check passed.
    pub fn is_valid(&self) -> bool {
        self.validation.is_valid()
    }

    /// Returns the individual error strings.
    pub fn errors(&self) -> &[String] {
        &self.validation.errors
    }
}

/// Message reported when the blocking relation contains a cycle.
pub const CYCLE_ERROR: &str = "cycle detected in tasks graph (topological sort incomplete)";

/// Validates the structural integrity of a task collection.
pub fn validate_tasks(tasks: &[Task]) -> TaskGraphReport {
    let mut result = ValidationResult::default();

    // Ids, in first-seen order.
    let mut ids: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut duplicates: Vec<&str> = Vec::new();
    for task in tasks {
        let id = task.id.trim();
        if id.is_empty() {
            result.add_error("task missing id");
            continue;
        }
        if seen.insert(id) {
            ids.push(id);
        } else if !duplicates.contains(&id) {
            duplicates.push(id);
        }
    }
    if !duplicates.is_empty() {
        duplicates.sort_unstable();
        result.add_error(format!("duplicate task ids: {}", duplicates.join(", ")));
    }

    for task in tasks {
        for dep in &task.blocked_by {
            if !seen.contains(dep.as_str()) {
                result.add_error(format!(
                    "{}: blocked_by references unknown id '{}'",
                    task.id, dep
                ));
            }
        }
    }

    for task in tasks {
        if let Some(Err(e)) = task.parsed_state() {
            let allowed: Vec<_> = TaskState::ALL.iter().map(TaskState::as_str).collect();
            result.add_error(format!("{}: {} (allowed: {})", task.id, e, allowed.join(", ")));
        }
        if let Some(Err(e)) = task.parsed_persona() {
            let allowed: Vec<_> = Persona::ALL.iter().map(Persona::as_str).collect();
            result.add_error(format!("{}: {} (allowed: {})", task.id, e, allowed.join(", ")));
        }
    }

    // Edges run dependency -> dependent.
    let mut indegree: HashMap<&str, usize> = ids.iter().map(|&id| (id, 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in tasks {
        let id = task.id.trim();
        if !seen.contains(id) {
            continue;
        }
        for dep in &task.blocked_by {
            if seen.contains(dep.as_str()) {
                dependents.entry(dep.as_str()).or_default().push(id);
                *indegree.entry(id).or_default() += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = ids
        .iter()
        .copied()
        .filter(|id| indegree.get(id) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(ids.len());
    while let Some(node) = queue.pop_front() {
        order.push(node.to_string());
        for &next in dependents.get(node).map(Vec::as_slice).unwrap_or_default() {
            if let Some(degree) = indegree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    if order.len() < ids.len() {
        result.add_error(CYCLE_ERROR);
    }

    TaskGraphReport {
        validation: result,
        order,
        task_count: tasks.len(),
    }
}
