//! Task documents and status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::artifact::{Artifact, set_metadata_path};
use super::{ValidationError, parse_scalar};

/// Status of a task.
///
/// `Pending`, `InProgress`, `Completed`, and `Abandoned` form the lifecycle
/// driven by the engine. `NeedsReview`, `Paused`, and `Failed` are reported
/// by worker agents through the task document and read back by the
/// coordinator after the subprocess exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    NeedsReview,
    Paused,
    Failed,
    Completed,
    Abandoned,
}

impl TaskStatus {
    /// Terminal statuses: no further work happens on the task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Abandoned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::NeedsReview => "needs_review",
            TaskStatus::Paused => "paused",
            TaskStatus::Failed => "failed",
            TaskStatus::Completed => "completed",
            TaskStatus::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "needs_review" => Ok(TaskStatus::NeedsReview),
            "paused" => Ok(TaskStatus::Paused),
            "failed" => Ok(TaskStatus::Failed),
            "completed" => Ok(TaskStatus::Completed),
            "abandoned" => Ok(TaskStatus::Abandoned),
            _ => Err(ValidationError::new(
                "status",
                &format!(
                    "invalid task status {s:?}; valid: pending, in_progress, needs_review, paused, failed, completed, abandoned"
                ),
            )),
        }
    }
}

/// A unit of work within a task-supporting phase.
///
/// The per-task document under `phases/<phase>/tasks/<id>/state.yaml` is the
/// authoritative copy; the task list on the owning phase is a derived index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Gap-numbered id: `010`, `020`, ... Stable for the task's lifetime.
    pub id: String,
    pub name: String,
    /// Name of the owning phase.
    pub phase: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// 1-based; incremented on feedback-driven rework.
    #[serde(default = "default_iteration")]
    pub iteration: u32,
    /// Logical agent role the task is assigned to (e.g. `implementer`).
    pub assigned_agent: String,
    /// Stable identifier for a resumable agent conversation. Set by the
    /// coordinator before the first spawn, immutable until the task reaches
    /// a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_yaml::Value>,
    /// Ids of tasks that must complete before this one starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Whether the task may run alongside its siblings.
    #[serde(default)]
    pub parallel: bool,
}

fn default_iteration() -> u32 {
    1
}

impl Task {
    pub fn new(id: &str, name: &str, phase: &str, assigned_agent: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            phase: phase.to_string(),
            status: TaskStatus::Pending,
            iteration: 1,
            assigned_agent: assigned_agent.to_string(),
            session_id: None,
            created_at: now,
            updated_at: now,
            inputs: Vec::new(),
            outputs: Vec::new(),
            metadata: BTreeMap::new(),
            dependencies: Vec::new(),
            parallel: false,
        }
    }

    /// Write a field by dot path. Direct fields: `status`, `name`,
    /// `iteration`, `assigned_agent`, `parallel`, `dependencies` (comma
    /// separated). Managed fields (`id`, `phase`, `session_id`, timestamps,
    /// artifact lists) are rejected; anything else routes to `metadata`.
    pub fn set_field(&mut self, field_path: &str, value: &str) -> Result<(), ValidationError> {
        let segments: Vec<&str> = field_path.split('.').collect();
        match segments[0] {
            "status" if segments.len() == 1 => {
                self.status = value.parse()?;
                Ok(())
            }
            "name" if segments.len() == 1 => {
                self.name = value.to_string();
                Ok(())
            }
            "iteration" if segments.len() == 1 => {
                self.iteration = value.parse().map_err(|_| {
                    ValidationError::new("iteration", &format!("expected an integer, got {value:?}"))
                })?;
                Ok(())
            }
            "assigned_agent" if segments.len() == 1 => {
                self.assigned_agent = value.to_string();
                Ok(())
            }
            "parallel" if segments.len() == 1 => {
                self.parallel = value.parse().map_err(|_| {
                    ValidationError::new("parallel", &format!("expected true or false, got {value:?}"))
                })?;
                Ok(())
            }
            "dependencies" if segments.len() == 1 => {
                self.dependencies = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                Ok(())
            }
            "id" | "phase" | "session_id" | "created_at" | "updated_at" | "inputs" | "outputs" => {
                Err(ValidationError::new(
                    segments[0],
                    "field is managed by the engine and cannot be set directly",
                ))
            }
            "metadata" => {
                if segments.len() < 2 {
                    return Err(ValidationError::new(
                        field_path,
                        "metadata writes need a key, e.g. metadata.notes",
                    ));
                }
                set_metadata_path(&mut self.metadata, &segments[1..], parse_scalar(value));
                Ok(())
            }
            _ => {
                set_metadata_path(&mut self.metadata, &segments, parse_scalar(value));
                Ok(())
            }
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Allocate the next gap-numbered task id: `old_max + 10`, first `010`.
pub fn next_task_id(existing: &[Task]) -> String {
    let max = existing
        .iter()
        .filter_map(|t| t.id.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{:03}", max + 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::NeedsReview,
            TaskStatus::Paused,
            TaskStatus::Failed,
            TaskStatus::Completed,
            TaskStatus::Abandoned,
        ] {
            let parsed: TaskStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Abandoned.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
        assert!(!TaskStatus::NeedsReview.is_terminal());
    }

    #[test]
    fn gap_numbering_starts_at_010() {
        assert_eq!(next_task_id(&[]), "010");
    }

    #[test]
    fn gap_numbering_steps_by_ten() {
        let tasks = vec![
            Task::new("010", "a", "implementation", "implementer"),
            Task::new("020", "b", "implementation", "implementer"),
        ];
        assert_eq!(next_task_id(&tasks), "030");
    }

    #[test]
    fn set_field_direct_and_metadata() {
        let mut task = Task::new("010", "wire up auth", "implementation", "implementer");
        task.set_field("status", "in_progress").unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);

        task.set_field("iteration", "2").unwrap();
        assert_eq!(task.iteration, 2);

        task.set_field("notes", "blocked on schema").unwrap();
        assert_eq!(
            task.metadata.get("notes"),
            Some(&serde_yaml::Value::from("blocked on schema"))
        );
    }

    #[test]
    fn set_field_rejects_managed_fields() {
        let mut task = Task::new("010", "a", "implementation", "implementer");
        assert!(task.set_field("id", "020").is_err());
        assert!(task.set_field("session_id", "xyz").is_err());
        assert!(task.set_field("phase", "review").is_err());
    }

    #[test]
    fn set_field_dependencies_comma_list() {
        let mut task = Task::new("030", "a", "implementation", "implementer");
        task.set_field("dependencies", "010, 020").unwrap();
        assert_eq!(task.dependencies, vec!["010", "020"]);
    }

    #[test]
    fn serialization_skips_empty_collections() {
        let task = Task::new("010", "a", "implementation", "implementer");
        let yaml = serde_yaml::to_string(&task).unwrap();
        assert!(!yaml.contains("session_id"));
        assert!(!yaml.contains("inputs"));
        assert!(!yaml.contains("dependencies"));
    }
}
