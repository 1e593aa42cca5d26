//! The project document (`state.yaml`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::artifact::{Artifact, set_metadata_path};
use super::phase::Phase;
use super::task::Task;
use super::{ValidationError, parse_scalar};

/// Current position in the project type's state machine. `current_state` is
/// only ever mutated by `advance`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Statechart {
    pub current_state: String,
    pub updated_at: DateTime<Utc>,
}

/// The persisted project document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectState {
    pub name: String,
    /// Project-type identifier; must be registered at load time.
    #[serde(rename = "type")]
    pub project_type: String,
    /// Source-control branch the project works on.
    pub branch: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub statechart: Statechart,
    pub phases: BTreeMap<String, Phase>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_yaml::Value>,
    /// Registered artifacts exposed as inputs to downstream projects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Artifact>,
}

impl ProjectState {
    pub fn new(name: &str, project_type: &str, branch: &str, description: &str, initial_state: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            project_type: project_type.to_string(),
            branch: branch.to_string(),
            description: description.to_string(),
            created_at: now,
            updated_at: now,
            statechart: Statechart {
                current_state: initial_state.to_string(),
                updated_at: now,
            },
            phases: BTreeMap::new(),
            metadata: BTreeMap::new(),
            outputs: Vec::new(),
        }
    }

    pub fn current_state(&self) -> &str {
        &self.statechart.current_state
    }

    pub fn phase(&self, name: &str) -> Result<&Phase, ValidationError> {
        self.phases
            .get(name)
            .ok_or_else(|| ValidationError::new("phase", &format!("unknown phase {name:?}")))
    }

    pub fn phase_mut(&mut self, name: &str) -> Result<&mut Phase, ValidationError> {
        self.phases
            .get_mut(name)
            .ok_or_else(|| ValidationError::new("phase", &format!("unknown phase {name:?}")))
    }

    /// Find a task by id across all phases.
    pub fn find_task(&self, id: &str) -> Option<&Task> {
        self.phases.values().find_map(|p| p.task(id))
    }

    /// Write a field by dot path. Direct fields: `description`, `branch`.
    /// Managed fields are rejected; anything else routes to `metadata`.
    pub fn set_field(&mut self, field_path: &str, value: &str) -> Result<(), ValidationError> {
        let segments: Vec<&str> = field_path.split('.').collect();
        match segments[0] {
            "description" if segments.len() == 1 => {
                self.description = value.to_string();
                Ok(())
            }
            "branch" if segments.len() == 1 => {
                self.branch = value.to_string();
                Ok(())
            }
            "name" | "type" | "created_at" | "updated_at" | "statechart" | "phases" | "outputs" => {
                Err(ValidationError::new(
                    segments[0],
                    "field is managed by the engine and cannot be set directly",
                ))
            }
            "metadata" => {
                if segments.len() < 2 {
                    return Err(ValidationError::new(
                        field_path,
                        "metadata writes need a key, e.g. metadata.issue",
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
