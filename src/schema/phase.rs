//! Phase documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::artifact::{Artifact, set_metadata_path};
use super::task::Task;
use super::{ValidationError, parse_scalar};

/// Phase statuses the runtime writes through phase side-effects. The schema
/// does not constrain the value space; project types may use their own.
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

/// A workflow stage owning artifacts and, when the project type allows it,
/// tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    pub name: String,
    pub status: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Artifact>,
    /// Derived index; the per-task documents on disk are authoritative.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<Task>,
}

fn default_enabled() -> bool {
    true
}

impl Phase {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            status: STATUS_PENDING.to_string(),
            enabled: true,
            created_at: now,
            updated_at: now,
            metadata: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Write a field by dot path. Direct fields: `status`, `enabled`.
    /// Managed fields are rejected; anything else routes to `metadata`.
    pub fn set_field(&mut self, field_path: &str, value: &str) -> Result<(), ValidationError> {
        let segments: Vec<&str> = field_path.split('.').collect();
        match segments[0] {
            "status" if segments.len() == 1 => {
                self.status = value.to_string();
                Ok(())
            }
            "enabled" if segments.len() == 1 => {
                self.enabled = value.parse().map_err(|_| {
                    ValidationError::new("enabled", &format!("expected true or false, got {value:?}"))
                })?;
                Ok(())
            }
            "name" | "created_at" | "updated_at" | "inputs" | "outputs" | "tasks" => {
                Err(ValidationError::new(
                    segments[0],
                    "field is managed by the engine and cannot be set directly",
                ))
            }
            "metadata" => {
                if segments.len() < 2 {
                    return Err(ValidationError::new(
                        field_path,
                        "metadata writes need a key, e.g. metadata.owner",
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

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// First output of the given artifact type, if any.
    pub fn find_output(&self, kind: &str) -> Option<&Artifact> {
        self.outputs.iter().find(|a| a.kind == kind)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
