//! Typed definitions of the persisted documents and their validation.
//!
//! This module provides:
//! - `ProjectState`, `Phase`, `Task`, `Artifact` serde types
//! - `ValidationError` with the offending field path
//! - `validate_document` for the config-independent invariants
//!
//! Validation against a specific project type (declared states, allowed
//! artifact types, task support) lives on `ProjectTypeConfig`.

pub mod artifact;
pub mod phase;
pub mod project;
pub mod task;

pub use artifact::{Artifact, validate_artifact_path};
pub use phase::Phase;
pub use project::{ProjectState, Statechart};
pub use task::{Task, TaskStatus, next_task_id};

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use thiserror::Error;

/// Schema or artifact-type rejection, reported with the field path.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

fn task_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{3,}$").expect("valid regex"))
}

/// Config-independent invariants over a project document:
/// task ids well-formed, unique, sorted in creation order, and owned by the
/// right phase; artifact paths relative and inside the project root.
pub fn validate_document(state: &ProjectState) -> Result<(), ValidationError> {
    for (name, phase) in &state.phases {
        if &phase.name != name {
            return Err(ValidationError::new(
                &format!("phases.{name}.name"),
                &format!("phase name {:?} does not match its key", phase.name),
            ));
        }

        for (dir, artifacts) in [("inputs", &phase.inputs), ("outputs", &phase.outputs)] {
            for (i, artifact) in artifacts.iter().enumerate() {
                validate_artifact_path(&artifact.path).map_err(|m| {
                    ValidationError::new(&format!("phases.{name}.{dir}[{i}].path"), &m)
                })?;
            }
        }

        let mut seen = BTreeSet::new();
        let mut previous: Option<&str> = None;
        for task in &phase.tasks {
            let field = format!("phases.{name}.tasks[{}]", task.id);
            if !task_id_pattern().is_match(&task.id) {
                return Err(ValidationError::new(
                    &field,
                    &format!("task id {:?} must match ^[0-9]{{3,}}$", task.id),
                ));
            }
            if !seen.insert(task.id.as_str()) {
                return Err(ValidationError::new(
                    &field,
                    &format!("duplicate task id {:?}", task.id),
                ));
            }
            if let Some(prev) = previous
                && prev >= task.id.as_str()
            {
                return Err(ValidationError::new(
                    &field,
                    &format!("task ids out of order: {:?} after {:?}", task.id, prev),
                ));
            }
            previous = Some(&task.id);

            if task.phase != *name {
                return Err(ValidationError::new(
                    &field,
                    &format!("task claims phase {:?} but lives in {name:?}", task.phase),
                ));
            }

            for (dir, artifacts) in [("inputs", &task.inputs), ("outputs", &task.outputs)] {
                for (i, artifact) in artifacts.iter().enumerate() {
                    validate_artifact_path(&artifact.path).map_err(|m| {
                        ValidationError::new(&format!("{field}.{dir}[{i}].path"), &m)
                    })?;
                }
            }
        }
    }

    for (i, artifact) in state.outputs.iter().enumerate() {
        validate_artifact_path(&artifact.path)
            .map_err(|m| ValidationError::new(&format!("outputs[{i}].path"), &m))?;
    }

    Ok(())
}

/// Parse a CLI-supplied scalar the way YAML would: booleans, integers, and
/// floats become typed values, everything else stays a string.
pub fn parse_scalar(value: &str) -> serde_yaml::Value {
    match value {
        "true" => return serde_yaml::Value::Bool(true),
        "false" => return serde_yaml::Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = value.parse::<i64>() {
        return serde_yaml::Value::from(n);
    }
    if let Ok(f) = value.parse::<f64>() {
        return serde_yaml::Value::from(f);
    }
    serde_yaml::Value::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with_task(id: &str) -> ProjectState {
        let mut state =
            ProjectState::new("auth", "standard", "feat/auth", "", "ImplementationPlanning");
        let mut phase = Phase::new("implementation");
        phase.tasks.push(Task::new(id, "first", "implementation", "implementer"));
        state.phases.insert("implementation".into(), phase);
        state
    }

    #[test]
    fn valid_document_passes() {
        assert!(validate_document(&project_with_task("010")).is_ok());
    }

    #[test]
    fn short_task_id_rejected() {
        let err = validate_document(&project_with_task("10")).unwrap_err();
        assert!(err.message.contains("must match"));
    }

    #[test]
    fn duplicate_task_ids_rejected() {
        let mut state = project_with_task("010");
        let phase = state.phases.get_mut("implementation").unwrap();
        phase
            .tasks
            .push(Task::new("010", "dup", "implementation", "implementer"));
        let err = validate_document(&state).unwrap_err();
        assert!(err.message.contains("duplicate"));
    }

    #[test]
    fn out_of_order_task_ids_rejected() {
        let mut state = project_with_task("020");
        let phase = state.phases.get_mut("implementation").unwrap();
        phase
            .tasks
            .push(Task::new("010", "earlier", "implementation", "implementer"));
        let err = validate_document(&state).unwrap_err();
        assert!(err.message.contains("out of order"));
    }

    #[test]
    fn task_phase_mismatch_rejected() {
        let mut state = project_with_task("010");
        let phase = state.phases.get_mut("implementation").unwrap();
        phase.tasks[0].phase = "review".to_string();
        let err = validate_document(&state).unwrap_err();
        assert!(err.message.contains("claims phase"));
    }

    #[test]
    fn traversing_artifact_path_rejected() {
        let mut state = project_with_task("010");
        let phase = state.phases.get_mut("implementation").unwrap();
        phase.outputs.push(Artifact::new("code", "../escape.rs"));
        let err = validate_document(&state).unwrap_err();
        assert!(err.field.contains("outputs[0].path"));
    }

    #[test]
    fn parse_scalar_types() {
        assert_eq!(parse_scalar("true"), serde_yaml::Value::Bool(true));
        assert_eq!(parse_scalar("42"), serde_yaml::Value::from(42));
        assert_eq!(parse_scalar("2.5"), serde_yaml::Value::from(2.5));
        assert_eq!(parse_scalar("pass"), serde_yaml::Value::from("pass"));
    }
}
