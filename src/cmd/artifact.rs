//! Artifact commands: `input`/`output` `add|set|remove|list`, shared by the
//! phase scope and the task scope (`task input …`).

use std::path::Path;

use crate::errors::SowError;
use crate::project::{Direction, Scope, TypeRegistry};
use crate::schema::Artifact;

use super::{load_project, parse_assignments};

fn scope(phase: Option<&str>, task_id: Option<&str>) -> Scope {
    match task_id {
        Some(id) => Scope::Task {
            id: id.to_string(),
            phase: phase.map(str::to_string),
        },
        None => Scope::Phase(phase.map(str::to_string)),
    }
}

pub fn cmd_artifact_add(
    project_dir: &Path,
    registry: &TypeRegistry,
    direction: Direction,
    phase: Option<&str>,
    task_id: Option<&str>,
    kind: &str,
    path: &str,
    fields: &[String],
) -> Result<(), SowError> {
    let mut project = load_project(project_dir, registry)?;
    let extras = parse_assignments(fields)?;
    let index = project.artifact_add(&scope(phase, task_id), direction, kind, path, &extras)?;
    println!("added {} [{}] {} ({})", direction.as_str(), index, path, kind);
    Ok(())
}

pub fn cmd_artifact_set(
    project_dir: &Path,
    registry: &TypeRegistry,
    direction: Direction,
    phase: Option<&str>,
    task_id: Option<&str>,
    index: usize,
    field: &str,
    value: &str,
) -> Result<(), SowError> {
    let mut project = load_project(project_dir, registry)?;
    project.artifact_set(&scope(phase, task_id), direction, index, field, value)?;
    println!("{} [{}] {field} = {value}", direction.as_str(), index);
    Ok(())
}

pub fn cmd_artifact_remove(
    project_dir: &Path,
    registry: &TypeRegistry,
    direction: Direction,
    phase: Option<&str>,
    task_id: Option<&str>,
    index: usize,
) -> Result<(), SowError> {
    let mut project = load_project(project_dir, registry)?;
    project.artifact_remove(&scope(phase, task_id), direction, index)?;
    println!("removed {} [{}]", direction.as_str(), index);
    Ok(())
}

pub fn cmd_artifact_list(
    project_dir: &Path,
    registry: &TypeRegistry,
    direction: Direction,
    phase: Option<&str>,
    task_id: Option<&str>,
) -> Result<(), SowError> {
    let project = load_project(project_dir, registry)?;
    let list = project.artifact_list(&scope(phase, task_id), direction)?;

    if list.is_empty() {
        println!("no {}s", direction.as_str());
        return Ok(());
    }
    for (index, artifact) in &list {
        println!("[{index}] {}", describe(artifact));
    }
    Ok(())
}

fn describe(artifact: &Artifact) -> String {
    let mut line = format!("type={} path={}", artifact.kind, artifact.path);
    if let Some(approved) = artifact.approved {
        line.push_str(&format!(" approved={approved}"));
    }
    for (key, value) in &artifact.metadata {
        match value {
            serde_yaml::Value::String(s) => line.push_str(&format!(" {key}={s}")),
            serde_yaml::Value::Bool(b) => line.push_str(&format!(" {key}={b}")),
            serde_yaml::Value::Number(n) => line.push_str(&format!(" {key}={n}")),
            _ => line.push_str(&format!(" {key}=…")),
        }
    }
    line
}
