//! Task commands.

use std::path::Path;

use crate::errors::SowError;
use crate::project::TypeRegistry;

use super::load_project;

/// `sow task add <name> [--agent a] [--phase n] [--deps 010,020] [--parallel]`
pub fn cmd_task_add(
    project_dir: &Path,
    registry: &TypeRegistry,
    phase: Option<&str>,
    name: &str,
    agent: &str,
    dependencies: Vec<String>,
    parallel: bool,
) -> Result<(), SowError> {
    let mut project = load_project(project_dir, registry)?;
    let id = project.task_add(phase, name, agent, dependencies, parallel)?;
    println!("added task {} ({})", console::style(&id).bold(), name);
    Ok(())
}

/// `sow task set --id <id> <field-path> <value>`
pub fn cmd_task_set(
    project_dir: &Path,
    registry: &TypeRegistry,
    id: &str,
    phase: Option<&str>,
    field: &str,
    value: &str,
) -> Result<(), SowError> {
    let mut project = load_project(project_dir, registry)?;
    project.set_task_field(id, phase, field, value)?;
    println!("task {id}: {field} = {value}");
    Ok(())
}

/// `sow task abandon --id <id>`
pub fn cmd_task_abandon(
    project_dir: &Path,
    registry: &TypeRegistry,
    id: &str,
    phase: Option<&str>,
) -> Result<(), SowError> {
    let mut project = load_project(project_dir, registry)?;
    project.task_abandon(id, phase)?;
    println!("task {id} abandoned");
    Ok(())
}

/// `sow task list [--phase n]`
pub fn cmd_task_list(
    project_dir: &Path,
    registry: &TypeRegistry,
    phase: Option<&str>,
) -> Result<(), SowError> {
    let project = load_project(project_dir, registry)?;
    let phase_name = match phase {
        Some(name) => name.to_string(),
        None => {
            // Prefer the task-supporting phase for the current state over
            // the plain active phase.
            let default = project
                .config()
                .get_default_task_phase(project.state().current_state());
            if default.is_empty() {
                project.resolve_phase(None)?
            } else {
                default
            }
        }
    };
    let tasks = project.task_list(Some(&phase_name))?;

    if tasks.is_empty() {
        println!("no tasks in phase {phase_name}");
        return Ok(());
    }
    println!(
        "{:<6} {:<14} {:<12} {:<4} {}",
        "id", "status", "agent", "iter", "name"
    );
    for task in tasks {
        println!(
            "{:<6} {:<14} {:<12} {:<4} {}",
            task.id,
            task.status.as_str(),
            task.assigned_agent,
            task.iteration,
            task.name,
        );
    }
    Ok(())
}
