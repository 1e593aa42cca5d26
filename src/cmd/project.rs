//! Project lifecycle commands.

use std::path::Path;

use crate::config::SowConfig;
use crate::errors::SowError;
use crate::project::{Project, TypeRegistry};
use crate::schema::ValidationError;
use crate::tracker;

use super::{load_project, resolve_project_root};

/// `sow project new --branch <b> [--issue N] "<prompt>"`
pub async fn cmd_project_new(
    project_dir: &Path,
    registry: &TypeRegistry,
    config: &SowConfig,
    branch: &str,
    issue: Option<&str>,
    prompt: &str,
    project_type: &str,
) -> Result<(), SowError> {
    let type_config = registry.get(project_type).ok_or_else(|| {
        SowError::Validation(ValidationError::new(
            "type",
            &format!(
                "unknown project type {project_type:?} (known: {})",
                registry.names().join(", ")
            ),
        ))
    })?;

    // Issue-seeded creation needs a tracker; without one the feature is
    // disabled rather than degraded.
    let seeded = match issue {
        Some(id) => {
            let tracker = tracker::from_config(config)
                .ok_or(crate::tracker::TrackerError::NotConfigured)
                .map_err(SowError::from)?;
            Some(tracker.get_work_item(id).await?)
        }
        None => None,
    };

    let root = resolve_project_root(project_dir, Some(branch))?;
    let name = branch.replace('/', "-");
    let description = match &seeded {
        Some(item) if prompt.is_empty() => format!("{}\n\n{}", item.title, item.body),
        Some(item) => format!("{prompt}\n\nSeeded from work item #{}: {}", item.id, item.title),
        None => prompt.to_string(),
    };

    let mut project = Project::create(&root, type_config, &name, branch, &description)?;
    if let Some(item) = &seeded {
        project.set_project_field("metadata.issue", &item.id)?;
    }

    println!(
        "{} project {} on branch {} ({})",
        console::style("Created").green().bold(),
        project.state().name,
        branch,
        project.state().current_state(),
    );
    if let Some(guidance) = project.current_prompt() {
        println!();
        println!("{guidance}");
    }
    Ok(())
}

/// `sow project continue [--branch <b>]`
pub fn cmd_project_continue(
    project_dir: &Path,
    registry: &TypeRegistry,
    branch: Option<&str>,
) -> Result<(), SowError> {
    let root = resolve_project_root(project_dir, branch)?;
    let project = Project::load(&root, registry)?;
    let state = project.state();

    println!(
        "Project {} ({}) — state {}",
        console::style(&state.name).bold(),
        state.branch,
        console::style(state.current_state()).cyan(),
    );
    println!();
    for config in project.config().phases() {
        if let Ok(phase) = state.phase(&config.name) {
            println!(
                "  {:<16} {:<12} inputs: {:<2} outputs: {:<2} tasks: {}",
                phase.name,
                phase.status,
                phase.inputs.len(),
                phase.outputs.len(),
                phase.tasks.len(),
            );
        }
    }
    if let Some(guidance) = project.current_prompt() {
        println!();
        println!("{guidance}");
    }
    Ok(())
}

/// `sow project set <field-path> <value>`
pub fn cmd_project_set(
    project_dir: &Path,
    registry: &TypeRegistry,
    field: &str,
    value: &str,
) -> Result<(), SowError> {
    let mut project = load_project(project_dir, registry)?;
    project.set_project_field(field, value)?;
    println!("project.{field} = {value}");
    Ok(())
}

/// `sow project delete [--force]`
pub fn cmd_project_delete(
    project_dir: &Path,
    registry: &TypeRegistry,
    force: bool,
) -> Result<(), SowError> {
    let project = load_project(project_dir, registry)?;
    if !force {
        return Err(SowError::Validation(ValidationError::new(
            "project",
            &format!(
                "refusing to delete project {:?} without --force",
                project.state().name
            ),
        )));
    }
    let name = project.state().name.clone();
    project.delete()?;
    println!("{} project {name}", console::style("Deleted").yellow().bold());
    Ok(())
}
