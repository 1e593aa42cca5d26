//! Phase-scoped scalar writes.

use std::path::Path;

use crate::errors::SowError;
use crate::project::TypeRegistry;

use super::load_project;

/// `sow phase set <field-path> <value> [--phase <n>]`
pub fn cmd_phase_set(
    project_dir: &Path,
    registry: &TypeRegistry,
    phase: Option<&str>,
    field: &str,
    value: &str,
) -> Result<(), SowError> {
    let mut project = load_project(project_dir, registry)?;
    let resolved = project.resolve_phase(phase)?;
    project.set_phase_field(Some(&resolved), field, value)?;
    println!("phases.{resolved}.{field} = {value}");
    Ok(())
}
