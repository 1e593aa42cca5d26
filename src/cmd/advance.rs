//! The state progression command.

use std::path::Path;

use crate::errors::SowError;
use crate::project::TypeRegistry;
use crate::types::standard::STATE_NO_PROJECT;

use super::load_project;

/// `sow advance`
pub fn cmd_advance(project_dir: &Path, registry: &TypeRegistry) -> Result<(), SowError> {
    let mut project = load_project(project_dir, registry)?;
    let before = project.state().current_state().to_string();
    let after = project.advance()?;

    if before == after {
        println!("{} (terminal state, no-op)", after);
    } else {
        println!(
            "{} {} {}",
            before,
            console::style("->").dim(),
            console::style(&after).cyan().bold()
        );
    }

    if after == STATE_NO_PROJECT {
        println!("Project is finished; run `sow project delete --force` to clean up.");
    } else if let Some(guidance) = project.current_prompt() {
        println!();
        println!("{guidance}");
    }
    Ok(())
}
