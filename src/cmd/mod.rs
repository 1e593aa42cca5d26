//! CLI command implementations.
//!
//! Each submodule owns one subcommand family:
//!
//! | Module     | Commands handled                              |
//! |------------|-----------------------------------------------|
//! | `project`  | `project new/continue/set/delete`             |
//! | `phase`    | `phase set`                                   |
//! | `artifact` | `input …` / `output …` (phase and task scope) |
//! | `task`     | `task add/set/abandon/list`                   |
//! | `advance`  | `advance`                                     |
//! | `agent`    | `agent spawn/resume`                          |

pub mod advance;
pub mod agent;
pub mod artifact;
pub mod phase;
pub mod project;
pub mod task;

use std::path::{Path, PathBuf};

use crate::errors::SowError;
use crate::project::{Project, TypeRegistry};
use crate::worktree::WorktreeService;

/// Directory name the project tree lives under.
pub const SOW_DIR: &str = ".sow";

/// Resolve the project root for a command invocation. With a branch, the
/// project lives in that branch's worktree (created on demand); without
/// one, in `<project_dir>/.sow` — the orchestrator is expected to run
/// inside the worktree it owns.
pub fn resolve_project_root(project_dir: &Path, branch: Option<&str>) -> Result<PathBuf, SowError> {
    if let Some(branch) = branch
        && let Ok(service) = WorktreeService::discover(project_dir)
    {
        let current = service.current_branch().map_err(SowError::Other)?;
        if current != branch {
            let slug = branch.replace('/', "-");
            let worktree = project_dir.join(".worktrees").join(&slug);
            service
                .ensure_worktree(&worktree, branch)
                .map_err(SowError::Other)?;
            return Ok(worktree.join(SOW_DIR));
        }
    }
    Ok(project_dir.join(SOW_DIR))
}

/// Load the project for a plain (branch-less) command invocation.
pub fn load_project(project_dir: &Path, registry: &TypeRegistry) -> Result<Project, SowError> {
    Project::load(&project_dir.join(SOW_DIR), registry)
}

/// Parse trailing `field=value` assignments (artifact extras).
pub fn parse_assignments(raw: &[String]) -> Result<Vec<(String, String)>, SowError> {
    raw.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| {
                    crate::schema::ValidationError::new(
                        "field",
                        &format!("expected field=value, got {pair:?}"),
                    )
                    .into()
                })
        })
        .collect()
}
