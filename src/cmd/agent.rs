//! Worker spawn and resume commands.

use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::agent::{Coordinator, WorkerOutcome};
use crate::config::SowConfig;
use crate::errors::SowError;
use crate::project::TypeRegistry;

use super::load_project;

/// Cancellation token wired to Ctrl-C so a cancelled command terminates the
/// worker subprocess instead of orphaning it.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let child = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    cancel
}

fn report(task_id: &str, outcome: WorkerOutcome) {
    match outcome {
        WorkerOutcome::Proceed => println!(
            "{} task {task_id} is ready for review",
            console::style("Done:").green().bold()
        ),
        WorkerOutcome::Paused => println!(
            "{} task {task_id} paused; resume with `sow agent resume <agent> {task_id}`",
            console::style("Paused:").yellow().bold()
        ),
        WorkerOutcome::Failed => println!(
            "{} task {task_id} failed; inspect its document and feedback",
            console::style("Failed:").red().bold()
        ),
        WorkerOutcome::Unchanged(status) => println!(
            "{} worker exited leaving task {task_id} {status}; treat as failed",
            console::style("Warning:").yellow().bold()
        ),
    }
}

/// `sow agent spawn <agent> <task-id>`
pub async fn cmd_agent_spawn(
    project_dir: &Path,
    registry: &TypeRegistry,
    config: SowConfig,
    role: &str,
    task_id: &str,
    prompt: Option<&str>,
) -> Result<(), SowError> {
    let mut project = load_project(project_dir, registry)?;
    let coordinator = Coordinator::from_config(config);

    let outcome = coordinator
        .spawn_worker(&mut project, role, task_id, prompt, cancel_on_ctrl_c())
        .await?;
    report(task_id, outcome);
    Ok(())
}

/// `sow agent resume <agent> <task-id> [prompt]`
pub async fn cmd_agent_resume(
    project_dir: &Path,
    registry: &TypeRegistry,
    config: SowConfig,
    role: &str,
    task_id: &str,
    prompt: &str,
) -> Result<(), SowError> {
    let mut project = load_project(project_dir, registry)?;
    let coordinator = Coordinator::from_config(config);

    let outcome = coordinator
        .resume_worker(&mut project, role, task_id, prompt, cancel_on_ctrl_c())
        .await?;
    report(task_id, outcome);
    Ok(())
}
