use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sow::cmd;
use sow::config::SowConfig;
use sow::errors::SowError;
use sow::project::{Direction, TypeRegistry, registry};

#[derive(Parser)]
#[command(name = "sow")]
#[command(version, about = "AI-assisted developer workflow engine")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory the project (or its worktree) lives in; defaults to the
    /// current directory.
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, inspect, or delete the project
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Phase-scoped scalar writes
    Phase {
        #[command(subcommand)]
        command: PhaseCommands,
    },
    /// Phase input artifacts
    Input {
        #[command(subcommand)]
        command: ArtifactCommands,
    },
    /// Phase output artifacts
    Output {
        #[command(subcommand)]
        command: ArtifactCommands,
    },
    /// Tasks of the task-supporting phase
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Fire the current state's event and move the machine forward
    Advance,
    /// Spawn or resume worker agents
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a project on a branch
    New {
        #[arg(long)]
        branch: String,
        /// Seed the description from a tracker work item
        #[arg(long)]
        issue: Option<String>,
        /// Project type to instantiate
        #[arg(long, default_value = "standard")]
        project_type: String,
        prompt: String,
    },
    /// Show project status and the orchestrator guidance for this state
    Continue {
        #[arg(long)]
        branch: Option<String>,
    },
    /// Write a project field (dot paths route to metadata)
    Set { field: String, value: String },
    /// Remove the project tree
    Delete {
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum PhaseCommands {
    /// Write a phase field (dot paths route to metadata)
    Set {
        field: String,
        value: String,
        #[arg(long)]
        phase: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ArtifactCommands {
    /// Append an artifact; trailing `field=value` pairs set extra fields
    Add {
        #[arg(long = "type")]
        kind: String,
        #[arg(long)]
        path: String,
        #[arg(long)]
        phase: Option<String>,
        /// Task id when addressing a task's artifacts
        #[arg(long)]
        id: Option<String>,
        fields: Vec<String>,
    },
    /// Write one field of an artifact by index
    Set {
        #[arg(long)]
        index: usize,
        field: String,
        value: String,
        #[arg(long)]
        phase: Option<String>,
        #[arg(long)]
        id: Option<String>,
    },
    /// Remove an artifact by index (later indices shift down)
    Remove {
        #[arg(long)]
        index: usize,
        #[arg(long)]
        phase: Option<String>,
        #[arg(long)]
        id: Option<String>,
    },
    /// List artifacts with their indices
    List {
        #[arg(long)]
        phase: Option<String>,
        #[arg(long)]
        id: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Create a task (ids are gap-numbered: 010, 020, ...)
    Add {
        name: String,
        #[arg(long, default_value = "implementer")]
        agent: String,
        #[arg(long)]
        phase: Option<String>,
        #[arg(long, value_delimiter = ',')]
        deps: Vec<String>,
        #[arg(long)]
        parallel: bool,
    },
    /// Write a task field (dot paths route to metadata)
    Set {
        #[arg(long)]
        id: String,
        field: String,
        value: String,
        #[arg(long)]
        phase: Option<String>,
    },
    /// Mark a task abandoned
    Abandon {
        #[arg(long)]
        id: String,
        #[arg(long)]
        phase: Option<String>,
    },
    /// List tasks of the task-supporting phase
    List {
        #[arg(long)]
        phase: Option<String>,
    },
    /// Task input artifacts (requires --id)
    Input {
        #[command(subcommand)]
        command: ArtifactCommands,
    },
    /// Task output artifacts (requires --id)
    Output {
        #[command(subcommand)]
        command: ArtifactCommands,
    },
}

#[derive(Subcommand)]
pub enum AgentCommands {
    /// Spawn a worker for a task and block until it exits
    Spawn {
        agent: String,
        task_id: String,
        /// Extra task-specific instructions appended to the prompt
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Resume a paused worker conversation
    Resume {
        agent: String,
        task_id: String,
        prompt: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if verbose { "sow=debug" } else { "sow=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("{} {err}", console::style("error:").red().bold());
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), SowError> {
    let project_dir = match cli.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir()
            .map_err(|e| SowError::Other(anyhow::Error::new(e).context("Failed to get current directory")))?,
    };

    let registry = registry::install(
        TypeRegistry::builtin().map_err(|e| SowError::Other(anyhow::Error::new(e)))?,
    );
    let config = SowConfig::load(&project_dir).map_err(SowError::Other)?;

    match cli.command {
        Commands::Project { command } => match command {
            ProjectCommands::New {
                branch,
                issue,
                project_type,
                prompt,
            } => {
                cmd::project::cmd_project_new(
                    &project_dir,
                    registry,
                    &config,
                    &branch,
                    issue.as_deref(),
                    &prompt,
                    &project_type,
                )
                .await
            }
            ProjectCommands::Continue { branch } => {
                cmd::project::cmd_project_continue(&project_dir, registry, branch.as_deref())
            }
            ProjectCommands::Set { field, value } => {
                cmd::project::cmd_project_set(&project_dir, registry, &field, &value)
            }
            ProjectCommands::Delete { force } => {
                cmd::project::cmd_project_delete(&project_dir, registry, force)
            }
        },
        Commands::Phase { command } => match command {
            PhaseCommands::Set { field, value, phase } => {
                cmd::phase::cmd_phase_set(&project_dir, registry, phase.as_deref(), &field, &value)
            }
        },
        Commands::Input { command } => {
            run_artifact(&project_dir, registry, Direction::Input, command, false)
        }
        Commands::Output { command } => {
            run_artifact(&project_dir, registry, Direction::Output, command, false)
        }
        Commands::Task { command } => match command {
            TaskCommands::Add {
                name,
                agent,
                phase,
                deps,
                parallel,
            } => cmd::task::cmd_task_add(
                &project_dir,
                registry,
                phase.as_deref(),
                &name,
                &agent,
                deps,
                parallel,
            ),
            TaskCommands::Set {
                id,
                field,
                value,
                phase,
            } => cmd::task::cmd_task_set(&project_dir, registry, &id, phase.as_deref(), &field, &value),
            TaskCommands::Abandon { id, phase } => {
                cmd::task::cmd_task_abandon(&project_dir, registry, &id, phase.as_deref())
            }
            TaskCommands::List { phase } => {
                cmd::task::cmd_task_list(&project_dir, registry, phase.as_deref())
            }
            TaskCommands::Input { command } => {
                run_artifact(&project_dir, registry, Direction::Input, command, true)
            }
            TaskCommands::Output { command } => {
                run_artifact(&project_dir, registry, Direction::Output, command, true)
            }
        },
        Commands::Advance => cmd::advance::cmd_advance(&project_dir, registry),
        Commands::Agent { command } => match command {
            AgentCommands::Spawn {
                agent,
                task_id,
                prompt,
            } => {
                cmd::agent::cmd_agent_spawn(
                    &project_dir,
                    registry,
                    config,
                    &agent,
                    &task_id,
                    prompt.as_deref(),
                )
                .await
            }
            AgentCommands::Resume {
                agent,
                task_id,
                prompt,
            } => {
                cmd::agent::cmd_agent_resume(
                    &project_dir,
                    registry,
                    config,
                    &agent,
                    &task_id,
                    prompt.as_deref().unwrap_or(""),
                )
                .await
            }
        },
    }
}

fn run_artifact(
    project_dir: &std::path::Path,
    registry: &TypeRegistry,
    direction: Direction,
    command: ArtifactCommands,
    task_scope: bool,
) -> Result<(), SowError> {
    let require_id = |id: &Option<String>| -> Result<(), SowError> {
        if task_scope && id.is_none() {
            return Err(SowError::Validation(sow::schema::ValidationError::new(
                "id",
                "task-scoped artifact commands need --id",
            )));
        }
        Ok(())
    };

    match command {
        ArtifactCommands::Add {
            kind,
            path,
            phase,
            id,
            fields,
        } => {
            require_id(&id)?;
            cmd::artifact::cmd_artifact_add(
                project_dir,
                registry,
                direction,
                phase.as_deref(),
                id.as_deref(),
                &kind,
                &path,
                &fields,
            )
        }
        ArtifactCommands::Set {
            index,
            field,
            value,
            phase,
            id,
        } => {
            require_id(&id)?;
            cmd::artifact::cmd_artifact_set(
                project_dir,
                registry,
                direction,
                phase.as_deref(),
                id.as_deref(),
                index,
                &field,
                &value,
            )
        }
        ArtifactCommands::Remove { index, phase, id } => {
            require_id(&id)?;
            cmd::artifact::cmd_artifact_remove(
                project_dir,
                registry,
                direction,
                phase.as_deref(),
                id.as_deref(),
                index,
            )
        }
        ArtifactCommands::List { phase, id } => {
            require_id(&id)?;
            cmd::artifact::cmd_artifact_list(
                project_dir,
                registry,
                direction,
                phase.as_deref(),
                id.as_deref(),
            )
        }
    }
}
