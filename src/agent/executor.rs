//! Executor abstraction and the spawn/resume coordinator.
//!
//! An `Executor` knows how to invoke one agent CLI as a subprocess. The
//! `Coordinator` owns the spawn contract:
//!
//! 1. resolve `(agent, executor)` from the task's role and the bindings
//! 2. allocate the session id and persist it *before* the subprocess starts
//! 3. compose the prompt (embedded template + task context)
//! 4. block until the subprocess exits
//! 5. re-read the task document and treat its `status` as the authoritative
//!    completion signal; the exit code is supplementary only

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SowConfig;
use crate::errors::SowError;
use crate::project::Project;
use crate::schema::{Task, TaskStatus, ValidationError};

use super::{Agent, AgentRegistry};

/// Subprocess launch failures. A non-zero child exit is *not* an error at
/// this layer.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for {command}: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("executor {name} does not support resumption")]
    NotSupported { name: String },

    #[error("no executor registered under {name:?}")]
    UnknownExecutor { name: String },

    #[error("worker cancelled")]
    Cancelled,
}

/// A polymorphic capability for invoking a particular agent CLI.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    fn supports_resumption(&self) -> bool {
        false
    }

    /// Launch the agent subprocess and block until it exits.
    async fn spawn(
        &self,
        cancel: CancellationToken,
        agent: &Agent,
        prompt: &str,
        session_id: &str,
    ) -> Result<(), ExecutorError>;

    /// Resume an earlier conversation and block until the subprocess exits.
    async fn resume(
        &self,
        cancel: CancellationToken,
        session_id: &str,
        prompt: &str,
    ) -> Result<(), ExecutorError>;
}

pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Registry with the built-in executors, commands resolved from config.
    pub fn builtin(config: &SowConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::claude::ClaudeExecutor::new(
            &config.executor_command(crate::config::DEFAULT_EXECUTOR),
        )));
        registry
    }

    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        self.executors.insert(executor.name().to_string(), executor);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Executor>, ExecutorError> {
        self.executors
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutorError::UnknownExecutor {
                name: name.to_string(),
            })
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// What the orchestrator should do after a worker subprocess exits, derived
/// from the task status the worker left on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// `needs_review` or `completed`: normal completion, proceed.
    Proceed,
    /// `paused`: the worker needs input; resume later with the session id.
    Paused,
    /// `failed`: error path; inspect the task document.
    Failed,
    /// Any other status: the worker exited without following the protocol.
    Unchanged(TaskStatus),
}

impl WorkerOutcome {
    fn from_status(status: TaskStatus) -> Self {
        match status {
            TaskStatus::NeedsReview | TaskStatus::Completed => WorkerOutcome::Proceed,
            TaskStatus::Paused => WorkerOutcome::Paused,
            TaskStatus::Failed => WorkerOutcome::Failed,
            other => WorkerOutcome::Unchanged(other),
        }
    }
}

/// Spawns and resumes worker agents against a project.
pub struct Coordinator {
    agents: AgentRegistry,
    executors: ExecutorRegistry,
    config: SowConfig,
}

impl Coordinator {
    pub fn new(agents: AgentRegistry, executors: ExecutorRegistry, config: SowConfig) -> Self {
        Self {
            agents,
            executors,
            config,
        }
    }

    pub fn from_config(config: SowConfig) -> Self {
        let executors = ExecutorRegistry::builtin(&config);
        Self::new(AgentRegistry::builtin(), executors, config)
    }

    fn resolve(&self, role: &str) -> Result<(&Agent, Arc<dyn Executor>), SowError> {
        let agent = self.agents.get(role).ok_or_else(|| {
            SowError::Validation(ValidationError::new(
                "agent",
                &format!(
                    "unknown agent role {role:?} (known: {})",
                    self.agents.names().join(", ")
                ),
            ))
        })?;
        let executor_name = self.config.executor_for_role(role);
        let executor = self.executors.get(&executor_name)?;
        Ok((agent, executor))
    }

    /// Spawn a worker for the task and block until it exits. Returns the
    /// outcome derived from the re-read task document.
    pub async fn spawn_worker(
        &self,
        project: &mut Project,
        role: &str,
        task_id: &str,
        extra_prompt: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<WorkerOutcome, SowError> {
        let task = self.lookup_task(project, task_id)?;
        let (agent, executor) = self.resolve(role)?;

        // The session id must hit disk before the subprocess starts; once
        // the child exits it cannot be recovered from it.
        let session_id = match &task.session_id {
            Some(id) => id.clone(),
            None => {
                let id = Uuid::new_v4().to_string();
                project.set_task_session(task_id, &id)?;
                id
            }
        };
        project.mark_task_started(task_id)?;

        let prompt = compose_prompt(agent, &task, extra_prompt);
        tracing::info!(task = %task_id, role, executor = %executor.name(), session = %session_id, "spawning worker");
        executor.spawn(cancel, agent, &prompt, &session_id).await?;

        let task = project.reload_task(task_id)?;
        Ok(WorkerOutcome::from_status(task.status))
    }

    /// Resume a paused worker conversation. Fails when the task has no
    /// session id or the bound executor cannot resume.
    pub async fn resume_worker(
        &self,
        project: &mut Project,
        role: &str,
        task_id: &str,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<WorkerOutcome, SowError> {
        let task = self.lookup_task(project, task_id)?;
        let (_, executor) = self.resolve(role)?;

        if !executor.supports_resumption() {
            return Err(ExecutorError::NotSupported {
                name: executor.name().to_string(),
            }
            .into());
        }
        let session_id = task.session_id.clone().ok_or_else(|| {
            SowError::Validation(ValidationError::new(
                "session_id",
                &format!("task {task_id} has no session to resume; spawn it first"),
            ))
        })?;

        // Feedback-driven rework: keep the note on disk and bump the
        // iteration counter before the worker picks it up.
        if !prompt.is_empty() {
            crate::project::store::write_feedback(project.root(), &task.phase, task_id, prompt)?;
            let next = (task.iteration + 1).to_string();
            project.set_task_field(task_id, Some(&task.phase), "iteration", &next)?;
        }

        tracing::info!(task = %task_id, session = %session_id, "resuming worker");
        executor.resume(cancel, &session_id, prompt).await?;

        let task = project.reload_task(task_id)?;
        Ok(WorkerOutcome::from_status(task.status))
    }

    fn lookup_task(&self, project: &Project, task_id: &str) -> Result<Task, SowError> {
        let phase = project.find_task_phase(task_id)?;
        project
            .state()
            .phase(&phase)?
            .task(task_id)
            .cloned()
            .ok_or_else(|| {
                SowError::Validation(ValidationError::new(
                    "task",
                    &format!("no task with id {task_id:?}"),
                ))
            })
    }
}

/// Full prompt: embedded agent template, task context, then any extra
/// task-specific instructions.
fn compose_prompt(agent: &Agent, task: &Task, extra: Option<&str>) -> String {
    let mut prompt = agent.load_template();
    prompt.push_str(&format!(
        "\n## TASK\n\
         id: {id}\n\
         phase: {phase}\n\
         name: {name}\n\
         iteration: {iteration}\n",
        id = task.id,
        phase = task.phase,
        name = task.name,
        iteration = task.iteration,
    ));
    if !task.inputs.is_empty() {
        prompt.push_str("inputs:\n");
        for artifact in &task.inputs {
            prompt.push_str(&format!("  - {} ({})\n", artifact.path, artifact.kind));
        }
    }
    if let Some(extra) = extra {
        prompt.push_str("\n## INSTRUCTIONS\n");
        prompt.push_str(extra);
        prompt.push('\n');
    }
    prompt
}
