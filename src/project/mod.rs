//! Project container: the decoded document bound to its registered type
//! config and project root.
//!
//! Every mutation follows the same discipline: clone the in-memory document,
//! apply the change, validate against the schema and the project type, then
//! persist atomically. On validation failure nothing is written and the
//! in-memory document is untouched; the only source of truth on disk is the
//! last successfully persisted document.

pub mod registry;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::SowError;
use crate::machine::MachineError;
use crate::schema::{
    Artifact, Phase, ProjectState, Task, TaskStatus, ValidationError, next_task_id,
};
use crate::sdk::ProjectTypeConfig;

pub use registry::TypeRegistry;

/// Which artifact list a command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Container a phase-scoped command addresses: the phase itself or one of
/// its tasks.
#[derive(Debug, Clone)]
pub enum Scope {
    Phase(Option<String>),
    Task {
        id: String,
        phase: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct ResolvedScope {
    phase: String,
    task: Option<String>,
}

#[derive(Debug)]
pub struct Project {
    root: PathBuf,
    state: ProjectState,
    config: Arc<ProjectTypeConfig>,
}

impl Project {
    /// Create a fresh project at `root`: run the type initializer, validate,
    /// persist.
    pub fn create(
        root: &Path,
        config: Arc<ProjectTypeConfig>,
        name: &str,
        branch: &str,
        description: &str,
    ) -> Result<Self, SowError> {
        if store::state_path(root).exists() {
            return Err(ValidationError::new(
                "project",
                &format!("a project already exists at {}", root.display()),
            )
            .into());
        }

        let mut state = ProjectState::new(name, &config.name, branch, description, &config.initial_state);
        config.initialize(&mut state)?;
        config.validate_project(&state)?;
        store::save_project_state(root, &state)?;
        std::fs::create_dir_all(store::context_dir(root))
            .map_err(|e| SowError::Persistence {
                path: store::context_dir(root),
                source: e,
            })?;

        tracing::info!(name, branch, project_type = %config.name, "created project");
        Ok(Self {
            root: root.to_path_buf(),
            state,
            config,
        })
    }

    /// Load the project at `root`, cross-checking its declared type against
    /// the registry and validating all invariants. A document that fails
    /// either check is an invariant violation and is never auto-repaired.
    pub fn load(root: &Path, registry: &TypeRegistry) -> Result<Self, SowError> {
        let state = store::load_project_state(root)?;

        let config = registry.get(&state.project_type).ok_or_else(|| {
            SowError::Invariant(format!(
                "project type {:?} is not registered (known types: {})",
                state.project_type,
                registry.names().join(", ")
            ))
        })?;

        config
            .validate_project(&state)
            .map_err(|e| SowError::Invariant(e.to_string()))?;

        Ok(Self {
            root: root.to_path_buf(),
            state,
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> &ProjectState {
        &self.state
    }

    pub fn config(&self) -> &ProjectTypeConfig {
        &self.config
    }

    /// Apply a mutation to a draft copy, validate, persist, commit.
    fn mutate<F>(&mut self, f: F) -> Result<(), SowError>
    where
        F: FnOnce(&mut ProjectState) -> Result<(), SowError>,
    {
        let mut draft = self.state.clone();
        f(&mut draft)?;
        draft.touch();
        self.config.validate_project(&draft)?;
        store::save_project_state(&self.root, &draft)?;
        self.state = draft;
        Ok(())
    }

    /// The *active phase*: the phase whose state range contains the current
    /// state, unless the caller named one explicitly.
    pub fn resolve_phase(&self, explicit: Option<&str>) -> Result<String, SowError> {
        match explicit {
            Some(name) => {
                self.state.phase(name)?;
                Ok(name.to_string())
            }
            None => Ok(self
                .config
                .active_phase(self.state.current_state())?
                .name
                .clone()),
        }
    }

    fn resolve_scope(&self, scope: &Scope) -> Result<ResolvedScope, SowError> {
        match scope {
            Scope::Phase(phase) => Ok(ResolvedScope {
                phase: self.resolve_phase(phase.as_deref())?,
                task: None,
            }),
            Scope::Task { id, phase } => {
                let phase = match phase {
                    Some(name) => name.clone(),
                    None => self.find_task_phase(id)?,
                };
                self.state
                    .phase(&phase)?
                    .task(id)
                    .ok_or_else(|| {
                        ValidationError::new(
                            "task",
                            &format!("no task {id:?} in phase {phase:?}"),
                        )
                    })?;
                Ok(ResolvedScope {
                    phase,
                    task: Some(id.clone()),
                })
            }
        }
    }

    /// Phase owning task `id`; errors when the id is absent or ambiguous.
    pub fn find_task_phase(&self, id: &str) -> Result<String, SowError> {
        let owners: Vec<&str> = self
            .state
            .phases
            .values()
            .filter(|p| p.task(id).is_some())
            .map(|p| p.name.as_str())
            .collect();
        match owners.as_slice() {
            [single] => Ok(single.to_string()),
            [] => Err(ValidationError::new("task", &format!("no task with id {id:?}")).into()),
            _ => Err(ValidationError::new(
                "task",
                &format!("task id {id:?} exists in multiple phases; pass --phase"),
            )
            .into()),
        }
    }

    // ---- scalar fields ----

    pub fn set_project_field(&mut self, field: &str, value: &str) -> Result<(), SowError> {
        self.mutate(|state| Ok(state.set_field(field, value)?))
    }

    pub fn set_phase_field(
        &mut self,
        phase: Option<&str>,
        field: &str,
        value: &str,
    ) -> Result<(), SowError> {
        let phase = self.resolve_phase(phase)?;
        self.mutate(|state| {
            let p = state.phase_mut(&phase)?;
            p.set_field(field, value)?;
            p.touch();
            Ok(())
        })
    }

    pub fn set_task_field(
        &mut self,
        id: &str,
        phase: Option<&str>,
        field: &str,
        value: &str,
    ) -> Result<(), SowError> {
        let scope = self.resolve_scope(&Scope::Task {
            id: id.to_string(),
            phase: phase.map(str::to_string),
        })?;
        self.mutate(|state| {
            let task = state
                .phase_mut(&scope.phase)?
                .task_mut(id)
                .ok_or_else(|| ValidationError::new("task", &format!("no task with id {id:?}")))?;
            task.set_field(field, value)?;
            task.touch();
            Ok(())
        })
    }

    // ---- artifacts ----

    /// Append an artifact; `extras` are additional `field=value` writes with
    /// the usual metadata routing. Returns the new artifact's index.
    pub fn artifact_add(
        &mut self,
        scope: &Scope,
        direction: Direction,
        kind: &str,
        path: &str,
        extras: &[(String, String)],
    ) -> Result<usize, SowError> {
        let resolved = self.resolve_scope(scope)?;
        let mut artifact = Artifact::new(kind, path);
        for (field, value) in extras {
            artifact.set_field(field, value)?;
        }

        let mut index = 0;
        self.mutate(|state| {
            let list = artifacts_mut(state, &resolved, direction)?;
            list.push(artifact);
            index = list.len() - 1;
            Ok(())
        })?;
        Ok(index)
    }

    /// Mutate one artifact by position. Out-of-range indices are rejected.
    pub fn artifact_set(
        &mut self,
        scope: &Scope,
        direction: Direction,
        index: usize,
        field: &str,
        value: &str,
    ) -> Result<(), SowError> {
        let resolved = self.resolve_scope(scope)?;
        self.mutate(|state| {
            let list = artifacts_mut(state, &resolved, direction)?;
            let len = list.len();
            let artifact = list.get_mut(index).ok_or_else(|| {
                ValidationError::new(
                    direction.as_str(),
                    &format!("index {index} out of range (len {len})"),
                )
            })?;
            artifact.set_field(field, value)?;
            Ok(())
        })
    }

    /// Remove an artifact by position; subsequent indices shift down.
    pub fn artifact_remove(
        &mut self,
        scope: &Scope,
        direction: Direction,
        index: usize,
    ) -> Result<(), SowError> {
        let resolved = self.resolve_scope(scope)?;
        self.mutate(|state| {
            let list = artifacts_mut(state, &resolved, direction)?;
            if index >= list.len() {
                return Err(ValidationError::new(
                    direction.as_str(),
                    &format!("index {index} out of range (len {})", list.len()),
                )
                .into());
            }
            list.remove(index);
            Ok(())
        })
    }

    /// The ordered artifact list with computed indices.
    pub fn artifact_list(
        &self,
        scope: &Scope,
        direction: Direction,
    ) -> Result<Vec<(usize, Artifact)>, SowError> {
        let resolved = self.resolve_scope(scope)?;
        let phase = self.state.phase(&resolved.phase)?;
        let list = match (&resolved.task, direction) {
            (None, Direction::Input) => &phase.inputs,
            (None, Direction::Output) => &phase.outputs,
            (Some(id), direction) => {
                let task = phase.task(id).ok_or_else(|| {
                    ValidationError::new("task", &format!("no task with id {id:?}"))
                })?;
                match direction {
                    Direction::Input => &task.inputs,
                    Direction::Output => &task.outputs,
                }
            }
        };
        Ok(list.iter().cloned().enumerate().collect())
    }

    // ---- tasks ----

    /// Create a task in the given (or default) task-supporting phase,
    /// allocating the next gap-numbered id.
    pub fn task_add(
        &mut self,
        phase: Option<&str>,
        name: &str,
        agent: &str,
        dependencies: Vec<String>,
        parallel: bool,
    ) -> Result<String, SowError> {
        let phase = match phase {
            Some(name) => name.to_string(),
            None => {
                let default = self
                    .config
                    .get_default_task_phase(self.state.current_state());
                if default.is_empty() {
                    return Err(ValidationError::new(
                        "task",
                        &format!("project type {:?} has no task-supporting phase", self.config.name),
                    )
                    .into());
                }
                default
            }
        };

        if !self.config.phase_supports_tasks(&phase) {
            return Err(ValidationError::new(
                "task",
                &format!("phase {phase:?} does not support tasks"),
            )
            .into());
        }

        let mut id = String::new();
        let phase_name = phase.clone();
        self.mutate(|state| {
            let p = state.phase_mut(&phase_name)?;
            id = next_task_id(&p.tasks);
            let mut task = Task::new(&id, name, &phase_name, agent);
            task.dependencies = dependencies;
            task.parallel = parallel;
            p.tasks.push(task);
            p.touch();
            Ok(())
        })?;
        tracing::info!(task = %id, phase = %phase, "added task");
        Ok(id)
    }

    pub fn task_abandon(&mut self, id: &str, phase: Option<&str>) -> Result<(), SowError> {
        self.set_task_field(id, phase, "status", "abandoned")
    }

    pub fn task_list(&self, phase: Option<&str>) -> Result<Vec<Task>, SowError> {
        let phase = self.resolve_phase(phase)?;
        Ok(self.state.phase(&phase)?.tasks.clone())
    }

    /// Record a task's session id before its first spawn. The id is
    /// immutable until the task reaches a terminal status.
    pub fn set_task_session(&mut self, id: &str, session_id: &str) -> Result<(), SowError> {
        let phase = self.find_task_phase(id)?;
        self.mutate(|state| {
            let task = state
                .phase_mut(&phase)?
                .task_mut(id)
                .ok_or_else(|| ValidationError::new("task", &format!("no task with id {id:?}")))?;
            match &task.session_id {
                Some(existing) if existing != session_id && !task.status.is_terminal() => {
                    Err(ValidationError::new(
                        "session_id",
                        &format!("task {id} already has session {existing}; it is immutable until the task terminates"),
                    )
                    .into())
                }
                _ => {
                    task.session_id = Some(session_id.to_string());
                    task.touch();
                    Ok(())
                }
            }
        })
    }

    /// Mark a task in progress when a worker is spawned for it.
    pub fn mark_task_started(&mut self, id: &str) -> Result<(), SowError> {
        let phase = self.find_task_phase(id)?;
        self.mutate(|state| {
            let task = state
                .phase_mut(&phase)?
                .task_mut(id)
                .ok_or_else(|| ValidationError::new("task", &format!("no task with id {id:?}")))?;
            if task.status == TaskStatus::Pending {
                task.status = TaskStatus::InProgress;
                task.touch();
            }
            Ok(())
        })
    }

    /// Re-read one task's authoritative document from disk and fold it into
    /// the in-memory index. Used by the coordinator after a worker exits.
    pub fn reload_task(&mut self, id: &str) -> Result<Task, SowError> {
        let phase = self.find_task_phase(id)?;
        let task = store::load_task(&self.root, &phase, id)?;
        if let Some(slot) = self.state.phase_mut(&phase)?.task_mut(id) {
            *slot = task.clone();
        }
        Ok(task)
    }

    // ---- outputs ----

    /// Register a top-level project output. The referenced path must exist
    /// at the moment of registration.
    pub fn register_output(&mut self, kind: &str, path: &str) -> Result<(), SowError> {
        crate::schema::validate_artifact_path(path)
            .map_err(|m| ValidationError::new("path", &m))?;
        if !self.root.join(path).exists() {
            return Err(ValidationError::new(
                "path",
                &format!("registered output {path:?} does not exist under the project root"),
            )
            .into());
        }
        let artifact = Artifact::new(kind, path);
        self.mutate(|state| {
            state.outputs.push(artifact);
            Ok(())
        })
    }

    // ---- advance ----

    /// The one-shot state progression operator; the sole mutator of
    /// `statechart.current_state`. Returns the new state.
    pub fn advance(&mut self) -> Result<String, SowError> {
        let before = self.state.current_state().to_string();
        let mut draft = self.state.clone();

        match self.config.advance(&mut draft) {
            Ok(new_state) => {
                if new_state != before {
                    draft.touch();
                    self.config.validate_project(&draft)?;
                    if let Err(err) = store::save_project_state(&self.root, &draft) {
                        // In-memory transition succeeded but the document on
                        // disk still holds the pre-advance snapshot.
                        tracing::error!(
                            from = %before,
                            to = %new_state,
                            error = %err,
                            "advance transitioned in memory but failed to persist"
                        );
                        return Err(err);
                    }
                    self.state = draft;
                    tracing::info!(from = %before, to = %new_state, "advanced");
                }
                Ok(new_state)
            }
            Err(err @ MachineError::Action(_)) if draft.current_state() != before => {
                // Entry-action failure: the transition stands and the entry
                // action recorded its failure in the document, so persist
                // before surfacing the error.
                draft.touch();
                store::save_project_state(&self.root, &draft)?;
                self.state = draft;
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Orchestrator guidance for the current state, when the type defines
    /// prompt generators.
    pub fn current_prompt(&self) -> Option<String> {
        let state = self.state.current_state();
        self.config
            .prompt_for(state, &self.state)
            .or_else(|| self.config.orchestrator_prompt(&self.state))
    }

    /// Delete the whole project tree. Consumes the project.
    pub fn delete(self) -> Result<(), SowError> {
        std::fs::remove_dir_all(&self.root).map_err(|e| SowError::Persistence {
            path: self.root.clone(),
            source: e,
        })?;
        tracing::info!(root = %self.root.display(), "deleted project");
        Ok(())
    }
}

fn artifacts_mut<'a>(
    state: &'a mut ProjectState,
    scope: &ResolvedScope,
    direction: Direction,
) -> Result<&'a mut Vec<Artifact>, SowError> {
    let phase: &'a mut Phase = state.phase_mut(&scope.phase)?;
    match (&scope.task, direction) {
        (None, Direction::Input) => Ok(&mut phase.inputs),
        (None, Direction::Output) => Ok(&mut phase.outputs),
        (Some(id), direction) => {
            let task = phase
                .task_mut(id)
                .ok_or_else(|| ValidationError::new("task", &format!("no task with id {id:?}")))?;
            Ok(match direction {
                Direction::Input => &mut task.inputs,
                Direction::Output => &mut task.outputs,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::phase::STATUS_IN_PROGRESS;
    use tempfile::tempdir;

    fn registry() -> TypeRegistry {
        TypeRegistry::builtin().unwrap()
    }

    fn create_project(root: &Path) -> Project {
        let registry = registry();
        let config = registry.get("standard").unwrap();
        Project::create(root, config, "auth", "feat/auth", "add auth").unwrap()
    }

    #[test]
    fn create_initializes_phases_and_initial_state() {
        let dir = tempdir().unwrap();
        let project = create_project(dir.path());

        assert_eq!(project.state().current_state(), "PlanningActive");
        assert!(project.state().phases.contains_key("planning"));
        assert!(project.state().phases.contains_key("implementation"));
        assert_eq!(
            project.state().phase("planning").unwrap().status,
            STATUS_IN_PROGRESS
        );
    }

    #[test]
    fn create_twice_fails() {
        let dir = tempdir().unwrap();
        create_project(dir.path());
        let registry = registry();
        let config = registry.get("standard").unwrap();
        let err = Project::create(dir.path(), config, "other", "feat/y", "").unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn load_round_trips() {
        let dir = tempdir().unwrap();
        create_project(dir.path());
        let registry = registry();
        let loaded = Project::load(dir.path(), &registry).unwrap();
        assert_eq!(loaded.state().name, "auth");
    }

    #[test]
    fn load_unregistered_type_is_invariant_violation() {
        let dir = tempdir().unwrap();
        create_project(dir.path());
        let err = Project::load(dir.path(), &TypeRegistry::new()).unwrap_err();
        assert!(matches!(err, SowError::Invariant(_)));
    }

    #[test]
    fn active_phase_defaults_to_state_range() {
        let dir = tempdir().unwrap();
        let project = create_project(dir.path());
        // PlanningActive is planning's start state.
        assert_eq!(project.resolve_phase(None).unwrap(), "planning");
        assert_eq!(
            project.resolve_phase(Some("implementation")).unwrap(),
            "implementation"
        );
    }

    #[test]
    fn artifact_add_set_remove_list() {
        let dir = tempdir().unwrap();
        let mut project = create_project(dir.path());
        let scope = Scope::Phase(None);

        let index = project
            .artifact_add(&scope, Direction::Input, "context", "discovery/a.md", &[])
            .unwrap();
        assert_eq!(index, 0);

        project
            .artifact_set(&scope, Direction::Input, 0, "approved", "true")
            .unwrap();
        let list = project.artifact_list(&scope, Direction::Input).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].1.approved, Some(true));

        project.artifact_remove(&scope, Direction::Input, 0).unwrap();
        assert!(project.artifact_list(&scope, Direction::Input).unwrap().is_empty());
    }

    #[test]
    fn artifact_add_rejects_disallowed_type() {
        let dir = tempdir().unwrap();
        let mut project = create_project(dir.path());
        let err = project
            .artifact_add(&Scope::Phase(None), Direction::Input, "bogus", "x.md", &[])
            .unwrap_err();
        assert!(err.to_string().contains("not allowed"));
        // Rolled back: nothing persisted, nothing in memory.
        assert!(project
            .artifact_list(&Scope::Phase(None), Direction::Input)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn artifact_set_out_of_range_rejected() {
        let dir = tempdir().unwrap();
        let mut project = create_project(dir.path());
        let err = project
            .artifact_set(&Scope::Phase(None), Direction::Output, 3, "approved", "true")
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn add_then_remove_restores_document() {
        let dir = tempdir().unwrap();
        let mut project = create_project(dir.path());
        let scope = Scope::Phase(None);

        project
            .artifact_add(&scope, Direction::Output, "task_list", "planning/tasks.md", &[])
            .unwrap();
        let before = serde_yaml::to_string(
            &project.state().phase("planning").unwrap().outputs,
        )
        .unwrap();

        project
            .artifact_add(&scope, Direction::Output, "task_list", "planning/more.md", &[])
            .unwrap();
        project.artifact_remove(&scope, Direction::Output, 1).unwrap();

        let after = serde_yaml::to_string(
            &project.state().phase("planning").unwrap().outputs,
        )
        .unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn task_add_allocates_gap_numbers_in_default_phase() {
        let dir = tempdir().unwrap();
        let mut project = create_project(dir.path());

        let first = project
            .task_add(None, "wire schema", "implementer", vec![], false)
            .unwrap();
        let second = project
            .task_add(None, "wire handlers", "implementer", vec![], false)
            .unwrap();
        assert_eq!(first, "010");
        assert_eq!(second, "020");

        // standard's only task-supporting phase is implementation.
        let tasks = project.task_list(Some("implementation")).unwrap();
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn task_add_rejected_on_non_supporting_phase() {
        let dir = tempdir().unwrap();
        let mut project = create_project(dir.path());
        let err = project
            .task_add(Some("planning"), "x", "implementer", vec![], false)
            .unwrap_err();
        assert!(err.to_string().contains("does not support tasks"));
    }

    #[test]
    fn session_id_immutable_until_terminal() {
        let dir = tempdir().unwrap();
        let mut project = create_project(dir.path());
        project
            .task_add(None, "a", "implementer", vec![], false)
            .unwrap();

        project.set_task_session("010", "sess-1").unwrap();
        // Same id again is fine (resume).
        project.set_task_session("010", "sess-1").unwrap();
        // A different id is not.
        let err = project.set_task_session("010", "sess-2").unwrap_err();
        assert!(err.to_string().contains("immutable"));

        project.set_task_field("010", None, "status", "completed").unwrap();
        project.set_task_session("010", "sess-2").unwrap();
    }

    #[test]
    fn register_output_requires_existing_path() {
        let dir = tempdir().unwrap();
        let mut project = create_project(dir.path());

        let err = project.register_output("report", "reports/final.md").unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        std::fs::create_dir_all(dir.path().join("reports")).unwrap();
        std::fs::write(dir.path().join("reports/final.md"), "done").unwrap();
        project.register_output("report", "reports/final.md").unwrap();
        assert_eq!(project.state().outputs.len(), 1);
    }

    #[test]
    fn set_and_set_back_restores_document() {
        let dir = tempdir().unwrap();
        let mut project = create_project(dir.path());
        let before = project.state().description.clone();

        project.set_project_field("description", "something else").unwrap();
        project.set_project_field("description", &before).unwrap();
        assert_eq!(project.state().description, before);
    }

    #[test]
    fn failed_mutation_leaves_disk_untouched() {
        let dir = tempdir().unwrap();
        let mut project = create_project(dir.path());
        let on_disk_before = std::fs::read_to_string(store::state_path(dir.path())).unwrap();

        let _ = project
            .artifact_add(&Scope::Phase(None), Direction::Input, "bogus", "x.md", &[])
            .unwrap_err();

        let on_disk_after = std::fs::read_to_string(store::state_path(dir.path())).unwrap();
        assert_eq!(on_disk_before, on_disk_after);
    }
}
