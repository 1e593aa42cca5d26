//! Compiled project-type configuration.
//!
//! A `ProjectTypeConfig` is the immutable output of the builder: phases,
//! transitions, event determiners, prompts, and the initializer, plus the
//! introspection surface `advance` and the command layer consume. Configs
//! are long-lived process-wide values, read-only after registration.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::machine::{Action, Determiner, Machine, MachineError, PromptFn, Transition};
use crate::schema::phase::{STATUS_COMPLETED, STATUS_FAILED, STATUS_IN_PROGRESS, STATUS_PENDING};
use crate::schema::{Phase, ProjectState, ValidationError, validate_document};

/// Expected shape of a metadata value in a per-phase metadata schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Bool,
    Integer,
}

/// Optional per-phase schema for phase metadata fields.
#[derive(Debug, Clone, Default)]
pub struct MetadataSchema {
    pub fields: BTreeMap<String, FieldKind>,
}

impl MetadataSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.insert(name.to_string(), kind);
        self
    }

    fn check(
        &self,
        phase: &str,
        metadata: &BTreeMap<String, serde_yaml::Value>,
    ) -> Result<(), ValidationError> {
        for (name, value) in metadata {
            let Some(kind) = self.fields.get(name) else {
                continue;
            };
            let ok = match kind {
                FieldKind::String => value.is_string(),
                FieldKind::Bool => value.is_bool(),
                FieldKind::Integer => value.is_i64() || value.is_u64(),
            };
            if !ok {
                return Err(ValidationError::new(
                    &format!("phases.{phase}.metadata.{name}"),
                    &format!("expected {kind:?} value"),
                ));
            }
        }
        Ok(())
    }
}

/// Declarative description of one phase: its state range, allowed artifact
/// types, and whether it may contain tasks.
#[derive(Clone, Default)]
pub struct PhaseConfig {
    pub name: String,
    pub start_state: Option<String>,
    pub end_state: Option<String>,
    pub input_types: Vec<String>,
    pub output_types: Vec<String>,
    pub supports_tasks: bool,
    pub metadata_schema: Option<MetadataSchema>,
}

impl PhaseConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Entering this state flips the phase from `pending` to `in_progress`.
    pub fn with_start_state(mut self, state: &str) -> Self {
        self.start_state = Some(state.to_string());
        self
    }

    /// Exiting this state marks the phase `completed` (or `failed` when the
    /// fired transition says so).
    pub fn with_end_state(mut self, state: &str) -> Self {
        self.end_state = Some(state.to_string());
        self
    }

    pub fn with_inputs<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Allow the phase to contain tasks.
    pub fn with_tasks(mut self) -> Self {
        self.supports_tasks = true;
        self
    }

    pub fn with_metadata_schema(mut self, schema: MetadataSchema) -> Self {
        self.metadata_schema = Some(schema);
        self
    }
}

/// Project initializer: populates phases and the starting state on creation.
pub type Initializer =
    std::sync::Arc<dyn Fn(&mut ProjectState) -> anyhow::Result<()> + Send + Sync>;

/// Immutable compiled configuration for one project type.
#[derive(Clone)]
pub struct ProjectTypeConfig {
    pub name: String,
    pub initial_state: String,
    pub(crate) phases: Vec<PhaseConfig>,
    pub(crate) transitions: Vec<Transition>,
    pub(crate) determiners: HashMap<String, Determiner>,
    pub(crate) branching_states: BTreeSet<String>,
    pub(crate) prompts: HashMap<String, PromptFn>,
    pub(crate) orchestrator_prompt: Option<PromptFn>,
    pub(crate) initializer: Option<Initializer>,
    pub(crate) cleanup: Option<Action>,
    /// All declared states, in declaration order.
    pub(crate) state_order: Vec<String>,
    pub(crate) states: BTreeSet<String>,
}

impl ProjectTypeConfig {
    // ---- introspection ----

    pub fn is_state(&self, state: &str) -> bool {
        self.states.contains(state)
    }

    pub fn states(&self) -> &[String] {
        &self.state_order
    }

    pub fn phases(&self) -> &[PhaseConfig] {
        &self.phases
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseConfig> {
        self.phases.iter().find(|p| p.name == name)
    }

    pub fn phase_supports_tasks(&self, name: &str) -> bool {
        self.phase(name).map(|p| p.supports_tasks).unwrap_or(false)
    }

    /// Names of task-supporting phases, sorted.
    pub fn get_task_supporting_phases(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .phases
            .iter()
            .filter(|p| p.supports_tasks)
            .map(|p| p.name.clone())
            .collect();
        names.sort();
        names
    }

    /// The phase tasks default into for `current_state`: a task-supporting
    /// phase whose start or end state equals the state, else the first
    /// task-supporting phase alphabetically, else the empty string.
    pub fn get_default_task_phase(&self, current_state: &str) -> String {
        for phase in &self.phases {
            if phase.supports_tasks
                && (phase.start_state.as_deref() == Some(current_state)
                    || phase.end_state.as_deref() == Some(current_state))
            {
                return phase.name.clone();
            }
        }
        self.get_task_supporting_phases()
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    pub fn get_available_transitions(&self, from: &str) -> Vec<Transition> {
        Machine::available_transitions(&self.transitions, from)
    }

    pub fn is_branching_state(&self, state: &str) -> bool {
        self.branching_states.contains(state)
    }

    fn transition(&self, from: &str, event: &str) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|t| t.from == from && t.event == event)
    }

    pub fn get_transition_description(&self, from: &str, event: &str) -> Option<String> {
        self.transition(from, event).and_then(|t| t.description.clone())
    }

    pub fn get_guard_description(&self, from: &str, event: &str) -> Option<String> {
        self.transition(from, event)
            .and_then(|t| t.guard_description.clone())
    }

    pub fn get_target_state(&self, from: &str, event: &str) -> Option<String> {
        self.transition(from, event).map(|t| t.to.clone())
    }

    pub fn prompt_for(&self, state: &str, project: &ProjectState) -> Option<String> {
        self.prompts.get(state).map(|f| f(project))
    }

    pub fn orchestrator_prompt(&self, project: &ProjectState) -> Option<String> {
        self.orchestrator_prompt.as_ref().map(|f| f(project))
    }

    /// Run the type's cleanup action, if any. Called when a project reaches
    /// the terminal state.
    pub fn run_cleanup(&self, project: &mut ProjectState) -> anyhow::Result<()> {
        match &self.cleanup {
            Some(action) => action(project),
            None => Ok(()),
        }
    }

    fn state_index(&self, state: &str) -> Option<usize> {
        self.state_order.iter().position(|s| s == state)
    }

    /// Resolve the *active phase* for a state: the phase whose start..end
    /// state range (inclusive, in declaration order) contains it. A phase
    /// whose start state equals the state wins ties.
    pub fn active_phase(&self, current_state: &str) -> Result<&PhaseConfig, ValidationError> {
        let Some(current_idx) = self.state_index(current_state) else {
            return Err(ValidationError::new(
                "statechart.current_state",
                &format!(
                    "state {current_state:?} is not declared by project type {:?}",
                    self.name
                ),
            ));
        };

        let mut candidates: Vec<&PhaseConfig> = Vec::new();
        for phase in &self.phases {
            let (Some(start), Some(end)) = (&phase.start_state, &phase.end_state) else {
                continue;
            };
            let (Some(start_idx), Some(end_idx)) = (self.state_index(start), self.state_index(end))
            else {
                continue;
            };
            if start_idx <= current_idx && current_idx <= end_idx {
                candidates.push(phase);
            }
        }

        if let Some(exact) = candidates
            .iter()
            .find(|p| p.start_state.as_deref() == Some(current_state))
        {
            return Ok(exact);
        }
        match candidates.len() {
            1 => Ok(candidates[0]),
            0 => Err(ValidationError::new(
                "phase",
                &format!("no phase covers state {current_state:?}; pass --phase explicitly"),
            )),
            _ => Err(ValidationError::new(
                "phase",
                &format!("multiple phases cover state {current_state:?}; pass --phase explicitly"),
            )),
        }
    }

    // ---- initialization ----

    /// Populate a fresh document: run the initializer, then make sure every
    /// declared phase exists.
    pub fn initialize(&self, project: &mut ProjectState) -> anyhow::Result<()> {
        if let Some(init) = &self.initializer {
            init(project)?;
        }
        for phase in &self.phases {
            project
                .phases
                .entry(phase.name.clone())
                .or_insert_with(|| Phase::new(&phase.name));
        }
        Ok(())
    }

    // ---- validation ----

    /// Validate a document against the schema and this config: declared
    /// state, known phases, task support, allowed artifact types, metadata
    /// schemas.
    pub fn validate_project(&self, state: &ProjectState) -> Result<(), ValidationError> {
        validate_document(state)?;

        if !self.is_state(state.current_state()) {
            return Err(ValidationError::new(
                "statechart.current_state",
                &format!(
                    "state {:?} is not declared by project type {:?}",
                    state.current_state(),
                    self.name
                ),
            ));
        }

        for (name, phase) in &state.phases {
            let Some(config) = self.phase(name) else {
                return Err(ValidationError::new(
                    &format!("phases.{name}"),
                    &format!("phase {name:?} is not declared by project type {:?}", self.name),
                ));
            };

            if !phase.tasks.is_empty() && !config.supports_tasks {
                return Err(ValidationError::new(
                    &format!("phases.{name}.tasks"),
                    &format!("phase {name:?} does not support tasks"),
                ));
            }

            self.check_artifact_types(name, "inputs", &config.input_types, &phase.inputs)?;
            self.check_artifact_types(name, "outputs", &config.output_types, &phase.outputs)?;

            for task in &phase.tasks {
                self.check_artifact_types(name, "inputs", &config.input_types, &task.inputs)?;
                self.check_artifact_types(name, "outputs", &config.output_types, &task.outputs)?;
            }

            if let Some(schema) = &config.metadata_schema {
                schema.check(name, &phase.metadata)?;
            }
        }

        Ok(())
    }

    fn check_artifact_types(
        &self,
        phase: &str,
        direction: &str,
        allowed: &[String],
        artifacts: &[crate::schema::Artifact],
    ) -> Result<(), ValidationError> {
        for artifact in artifacts {
            if !allowed.iter().any(|t| t == &artifact.kind) {
                return Err(ValidationError::new(
                    &format!("phases.{phase}.{direction}"),
                    &format!(
                        "artifact type {:?} is not allowed for {direction} of phase {phase:?} (allowed: {})",
                        artifact.kind,
                        if allowed.is_empty() {
                            "none".to_string()
                        } else {
                            allowed.join(", ")
                        }
                    ),
                ));
            }
        }
        Ok(())
    }

    // ---- advance ----

    /// One-shot state progression: consult the state's determiner, fire the
    /// selected event with phase-status side-effects, return the new state.
    ///
    /// A terminal state (no determiner, no outgoing transitions) is a no-op
    /// returning the current state. An entry-action failure leaves the
    /// document in the target state and surfaces the error; the caller is
    /// expected to persist regardless.
    pub fn advance(&self, project: &mut ProjectState) -> Result<String, MachineError> {
        let current = project.current_state().to_string();

        let Some(determiner) = self.determiners.get(&current) else {
            if self.get_available_transitions(&current).is_empty() {
                tracing::debug!(state = %current, "advance on terminal state is a no-op");
                return Ok(current);
            }
            return Err(MachineError::NoDeterminer { state: current });
        };

        let event = determiner(project)?;
        let mut machine = Machine::new(&self.transitions, &current);
        self.fire_with_phase_updates(&mut machine, &event, project)?;
        Ok(machine.state().to_string())
    }

    /// `fire` wrapped with the phase-status side-effects: exiting a phase's
    /// end state marks it `completed` (or `failed` if the transition says
    /// so, never downgrading an existing `failed`); entering a phase's start
    /// state moves it from `pending` to `in_progress`.
    pub fn fire_with_phase_updates(
        &self,
        machine: &mut Machine<'_>,
        event: &str,
        project: &mut ProjectState,
    ) -> Result<(), MachineError> {
        let from = machine.state().to_string();
        let Some(transition) = self.transition(&from, event) else {
            return Err(MachineError::NoTransition {
                from,
                event: event.to_string(),
            });
        };
        let to = transition.to.clone();
        let failed_phase = transition.failed_phase.clone();

        let result = machine.fire(event, project);
        let entered_target = machine.state() == to;
        match &result {
            Ok(()) => {}
            // Entry actions record failure into the document; the state
            // change stands and the phase side-effects still apply.
            Err(MachineError::Action(_)) if entered_target => {}
            Err(_) => return result,
        }

        if from != to {
            self.apply_phase_updates(&from, &to, failed_phase.as_deref(), project);
        }

        result
    }

    fn apply_phase_updates(
        &self,
        exited: &str,
        entered: &str,
        failed_phase: Option<&str>,
        project: &mut ProjectState,
    ) {
        for config in &self.phases {
            if config.end_state.as_deref() == Some(exited)
                && let Ok(phase) = project.phase_mut(&config.name)
                && phase.status != STATUS_FAILED
            {
                phase.status = if failed_phase == Some(config.name.as_str()) {
                    STATUS_FAILED.to_string()
                } else {
                    STATUS_COMPLETED.to_string()
                };
                phase.touch();
            }

            if config.start_state.as_deref() == Some(entered)
                && let Ok(phase) = project.phase_mut(&config.name)
                && phase.status == STATUS_PENDING
            {
                phase.status = STATUS_IN_PROGRESS.to_string();
                phase.touch();
            }
        }
    }

    /// True when every task of the phase reached a terminal status.
    pub fn phase_tasks_settled(phase: &Phase) -> bool {
        !phase.tasks.is_empty() && phase.tasks.iter().all(|t| t.status.is_terminal())
    }
}

impl std::fmt::Debug for ProjectTypeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectTypeConfig")
            .field("name", &self.name)
            .field("initial_state", &self.initial_state)
            .field("states", &self.state_order)
            .field("transitions", &self.transitions.len())
            .finish()
    }
}
