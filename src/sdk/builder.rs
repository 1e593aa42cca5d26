//! Declarative builder producing a `ProjectTypeConfig`.
//!
//! The builder unifies transitions, branching, event determination, and
//! phase side-effects into one declarative structure consumed by the single
//! `advance` primitive. `build` validates the whole configuration, expands
//! branches into plain transitions plus a synthesized determiner, and
//! returns a fresh immutable config; the builder itself remains usable.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

use crate::machine::{Action, Determiner, Discriminator, Guard, MachineError, PromptFn, Transition};
use crate::schema::ProjectState;

use super::config::{Initializer, PhaseConfig, ProjectTypeConfig};

/// Errors rejected at `build` time.
#[derive(Debug, Error, PartialEq)]
pub enum BuildError {
    #[error("project type {name:?} has no initial state")]
    MissingInitialState { name: String },

    #[error("duplicate transition from {from} on event {event}")]
    DuplicateTransition { from: String, event: String },

    #[error("state {state} already has an event determiner; branches and OnAdvance are mutually exclusive")]
    ConflictingDeterminer { state: String },

    #[error("branch from {state} declares no When paths")]
    EmptyBranch { state: String },

    #[error("branch from {state} uses the empty string as a When value")]
    EmptyBranchValue { state: String },

    #[error("transition from {from} on {event} marks unknown phase {phase:?} as failed")]
    UnknownFailedPhase {
        from: String,
        event: String,
        phase: String,
    },
}

/// Per-transition options: guard, actions, descriptions, failed-phase mark.
#[derive(Clone, Default)]
pub struct TransitionOptions {
    description: Option<String>,
    guard: Option<Guard>,
    guard_description: Option<String>,
    on_entry: Option<Action>,
    on_exit: Option<Action>,
    failed_phase: Option<String>,
}

impl TransitionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard with a human-readable description; the description is surfaced
    /// verbatim in `GuardFailed` errors.
    pub fn with_guard<F>(mut self, description: &str, predicate: F) -> Self
    where
        F: Fn(&ProjectState) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(predicate));
        self.guard_description = Some(description.to_string());
        self
    }

    pub fn with_on_entry<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut ProjectState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_entry = Some(Arc::new(action));
        self
    }

    pub fn with_on_exit<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut ProjectState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_exit = Some(Arc::new(action));
        self
    }

    pub fn with_description(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }

    /// Mark `phase` as `failed` (instead of `completed`) when this
    /// transition exits the phase's end state.
    pub fn with_failed_phase(mut self, phase: &str) -> Self {
        self.failed_phase = Some(phase.to_string());
        self
    }
}

#[derive(Clone)]
struct BranchArm {
    event: String,
    to: String,
    opts: TransitionOptions,
}

/// State-determined branching: a discriminator over the document selects one
/// of several `when` paths.
#[derive(Clone)]
pub struct Branch {
    discriminator: Discriminator,
    arms: BTreeMap<String, BranchArm>,
}

impl Branch {
    pub fn on<F>(discriminator: F) -> Self
    where
        F: Fn(&ProjectState) -> String + Send + Sync + 'static,
    {
        Self {
            discriminator: Arc::new(discriminator),
            arms: BTreeMap::new(),
        }
    }

    /// One branch path. A duplicate value overwrites the prior path (last
    /// wins).
    pub fn when(self, value: &str, event: &str, to: &str) -> Self {
        self.when_with(value, event, to, TransitionOptions::new())
    }

    pub fn when_with(mut self, value: &str, event: &str, to: &str, opts: TransitionOptions) -> Self {
        self.arms.insert(
            value.to_string(),
            BranchArm {
                event: event.to_string(),
                to: to.to_string(),
                opts,
            },
        );
        self
    }
}

#[derive(Clone)]
struct TransitionSpec {
    from: String,
    to: String,
    event: String,
    opts: TransitionOptions,
}

/// Builder for a project type. See the module docs for the vocabulary.
pub struct ProjectTypeBuilder {
    name: String,
    initial_state: Option<String>,
    phases: Vec<PhaseConfig>,
    transitions: Vec<TransitionSpec>,
    determiners: HashMap<String, Determiner>,
    branches: Vec<(String, Branch)>,
    prompts: HashMap<String, PromptFn>,
    orchestrator_prompt: Option<PromptFn>,
    initializer: Option<Initializer>,
    cleanup: Option<Action>,
}

impl ProjectTypeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            initial_state: None,
            phases: Vec::new(),
            transitions: Vec::new(),
            determiners: HashMap::new(),
            branches: Vec::new(),
            prompts: HashMap::new(),
            orchestrator_prompt: None,
            initializer: None,
            cleanup: None,
        }
    }

    pub fn set_initial_state(mut self, state: &str) -> Self {
        self.initial_state = Some(state.to_string());
        self
    }

    pub fn with_phase(mut self, phase: PhaseConfig) -> Self {
        self.phases.push(phase);
        self
    }

    pub fn add_transition(mut self, from: &str, to: &str, event: &str, opts: TransitionOptions) -> Self {
        self.transitions.push(TransitionSpec {
            from: from.to_string(),
            to: to.to_string(),
            event: event.to_string(),
            opts,
        });
        self
    }

    /// Register the determiner `advance` consults in `state`.
    pub fn on_advance<F>(mut self, state: &str, determiner: F) -> Self
    where
        F: Fn(&ProjectState) -> Result<String, MachineError> + Send + Sync + 'static,
    {
        self.determiners.insert(state.to_string(), Arc::new(determiner));
        self
    }

    /// Register state-determined branching from `state`. Expanded at build
    /// time into one transition per `when` path plus a synthesized
    /// determiner.
    pub fn add_branch(mut self, state: &str, branch: Branch) -> Self {
        self.branches.push((state.to_string(), branch));
        self
    }

    pub fn with_prompt<F>(mut self, state: &str, generator: F) -> Self
    where
        F: Fn(&ProjectState) -> String + Send + Sync + 'static,
    {
        self.prompts.insert(state.to_string(), Arc::new(generator));
        self
    }

    pub fn with_orchestrator_prompt<F>(mut self, generator: F) -> Self
    where
        F: Fn(&ProjectState) -> String + Send + Sync + 'static,
    {
        self.orchestrator_prompt = Some(Arc::new(generator));
        self
    }

    /// Called on project creation to populate phases and the starting state.
    pub fn with_initializer<F>(mut self, init: F) -> Self
    where
        F: Fn(&mut ProjectState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(init));
        self
    }

    /// Called when the project reaches the terminal state.
    pub fn with_cleanup<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut ProjectState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.cleanup = Some(Arc::new(action));
        self
    }

    /// Validate and compile into a fresh immutable config. The builder
    /// remains usable; repeated builds are independent.
    pub fn build(&self) -> Result<ProjectTypeConfig, BuildError> {
        let initial_state = self
            .initial_state
            .clone()
            .ok_or_else(|| BuildError::MissingInitialState {
                name: self.name.clone(),
            })?;

        let mut transitions: Vec<Transition> = Vec::new();
        let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
        let mut push = |spec: &TransitionSpec,
                        transitions: &mut Vec<Transition>|
         -> Result<(), BuildError> {
            if !seen.insert((spec.from.clone(), spec.event.clone())) {
                return Err(BuildError::DuplicateTransition {
                    from: spec.from.clone(),
                    event: spec.event.clone(),
                });
            }
            transitions.push(Transition {
                from: spec.from.clone(),
                to: spec.to.clone(),
                event: spec.event.clone(),
                description: spec.opts.description.clone(),
                guard: spec.opts.guard.clone(),
                guard_description: spec.opts.guard_description.clone(),
                on_exit: spec.opts.on_exit.clone(),
                on_entry: spec.opts.on_entry.clone(),
                failed_phase: spec.opts.failed_phase.clone(),
            });
            Ok(())
        };

        for spec in &self.transitions {
            push(spec, &mut transitions)?;
        }

        let mut determiners = self.determiners.clone();
        let mut branching_states: BTreeSet<String> = BTreeSet::new();

        for (state, branch) in &self.branches {
            if determiners.contains_key(state) {
                return Err(BuildError::ConflictingDeterminer { state: state.clone() });
            }
            if branch.arms.is_empty() {
                return Err(BuildError::EmptyBranch { state: state.clone() });
            }
            if branch.arms.contains_key("") {
                return Err(BuildError::EmptyBranchValue { state: state.clone() });
            }

            // BTreeMap iteration gives lexicographic value order, so the
            // emitted transitions are deterministic across builds.
            for arm in branch.arms.values() {
                push(
                    &TransitionSpec {
                        from: state.clone(),
                        to: arm.to.clone(),
                        event: arm.event.clone(),
                        opts: arm.opts.clone(),
                    },
                    &mut transitions,
                )?;
            }

            determiners.insert(state.clone(), synthesize_determiner(state, branch));
            branching_states.insert(state.clone());
        }

        for t in &transitions {
            if let Some(phase) = &t.failed_phase
                && !self.phases.iter().any(|p| &p.name == phase)
            {
                return Err(BuildError::UnknownFailedPhase {
                    from: t.from.clone(),
                    event: t.event.clone(),
                    phase: phase.clone(),
                });
            }
        }

        let mut state_order: Vec<String> = Vec::new();
        let mut states: BTreeSet<String> = BTreeSet::new();
        let mut declare = |state: &str, order: &mut Vec<String>, set: &mut BTreeSet<String>| {
            if set.insert(state.to_string()) {
                order.push(state.to_string());
            }
        };
        declare(&initial_state, &mut state_order, &mut states);
        for t in &transitions {
            declare(&t.from, &mut state_order, &mut states);
            declare(&t.to, &mut state_order, &mut states);
        }
        for phase in &self.phases {
            if let Some(s) = &phase.start_state {
                declare(s, &mut state_order, &mut states);
            }
            if let Some(s) = &phase.end_state {
                declare(s, &mut state_order, &mut states);
            }
        }

        Ok(ProjectTypeConfig {
            name: self.name.clone(),
            initial_state,
            phases: self.phases.clone(),
            transitions,
            determiners,
            branching_states,
            prompts: self.prompts.clone(),
            orchestrator_prompt: self.orchestrator_prompt.clone(),
            initializer: self.initializer.clone(),
            cleanup: self.cleanup.clone(),
            state_order,
            states,
        })
    }
}

/// Determiner synthesized for a branching state: run the discriminator, map
/// the value to its `when` path's event, or fail listing the valid values.
fn synthesize_determiner(state: &str, branch: &Branch) -> Determiner {
    let discriminator = branch.discriminator.clone();
    let events: BTreeMap<String, String> = branch
        .arms
        .iter()
        .map(|(value, arm)| (value.clone(), arm.event.clone()))
        .collect();
    let available = events
        .keys()
        .map(|v| format!("\"{v}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let state = state.to_string();

    Arc::new(move |project: &ProjectState| {
        let value = discriminator(project);
        events
            .get(&value)
            .cloned()
            .ok_or_else(|| MachineError::UnmappedDiscriminatorValue {
                value,
                state: state.clone(),
                available: available.clone(),
            })
    })
}
