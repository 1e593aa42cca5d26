//! Generic guarded finite-state machine.
//!
//! States and events are strings; the machine itself knows nothing about any
//! particular project type. Guards are pure predicates over the project
//! document, actions mutate it in place, and both run single-threaded on the
//! caller's thread. The machine is built from a `ProjectTypeConfig` and
//! bound to a document only for the duration of a command invocation.

use std::sync::Arc;
use thiserror::Error;

use crate::schema::ProjectState;

/// Pure, side-effect-free predicate consulted before a transition fires.
pub type Guard = Arc<dyn Fn(&ProjectState) -> bool + Send + Sync>;

/// Entry/exit action; mutates the project document in place.
pub type Action = Arc<dyn Fn(&mut ProjectState) -> anyhow::Result<()> + Send + Sync>;

/// Per-state callable consulted by `advance` to select the event to fire.
pub type Determiner = Arc<dyn Fn(&ProjectState) -> Result<String, MachineError> + Send + Sync>;

/// Pure function examining document state and returning a branch value.
pub type Discriminator = Arc<dyn Fn(&ProjectState) -> String + Send + Sync>;

/// Per-state prompt generator used by external prompt-display code.
pub type PromptFn = Arc<dyn Fn(&ProjectState) -> String + Send + Sync>;

/// A single guarded transition.
#[derive(Clone)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub event: String,
    pub description: Option<String>,
    pub guard: Option<Guard>,
    pub guard_description: Option<String>,
    pub on_exit: Option<Action>,
    pub on_entry: Option<Action>,
    /// Phase to mark `failed` instead of `completed` when this transition
    /// exits the phase's end state.
    pub failed_phase: Option<String>,
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("event", &self.event)
            .field("guard", &self.guard_description)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("no transition from state {from} on event {event}")]
    NoTransition { from: String, event: String },

    #[error("guard failed: {description}")]
    GuardFailed { description: String },

    #[error("no event determiner registered for state {state}")]
    NoDeterminer { state: String },

    #[error("no branch defined for discriminator value \"{value}\" from state {state} (available values: {available})")]
    UnmappedDiscriminatorValue {
        value: String,
        state: String,
        /// Valid values, sorted and quoted, comma separated.
        available: String,
    },

    #[error("transition action failed: {0}")]
    Action(#[source] anyhow::Error),
}

/// A live machine over a set of transitions, positioned at one state.
pub struct Machine<'a> {
    transitions: &'a [Transition],
    state: String,
}

impl<'a> Machine<'a> {
    pub fn new(transitions: &'a [Transition], state: &str) -> Self {
        Self {
            transitions,
            state: state.to_string(),
        }
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    fn find(&self, event: &str) -> Result<&'a Transition, MachineError> {
        self.transitions
            .iter()
            .find(|t| t.from == self.state && t.event == event)
            .ok_or_else(|| MachineError::NoTransition {
                from: self.state.clone(),
                event: event.to_string(),
            })
    }

    /// True iff a transition from the current state exists for `event` and
    /// its guard (if any) passes. Runs no actions.
    pub fn can_fire(&self, event: &str, project: &ProjectState) -> Result<bool, MachineError> {
        let transition = self.find(event)?;
        match &transition.guard {
            Some(guard) => Ok(guard(project)),
            None => Ok(true),
        }
    }

    /// Fire `event`: run the transition's exit action, move to the target
    /// state (updating the document's statechart), run the entry action.
    ///
    /// An exit-action error aborts before the state change. An entry-action
    /// error leaves the machine in the target state and surfaces the error;
    /// entry actions are the documented place to record failure, so the
    /// caller persists regardless.
    pub fn fire(&mut self, event: &str, project: &mut ProjectState) -> Result<(), MachineError> {
        let transition = self.find(event)?;

        if let Some(guard) = &transition.guard
            && !guard(project)
        {
            return Err(MachineError::GuardFailed {
                description: transition
                    .guard_description
                    .clone()
                    .unwrap_or_else(|| format!("guard rejected event {event}")),
            });
        }

        if let Some(on_exit) = &transition.on_exit {
            on_exit(project).map_err(MachineError::Action)?;
        }

        self.state = transition.to.clone();
        project.statechart.current_state = transition.to.clone();
        project.statechart.updated_at = chrono::Utc::now();

        if let Some(on_entry) = &transition.on_entry {
            on_entry(project).map_err(MachineError::Action)?;
        }

        Ok(())
    }

    /// Transitions leaving `from`, sorted by event.
    pub fn available_transitions(transitions: &[Transition], from: &str) -> Vec<Transition> {
        let mut out: Vec<Transition> = transitions.iter().filter(|t| t.from == from).cloned().collect();
        out.sort_by(|a, b| a.event.cmp(&b.event));
        out
    }
}
