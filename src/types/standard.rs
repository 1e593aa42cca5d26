//! The built-in "standard" project type.
//!
//! Four phases over six states:
//!
//! ```text
//! PlanningActive --EventPlanApproved--> ImplementationPlanning
//!   --EventTasksReady--> ImplementationActive
//!   --EventImplementationComplete--> ReviewActive
//!     --EventReviewPass--> FinalizeChecks --EventFinalized--> NoProject
//!     --EventReviewFail--> ImplementationPlanning   (review marked failed)
//! ```
//!
//! The review branch discriminates on the approved review artifact's
//! `metadata.assessment` value.

use crate::schema::{Phase, ProjectState, phase::STATUS_IN_PROGRESS};
use crate::sdk::{
    Branch, BuildError, PhaseConfig, ProjectTypeBuilder, ProjectTypeConfig, TransitionOptions,
};

pub const STATE_PLANNING_ACTIVE: &str = "PlanningActive";
pub const STATE_IMPLEMENTATION_PLANNING: &str = "ImplementationPlanning";
pub const STATE_IMPLEMENTATION_ACTIVE: &str = "ImplementationActive";
pub const STATE_REVIEW_ACTIVE: &str = "ReviewActive";
pub const STATE_FINALIZE_CHECKS: &str = "FinalizeChecks";
pub const STATE_NO_PROJECT: &str = "NoProject";

pub const EVENT_PLAN_APPROVED: &str = "EventPlanApproved";
pub const EVENT_TASKS_READY: &str = "EventTasksReady";
pub const EVENT_IMPLEMENTATION_COMPLETE: &str = "EventImplementationComplete";
pub const EVENT_REVIEW_PASS: &str = "EventReviewPass";
pub const EVENT_REVIEW_FAIL: &str = "EventReviewFail";
pub const EVENT_FINALIZED: &str = "EventFinalized";

fn planning_has_approved_task_list(project: &ProjectState) -> bool {
    project
        .phases
        .get("planning")
        .map(|p| {
            p.outputs
                .iter()
                .any(|a| a.kind == "task_list" && a.is_approved())
        })
        .unwrap_or(false)
}

fn implementation_has_tasks(project: &ProjectState) -> bool {
    project
        .phases
        .get("implementation")
        .map(|p| !p.tasks.is_empty())
        .unwrap_or(false)
}

fn implementation_tasks_settled(project: &ProjectState) -> bool {
    project
        .phases
        .get("implementation")
        .map(ProjectTypeConfig::phase_tasks_settled)
        .unwrap_or(false)
}

/// Assessment recorded on the approved review output, or "" when absent.
fn review_assessment(project: &ProjectState) -> String {
    project
        .phases
        .get("review")
        .and_then(|p| p.outputs.iter().find(|a| a.kind == "review" && a.is_approved()))
        .map(|a| a.metadata_str("assessment"))
        .unwrap_or_default()
}

fn initialize(project: &mut ProjectState) -> anyhow::Result<()> {
    for name in ["planning", "implementation", "review", "finalize"] {
        project.phases.insert(name.to_string(), Phase::new(name));
    }
    // The initial state is planning's start state; entry via a transition
    // never happens for it, so the initializer flips the status itself.
    if let Some(planning) = project.phases.get_mut("planning") {
        planning.status = STATUS_IN_PROGRESS.to_string();
    }
    Ok(())
}

fn orchestrator_prompt(project: &ProjectState) -> String {
    format!(
        "Project {name} ({branch}) is in state {state}.\n\
         Inspect the active phase with `sow task list` and `sow output list`, record\n\
         artifacts as they are produced, and call `sow advance` once the phase's\n\
         outputs are approved.",
        name = project.name,
        branch = project.branch,
        state = project.current_state(),
    )
}

/// Build the standard project type.
pub fn standard_type() -> Result<ProjectTypeConfig, BuildError> {
    ProjectTypeBuilder::new("standard")
        .set_initial_state(STATE_PLANNING_ACTIVE)
        .with_phase(
            PhaseConfig::new("planning")
                .with_start_state(STATE_PLANNING_ACTIVE)
                .with_end_state(STATE_PLANNING_ACTIVE)
                .with_inputs(["context"])
                .with_outputs(["task_list", "design"]),
        )
        .with_phase(
            PhaseConfig::new("implementation")
                .with_start_state(STATE_IMPLEMENTATION_PLANNING)
                .with_end_state(STATE_IMPLEMENTATION_ACTIVE)
                .with_inputs(["task_list", "context"])
                .with_outputs(["code", "summary"])
                .with_tasks(),
        )
        .with_phase(
            PhaseConfig::new("review")
                .with_start_state(STATE_REVIEW_ACTIVE)
                .with_end_state(STATE_REVIEW_ACTIVE)
                .with_inputs(["summary", "code"])
                .with_outputs(["review"]),
        )
        .with_phase(
            PhaseConfig::new("finalize")
                .with_start_state(STATE_FINALIZE_CHECKS)
                .with_end_state(STATE_FINALIZE_CHECKS)
                .with_inputs(["review"])
                .with_outputs(["report"]),
        )
        .add_transition(
            STATE_PLANNING_ACTIVE,
            STATE_IMPLEMENTATION_PLANNING,
            EVENT_PLAN_APPROVED,
            TransitionOptions::new()
                .with_description("approve the plan and start implementation planning")
                .with_guard(
                    "planning has an approved task list output",
                    planning_has_approved_task_list,
                ),
        )
        .on_advance(STATE_PLANNING_ACTIVE, |_| Ok(EVENT_PLAN_APPROVED.to_string()))
        .add_transition(
            STATE_IMPLEMENTATION_PLANNING,
            STATE_IMPLEMENTATION_ACTIVE,
            EVENT_TASKS_READY,
            TransitionOptions::new()
                .with_description("task breakdown is ready; start implementing")
                .with_guard(
                    "implementation phase has at least one task",
                    implementation_has_tasks,
                ),
        )
        .on_advance(STATE_IMPLEMENTATION_PLANNING, |_| {
            Ok(EVENT_TASKS_READY.to_string())
        })
        .add_transition(
            STATE_IMPLEMENTATION_ACTIVE,
            STATE_REVIEW_ACTIVE,
            EVENT_IMPLEMENTATION_COMPLETE,
            TransitionOptions::new()
                .with_description("all tasks settled; hand off to review")
                .with_guard(
                    "every implementation task is completed or abandoned",
                    implementation_tasks_settled,
                ),
        )
        .on_advance(STATE_IMPLEMENTATION_ACTIVE, |_| {
            Ok(EVENT_IMPLEMENTATION_COMPLETE.to_string())
        })
        .add_branch(
            STATE_REVIEW_ACTIVE,
            Branch::on(review_assessment)
                .when_with(
                    "pass",
                    EVENT_REVIEW_PASS,
                    STATE_FINALIZE_CHECKS,
                    TransitionOptions::new()
                        .with_description("review passed; run finalize checks"),
                )
                .when_with(
                    "fail",
                    EVENT_REVIEW_FAIL,
                    STATE_IMPLEMENTATION_PLANNING,
                    TransitionOptions::new()
                        .with_description("review failed; plan the rework")
                        .with_failed_phase("review"),
                ),
        )
        .add_transition(
            STATE_FINALIZE_CHECKS,
            STATE_NO_PROJECT,
            EVENT_FINALIZED,
            TransitionOptions::new().with_description("project is finished"),
        )
        .on_advance(STATE_FINALIZE_CHECKS, |_| Ok(EVENT_FINALIZED.to_string()))
        .with_prompt(STATE_PLANNING_ACTIVE, |p| {
            format!(
                "Plan the work for {:?}: gather context inputs, produce a task_list\n\
                 output under planning/, and approve it when it is ready.",
                p.description
            )
        })
        .with_prompt(STATE_IMPLEMENTATION_PLANNING, |_| {
            "Break the approved plan into tasks (`sow task add`), wiring dependencies\n\
             between them, then advance."
                .to_string()
        })
        .with_prompt(STATE_IMPLEMENTATION_ACTIVE, |_| {
            "Spawn workers for pending tasks (`sow agent spawn implementer <id>`) and\n\
             advance once every task is completed or abandoned."
                .to_string()
        })
        .with_prompt(STATE_REVIEW_ACTIVE, |_| {
            "Spawn a reviewer, record its verdict as an approved review output with an\n\
             assessment of \"pass\" or \"fail\", then advance."
                .to_string()
        })
        .with_prompt(STATE_FINALIZE_CHECKS, |_| {
            "Run the finalize checks, record the report output, then advance to close\n\
             out the project."
                .to_string()
        })
        .with_orchestrator_prompt(orchestrator_prompt)
        .with_initializer(initialize)
        .build()
}
