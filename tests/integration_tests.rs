//! Integration tests for sow
//!
//! These tests drive the binary end to end: project creation, artifact
//! bookkeeping, task lifecycle, state progression through the standard
//! project type, and worker spawning against a scripted stand-in CLI.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a sow Command
fn sow(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("sow");
    cmd.current_dir(dir.path());
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Create a project of the standard type on a feature branch.
fn new_project(dir: &TempDir) {
    sow(dir)
        .args(["project", "new", "--branch", "feat/x", "add auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PlanningActive"));
}

fn state_yaml(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join(".sow/state.yaml")).unwrap()
}

/// Drive a fresh project into ReviewActive: approve the plan, add and
/// complete a task, advance three times.
fn drive_to_review(dir: &TempDir) {
    new_project(dir);
    sow(dir)
        .args(["output", "add", "--type", "task_list", "--path", "planning/tasks.md"])
        .assert()
        .success();
    sow(dir)
        .args(["output", "set", "--index", "0", "approved", "true"])
        .assert()
        .success();
    sow(dir).arg("advance").assert().success();
    sow(dir).args(["task", "add", "wire schema"]).assert().success();
    sow(dir).arg("advance").assert().success();
    sow(dir)
        .args(["task", "set", "--id", "010", "status", "completed"])
        .assert()
        .success();
    sow(dir).arg("advance").assert().success();
    assert!(state_yaml(dir).contains("current_state: ReviewActive"));
}

/// Record an approved review output with the given assessment.
fn record_review(dir: &TempDir, assessment: &str) {
    sow(dir)
        .args(["output", "add", "--type", "review", "--path", "review/r1.md"])
        .assert()
        .success();
    sow(dir)
        .args(["output", "set", "--index", "0", "approved", "true"])
        .assert()
        .success();
    sow(dir)
        .args(["output", "set", "--index", "0", "assessment", assessment])
        .assert()
        .success();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_sow_help() {
        cargo_bin_cmd!("sow").arg("--help").assert().success();
    }

    #[test]
    fn test_sow_version() {
        cargo_bin_cmd!("sow").arg("--version").assert().success();
    }

    #[test]
    fn test_commands_without_project_fail_cleanly() {
        let dir = create_temp_project();
        sow(&dir)
            .arg("advance")
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("no project found"));
    }
}

// =============================================================================
// Project lifecycle
// =============================================================================

mod project_lifecycle {
    use super::*;

    #[test]
    fn test_project_new_creates_structure() {
        let dir = create_temp_project();
        new_project(&dir);

        assert!(dir.path().join(".sow/state.yaml").exists());
        assert!(dir.path().join(".sow/context").exists());

        let yaml = state_yaml(&dir);
        assert!(yaml.contains("type: standard"));
        assert!(yaml.contains("branch: feat/x"));
        assert!(yaml.contains("current_state: PlanningActive"));
        assert!(yaml.contains("description: add auth"));
    }

    #[test]
    fn test_project_new_twice_fails() {
        let dir = create_temp_project();
        new_project(&dir);
        sow(&dir)
            .args(["project", "new", "--branch", "feat/x", "again"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_project_continue_shows_state_and_guidance() {
        let dir = create_temp_project();
        new_project(&dir);
        sow(&dir)
            .args(["project", "continue"])
            .assert()
            .success()
            .stdout(predicate::str::contains("PlanningActive"))
            .stdout(predicate::str::contains("planning"));
    }

    #[test]
    fn test_project_set_routes_to_metadata() {
        let dir = create_temp_project();
        new_project(&dir);
        sow(&dir)
            .args(["project", "set", "priority", "high"])
            .assert()
            .success();
        assert!(state_yaml(&dir).contains("priority: high"));
    }

    #[test]
    fn test_project_set_rejects_managed_field() {
        let dir = create_temp_project();
        new_project(&dir);
        sow(&dir)
            .args(["project", "set", "name", "other"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("managed by the engine"));
    }

    #[test]
    fn test_project_delete_requires_force() {
        let dir = create_temp_project();
        new_project(&dir);
        sow(&dir)
            .args(["project", "delete"])
            .assert()
            .failure()
            .code(1);
        sow(&dir)
            .args(["project", "delete", "--force"])
            .assert()
            .success();
        assert!(!dir.path().join(".sow").exists());
    }

    #[test]
    fn test_issue_seeding_without_tracker_fails() {
        let dir = create_temp_project();
        sow(&dir)
            .args(["project", "new", "--branch", "feat/x", "--issue", "42", "add auth"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("no work tracker configured"));
    }
}

// =============================================================================
// Artifacts
// =============================================================================

mod artifacts {
    use super::*;

    #[test]
    fn test_input_add_and_list() {
        let dir = create_temp_project();
        new_project(&dir);

        sow(&dir)
            .args(["input", "add", "--type", "context", "--path", "discovery/a.md"])
            .assert()
            .success();
        sow(&dir)
            .args(["input", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[0] type=context path=discovery/a.md"));
    }

    #[test]
    fn test_output_set_metadata_routing() {
        let dir = create_temp_project();
        new_project(&dir);
        sow(&dir)
            .args(["output", "add", "--type", "task_list", "--path", "planning/tasks.md"])
            .assert()
            .success();

        // Unknown field routes to metadata; explicit prefix and direct
        // fields keep working.
        sow(&dir)
            .args(["output", "set", "--index", "0", "assessment", "pass"])
            .assert()
            .success();
        sow(&dir)
            .args(["output", "set", "--index", "0", "metadata.reviewer", "alice"])
            .assert()
            .success();
        sow(&dir)
            .args(["output", "set", "--index", "0", "approved", "true"])
            .assert()
            .success();

        let yaml = state_yaml(&dir);
        assert!(yaml.contains("assessment: pass"));
        assert!(yaml.contains("reviewer: alice"));
        assert!(yaml.contains("approved: true"));
    }

    #[test]
    fn test_artifact_type_must_be_allowed() {
        let dir = create_temp_project();
        new_project(&dir);
        sow(&dir)
            .args(["input", "add", "--type", "bogus", "--path", "x.md"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("not allowed"));
    }

    #[test]
    fn test_artifact_path_must_stay_inside_project() {
        let dir = create_temp_project();
        new_project(&dir);
        sow(&dir)
            .args(["input", "add", "--type", "context", "--path", "../escape.md"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains(".."));
    }

    #[test]
    fn test_artifact_set_out_of_range() {
        let dir = create_temp_project();
        new_project(&dir);
        sow(&dir)
            .args(["output", "set", "--index", "3", "approved", "true"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("out of range"));
    }

    #[test]
    fn test_artifact_remove_shifts_indices() {
        let dir = create_temp_project();
        new_project(&dir);
        for path in ["planning/a.md", "planning/b.md"] {
            sow(&dir)
                .args(["output", "add", "--type", "task_list", "--path", path])
                .assert()
                .success();
        }
        sow(&dir)
            .args(["output", "remove", "--index", "0"])
            .assert()
            .success();
        sow(&dir)
            .args(["output", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[0] type=task_list path=planning/b.md"));
    }

    #[test]
    fn test_add_accepts_extra_field_assignments() {
        let dir = create_temp_project();
        new_project(&dir);
        sow(&dir)
            .args([
                "output", "add", "--type", "task_list", "--path", "planning/tasks.md",
                "approved=true", "author=planner",
            ])
            .assert()
            .success();

        let yaml = state_yaml(&dir);
        assert!(yaml.contains("approved: true"));
        assert!(yaml.contains("author: planner"));
    }
}

// =============================================================================
// Tasks
// =============================================================================

mod tasks {
    use super::*;

    fn project_in_implementation_planning(dir: &TempDir) {
        new_project(dir);
        sow(dir)
            .args(["output", "add", "--type", "task_list", "--path", "planning/tasks.md"])
            .assert()
            .success();
        sow(dir)
            .args(["output", "set", "--index", "0", "approved", "true"])
            .assert()
            .success();
        sow(dir).arg("advance").assert().success();
    }

    #[test]
    fn test_task_add_gap_numbering() {
        let dir = create_temp_project();
        project_in_implementation_planning(&dir);

        sow(&dir)
            .args(["task", "add", "first"])
            .assert()
            .success()
            .stdout(predicate::str::contains("010"));
        sow(&dir)
            .args(["task", "add", "second"])
            .assert()
            .success()
            .stdout(predicate::str::contains("020"));

        // Per-task documents exist.
        assert!(dir
            .path()
            .join(".sow/phases/implementation/tasks/010/state.yaml")
            .exists());
        assert!(dir
            .path()
            .join(".sow/phases/implementation/tasks/020/state.yaml")
            .exists());
    }

    #[test]
    fn test_task_add_on_non_supporting_phase_fails() {
        let dir = create_temp_project();
        project_in_implementation_planning(&dir);
        sow(&dir)
            .args(["task", "add", "x", "--phase", "planning"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("does not support tasks"));
    }

    #[test]
    fn test_task_list_and_abandon() {
        let dir = create_temp_project();
        project_in_implementation_planning(&dir);
        sow(&dir).args(["task", "add", "first"]).assert().success();

        sow(&dir)
            .args(["task", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("pending"));

        sow(&dir)
            .args(["task", "abandon", "--id", "010"])
            .assert()
            .success();
        sow(&dir)
            .args(["task", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("abandoned"));
    }

    #[test]
    fn test_task_artifacts_require_id() {
        let dir = create_temp_project();
        project_in_implementation_planning(&dir);
        sow(&dir).args(["task", "add", "first"]).assert().success();

        sow(&dir)
            .args(["task", "output", "add", "--type", "code", "--path", "src/auth.rs"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("--id"));

        sow(&dir)
            .args([
                "task", "output", "add", "--id", "010", "--type", "code", "--path", "src/auth.rs",
            ])
            .assert()
            .success();
        sow(&dir)
            .args(["task", "output", "list", "--id", "010"])
            .assert()
            .success()
            .stdout(predicate::str::contains("src/auth.rs"));
    }

    #[test]
    fn test_task_dependencies_and_parallel() {
        let dir = create_temp_project();
        project_in_implementation_planning(&dir);
        sow(&dir).args(["task", "add", "first"]).assert().success();
        sow(&dir)
            .args(["task", "add", "second", "--deps", "010", "--parallel"])
            .assert()
            .success();

        let task = fs::read_to_string(
            dir.path()
                .join(".sow/phases/implementation/tasks/020/state.yaml"),
        )
        .unwrap();
        assert!(task.contains("- '010'") || task.contains("- \"010\"") || task.contains("- 010"));
        assert!(task.contains("parallel: true"));
    }
}

// =============================================================================
// State progression
// =============================================================================

mod progression {
    use super::*;

    #[test]
    fn test_advance_blocked_by_guard() {
        let dir = create_temp_project();
        new_project(&dir);
        sow(&dir)
            .arg("advance")
            .assert()
            .failure()
            .code(5)
            .stderr(predicate::str::contains(
                "planning has an approved task list output",
            ));
    }

    #[test]
    fn test_planning_to_implementation() {
        let dir = create_temp_project();
        new_project(&dir);
        sow(&dir)
            .args(["input", "add", "--type", "context", "--path", "discovery/a.md"])
            .assert()
            .success();
        sow(&dir)
            .args(["output", "add", "--type", "task_list", "--path", "planning/tasks.md"])
            .assert()
            .success();
        sow(&dir)
            .args(["output", "set", "--index", "0", "approved", "true"])
            .assert()
            .success();
        sow(&dir)
            .arg("advance")
            .assert()
            .success()
            .stdout(predicate::str::contains("ImplementationPlanning"));

        let yaml = state_yaml(&dir);
        assert!(yaml.contains("current_state: ImplementationPlanning"));
        // Phase side-effects: planning completed, implementation started.
        assert!(yaml.contains("status: completed"));
        assert!(yaml.contains("status: in_progress"));
    }

    #[test]
    fn test_review_pass_path() {
        let dir = create_temp_project();
        drive_to_review(&dir);
        record_review(&dir, "pass");

        sow(&dir)
            .arg("advance")
            .assert()
            .success()
            .stdout(predicate::str::contains("FinalizeChecks"));
        assert!(state_yaml(&dir).contains("current_state: FinalizeChecks"));
    }

    #[test]
    fn test_review_fail_path_marks_review_failed() {
        let dir = create_temp_project();
        drive_to_review(&dir);
        record_review(&dir, "fail");

        sow(&dir)
            .arg("advance")
            .assert()
            .success()
            .stdout(predicate::str::contains("ImplementationPlanning"));

        let yaml = state_yaml(&dir);
        assert!(yaml.contains("current_state: ImplementationPlanning"));
        assert!(yaml.contains("status: failed"));
    }

    #[test]
    fn test_review_unknown_assessment_lists_values() {
        let dir = create_temp_project();
        drive_to_review(&dir);
        record_review(&dir, "unknown");

        sow(&dir)
            .arg("advance")
            .assert()
            .failure()
            .code(5)
            .stderr(predicate::str::contains(
                "no branch defined for discriminator value \"unknown\" from state ReviewActive (available values: \"fail\", \"pass\")",
            ));
    }

    #[test]
    fn test_terminal_state_advance_is_noop() {
        let dir = create_temp_project();
        drive_to_review(&dir);
        record_review(&dir, "pass");
        sow(&dir).arg("advance").assert().success();
        sow(&dir)
            .arg("advance")
            .assert()
            .success()
            .stdout(predicate::str::contains("NoProject"));
        sow(&dir)
            .arg("advance")
            .assert()
            .success()
            .stdout(predicate::str::contains("no-op"));
    }
}

// =============================================================================
// Worker spawning
// =============================================================================

mod workers {
    use super::*;

    /// Install a stand-in worker CLI that marks task 010 as needs_review,
    /// the way a well-behaved worker would through the command surface.
    fn install_fake_worker(dir: &TempDir) -> std::path::PathBuf {
        let script = dir.path().join("fake-worker.sh");
        fs::write(
            &script,
            "#!/bin/sh\n\
             cat > /dev/null\n\
             sed -i 's/^status: in_progress$/status: needs_review/' \
             .sow/phases/implementation/tasks/010/state.yaml\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        }
        script
    }

    fn project_with_task(dir: &TempDir) {
        new_project(dir);
        sow(dir)
            .args(["output", "add", "--type", "task_list", "--path", "planning/tasks.md"])
            .assert()
            .success();
        sow(dir)
            .args(["output", "set", "--index", "0", "approved", "true"])
            .assert()
            .success();
        sow(dir).arg("advance").assert().success();
        sow(dir).args(["task", "add", "wire schema"]).assert().success();
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_persists_session_and_reads_status() {
        let dir = create_temp_project();
        project_with_task(&dir);
        let script = install_fake_worker(&dir);

        sow(&dir)
            .env("SOW_CLAUDE_CMD", script.to_str().unwrap())
            .args(["agent", "spawn", "implementer", "010"])
            .assert()
            .success()
            .stdout(predicate::str::contains("ready for review"));

        let task = fs::read_to_string(
            dir.path()
                .join(".sow/phases/implementation/tasks/010/state.yaml"),
        )
        .unwrap();
        assert!(task.contains("status: needs_review"));
        assert!(task.contains("session_id:"));
    }

    #[test]
    fn test_spawn_unknown_agent_fails() {
        let dir = create_temp_project();
        project_with_task(&dir);
        sow(&dir)
            .args(["agent", "spawn", "welder", "010"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("unknown agent role"));
    }

    #[test]
    fn test_spawn_missing_executable_is_executor_error() {
        let dir = create_temp_project();
        project_with_task(&dir);
        sow(&dir)
            .env("SOW_CLAUDE_CMD", "/nonexistent/claude-cli")
            .args(["agent", "spawn", "implementer", "010"])
            .assert()
            .failure()
            .code(4)
            .stderr(predicate::str::contains("failed to launch"));
    }

    #[test]
    fn test_resume_without_session_fails() {
        let dir = create_temp_project();
        project_with_task(&dir);
        sow(&dir)
            .args(["agent", "resume", "implementer", "010"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("no session to resume"));
    }
}
