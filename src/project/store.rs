//! On-disk layout and atomic persistence of the project tree.
//!
//! Layout under the project root:
//!
//! ```text
//! <root>/
//!   state.yaml                              # project document
//!   phases/<phase>/tasks/<id>/state.yaml    # per-task document (authoritative)
//!   phases/<phase>/tasks/<id>/feedback/<n>.md
//!   context/                                # artifacts copied from upstream
//! ```
//!
//! Every write goes through a sibling temp file, fsync, and an atomic
//! rename; readers open-then-read a single file and never observe a partial
//! document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::SowError;
use crate::schema::{ProjectState, Task};

pub const STATE_FILE: &str = "state.yaml";

pub fn state_path(root: &Path) -> PathBuf {
    root.join(STATE_FILE)
}

pub fn phases_dir(root: &Path) -> PathBuf {
    root.join("phases")
}

pub fn task_dir(root: &Path, phase: &str, task_id: &str) -> PathBuf {
    phases_dir(root).join(phase).join("tasks").join(task_id)
}

pub fn task_state_path(root: &Path, phase: &str, task_id: &str) -> PathBuf {
    task_dir(root, phase, task_id).join(STATE_FILE)
}

pub fn feedback_dir(root: &Path, phase: &str, task_id: &str) -> PathBuf {
    task_dir(root, phase, task_id).join("feedback")
}

pub fn context_dir(root: &Path) -> PathBuf {
    root.join("context")
}

fn persistence_error(path: &Path, source: std::io::Error) -> SowError {
    SowError::Persistence {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `contents` to `path` via a sibling temp file and atomic rename.
pub fn atomic_write(path: &Path, contents: &str) -> Result<(), SowError> {
    let parent = path
        .parent()
        .ok_or_else(|| persistence_error(path, std::io::Error::other("path has no parent")))?;
    fs::create_dir_all(parent).map_err(|e| persistence_error(parent, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| persistence_error(path, std::io::Error::other("path has no file name")))?;
    let tmp = parent.join(format!(".{}.tmp-{}", file_name, std::process::id()));

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(persistence_error(path, e));
    }
    Ok(())
}

fn to_yaml<T: serde::Serialize>(path: &Path, value: &T) -> Result<String, SowError> {
    serde_yaml::to_string(value)
        .map_err(|e| persistence_error(path, std::io::Error::other(e.to_string())))
}

/// Persist the full project tree: per-task documents first, then the
/// consolidated project document (the linearization point for readers).
pub fn save_project_state(root: &Path, state: &ProjectState) -> Result<(), SowError> {
    for phase in state.phases.values() {
        for task in &phase.tasks {
            let path = task_state_path(root, &phase.name, &task.id);
            atomic_write(&path, &to_yaml(&path, task)?)?;
        }
    }

    let path = state_path(root);
    atomic_write(&path, &to_yaml(&path, state)?)?;
    tracing::debug!(path = %path.display(), state = %state.current_state(), "persisted project document");
    Ok(())
}

/// Persist one task document without touching the rest of the tree.
pub fn save_task(root: &Path, task: &Task) -> Result<(), SowError> {
    let path = task_state_path(root, &task.phase, &task.id);
    atomic_write(&path, &to_yaml(&path, task)?)
}

/// Read one task document back from disk.
pub fn load_task(root: &Path, phase: &str, task_id: &str) -> Result<Task, SowError> {
    let path = task_state_path(root, phase, task_id);
    let contents = fs::read_to_string(&path).map_err(|e| persistence_error(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| {
        SowError::Invariant(format!("malformed task document {}: {e}", path.display()))
    })
}

/// Load the project document and refresh each phase's task list from the
/// authoritative per-task documents.
pub fn load_project_state(root: &Path) -> Result<ProjectState, SowError> {
    let path = state_path(root);
    let contents = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SowError::Validation(crate::schema::ValidationError::new(
                "project",
                &format!("no project found at {}; run `sow project new` first", root.display()),
            )));
        }
        Err(e) => return Err(persistence_error(&path, e)),
    };

    let mut state: ProjectState = serde_yaml::from_str(&contents).map_err(|e| {
        SowError::Invariant(format!("malformed project document {}: {e}", path.display()))
    })?;

    refresh_tasks_from_disk(root, &mut state)?;
    Ok(state)
}

/// Replace each phase's task index with the per-task documents on disk,
/// sorted by id. Phases without a tasks directory keep their inline list.
fn refresh_tasks_from_disk(root: &Path, state: &mut ProjectState) -> Result<(), SowError> {
    for phase in state.phases.values_mut() {
        let tasks_dir = phases_dir(root).join(&phase.name).join("tasks");
        if !tasks_dir.is_dir() {
            continue;
        }

        let mut ids: Vec<String> = Vec::new();
        let entries = fs::read_dir(&tasks_dir).map_err(|e| persistence_error(&tasks_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| persistence_error(&tasks_dir, e))?;
            if entry.path().is_dir()
                && let Some(id) = entry.file_name().to_str()
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();

        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            tasks.push(load_task(root, &phase.name, &id)?);
        }
        phase.tasks = tasks;
    }
    Ok(())
}

/// Append a feedback note for a task; notes are numbered `1.md`, `2.md`, ...
pub fn write_feedback(root: &Path, phase: &str, task_id: &str, body: &str) -> Result<PathBuf, SowError> {
    let dir = feedback_dir(root, phase, task_id);
    fs::create_dir_all(&dir).map_err(|e| persistence_error(&dir, e))?;

    let mut n = 1;
    loop {
        let path = dir.join(format!("{n}.md"));
        if !path.exists() {
            atomic_write(&path, body)?;
            return Ok(path);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Phase, Task};
    use tempfile::tempdir;

    fn sample_state() -> ProjectState {
        let mut state = ProjectState::new("auth", "standard", "feat/auth", "add auth", "PlanningActive");
        state.phases.insert("planning".into(), Phase::new("planning"));
        let mut implementation = Phase::new("implementation");
        implementation
            .tasks
            .push(Task::new("010", "first", "implementation", "implementer"));
        state.phases.insert("implementation".into(), implementation);
        state
    }

    #[test]
    fn atomic_write_creates_parents_and_replaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/state.yaml");

        atomic_write(&path, "one: 1\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one: 1\n");

        atomic_write(&path, "one: 2\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one: 2\n");

        // No temp file left behind.
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let state = sample_state();

        save_project_state(dir.path(), &state).unwrap();
        let loaded = load_project_state(dir.path()).unwrap();
        assert_eq!(state, loaded);
    }

    #[test]
    fn save_writes_per_task_documents() {
        let dir = tempdir().unwrap();
        let state = sample_state();

        save_project_state(dir.path(), &state).unwrap();
        let task_doc = task_state_path(dir.path(), "implementation", "010");
        assert!(task_doc.exists());

        let task = load_task(dir.path(), "implementation", "010").unwrap();
        assert_eq!(task.name, "first");
    }

    #[test]
    fn per_task_document_is_authoritative_on_load() {
        let dir = tempdir().unwrap();
        let state = sample_state();
        save_project_state(dir.path(), &state).unwrap();

        // A worker subprocess edits only the per-task document.
        let mut task = load_task(dir.path(), "implementation", "010").unwrap();
        task.status = crate::schema::TaskStatus::NeedsReview;
        save_task(dir.path(), &task).unwrap();

        let loaded = load_project_state(dir.path()).unwrap();
        let phase = loaded.phases.get("implementation").unwrap();
        assert_eq!(phase.tasks[0].status, crate::schema::TaskStatus::NeedsReview);
    }

    #[test]
    fn load_missing_project_is_a_validation_error() {
        let dir = tempdir().unwrap();
        let err = load_project_state(dir.path()).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("no project found"));
    }

    #[test]
    fn load_malformed_document_is_an_invariant_violation() {
        let dir = tempdir().unwrap();
        fs::write(state_path(dir.path()), "{{{not yaml").unwrap();
        let err = load_project_state(dir.path()).unwrap_err();
        assert!(matches!(err, SowError::Invariant(_)));
    }

    #[test]
    fn feedback_notes_are_numbered() {
        let dir = tempdir().unwrap();
        let first = write_feedback(dir.path(), "implementation", "010", "fix the tests").unwrap();
        let second = write_feedback(dir.path(), "implementation", "010", "also the docs").unwrap();
        assert!(first.ends_with("1.md"));
        assert!(second.ends_with("2.md"));
    }
}
