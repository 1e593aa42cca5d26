//! Top-level error taxonomy and process exit codes.
//!
//! Subsystems carry their own typed enums (`MachineError`, `ExecutorError`,
//! `StoreError`, `TrackerError`, `ValidationError`); `SowError` unifies them
//! at the command boundary and maps each class to a process exit code:
//!
//! | Code | Class                          |
//! |------|--------------------------------|
//! | 0    | success                        |
//! | 1    | validation / schema / invariant|
//! | 2    | network (transient, retried)   |
//! | 3    | authentication                 |
//! | 4    | remote / persistence / executor|
//! | 5    | state-machine guard            |

use std::path::PathBuf;
use thiserror::Error;

use crate::agent::executor::ExecutorError;
use crate::machine::MachineError;
use crate::schema::ValidationError;
use crate::store::StoreError;
use crate::tracker::TrackerError;

#[derive(Debug, Error)]
pub enum SowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    StateMachine(#[from] MachineError),

    #[error("failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("remote service error: {0}")]
    Remote(String),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// Impossible state detected on load; never auto-repaired.
    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SowError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SowError::Validation(_) | SowError::Invariant(_) | SowError::Other(_) => 1,
            SowError::Network(_) => 2,
            SowError::Auth(_) => 3,
            SowError::Persistence { .. } | SowError::Remote(_) | SowError::Executor(_) => 4,
            SowError::StateMachine(_) => 5,
        }
    }
}

impl From<StoreError> for SowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Network(msg) => SowError::Network(msg),
            StoreError::Auth(msg) => SowError::Auth(msg),
            StoreError::Remote(msg) => SowError::Remote(msg),
            StoreError::UnsafePath(msg) | StoreError::TooLarge(msg) => {
                SowError::Validation(ValidationError::new("artifact", &msg))
            }
            StoreError::Io(e) => SowError::Other(e.into()),
        }
    }
}

impl From<TrackerError> for SowError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::Network(msg) => SowError::Network(msg),
            TrackerError::Auth(msg) => SowError::Auth(msg),
            TrackerError::Remote { status, message } => {
                SowError::Remote(format!("tracker returned {status}: {message}"))
            }
            TrackerError::NotConfigured => SowError::Validation(ValidationError::new(
                "tracker",
                "no work tracker configured; set [tracker] in the sow config",
            )),
            TrackerError::NotFound(id) => SowError::Remote(format!("work item {id} not found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_taxonomy() {
        assert_eq!(
            SowError::Validation(ValidationError::new("f", "bad")).exit_code(),
            1
        );
        assert_eq!(SowError::Network("timeout".into()).exit_code(), 2);
        assert_eq!(SowError::Auth("denied".into()).exit_code(), 3);
        assert_eq!(SowError::Remote("500".into()).exit_code(), 4);
        assert_eq!(
            SowError::StateMachine(MachineError::GuardFailed {
                description: "x".into()
            })
            .exit_code(),
            5
        );
        assert_eq!(SowError::Invariant("bad state".into()).exit_code(), 1);
    }

    #[test]
    fn guard_failure_message_carries_description() {
        let err = SowError::StateMachine(MachineError::GuardFailed {
            description: "planning has an approved task list output".into(),
        });
        assert!(
            err.to_string()
                .contains("planning has an approved task list output")
        );
    }

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert_eq!(SowError::from(StoreError::Network("x".into())).exit_code(), 2);
        assert_eq!(SowError::from(StoreError::Auth("x".into())).exit_code(), 3);
        assert_eq!(
            SowError::from(StoreError::UnsafePath("..".into())).exit_code(),
            1
        );
    }
}
