//! Executor for the Claude CLI.
//!
//! The prompt is fed through stdin; stdout/stderr are plumbed straight to
//! the parent so the operator sees the worker's output live. Completion is
//! signalled through the task document, so a non-zero exit is logged but is
//! not an error here.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use super::Agent;
use super::executor::{Executor, ExecutorError};

/// Grace period between SIGTERM and SIGKILL on cancellation.
const TERM_GRACE: Duration = Duration::from_secs(5);

pub struct ClaudeExecutor {
    command: String,
}

impl ClaudeExecutor {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }

    async fn run(&self, mut cmd: Command, prompt: &str, cancel: CancellationToken) -> Result<(), ExecutorError> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|e| ExecutorError::Launch {
            command: self.command.clone(),
            source: e,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading stdin closes the pipe; that
            // is its business, not a launch failure.
            let write = async {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await
            };
            match write.await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::debug!(command = %self.command, "worker closed stdin early");
                }
                Err(e) => {
                    return Err(ExecutorError::Wait {
                        command: self.command.clone(),
                        source: e,
                    });
                }
            }
        }

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| ExecutorError::Wait {
                    command: self.command.clone(),
                    source: e,
                })?;
                let code = status.code().unwrap_or(-1);
                if code != 0 {
                    tracing::warn!(command = %self.command, code, "worker exited non-zero");
                } else {
                    tracing::debug!(command = %self.command, "worker exited cleanly");
                }
                Ok(())
            }
            _ = cancel.cancelled() => {
                tracing::warn!(command = %self.command, "cancellation requested; terminating worker");
                terminate(&mut child).await;
                Err(ExecutorError::Cancelled)
            }
        }
    }
}

/// SIGTERM, a grace period, then SIGKILL.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.kill().await;
}

impl ClaudeExecutor {
    /// Run an arbitrary command through the subprocess plumbing (public for
    /// testing).
    #[cfg(test)]
    pub async fn run_for_test(
        &self,
        cmd: Command,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<(), ExecutorError> {
        self.run(cmd, prompt, cancel).await
    }
}

#[async_trait]
impl Executor for ClaudeExecutor {
    fn name(&self) -> &str {
        "claude"
    }

    fn supports_resumption(&self) -> bool {
        true
    }

    async fn spawn(
        &self,
        cancel: CancellationToken,
        _agent: &Agent,
        prompt: &str,
        session_id: &str,
    ) -> Result<(), ExecutorError> {
        let mut cmd = Command::new(&self.command);
        cmd.arg("--print").arg("--session-id").arg(session_id);
        self.run(cmd, prompt, cancel).await
    }

    async fn resume(
        &self,
        cancel: CancellationToken,
        session_id: &str,
        prompt: &str,
    ) -> Result<(), ExecutorError> {
        let mut cmd = Command::new(&self.command);
        cmd.arg("--print").arg("--resume").arg(session_id);
        self.run(cmd, prompt, cancel).await
    }
}
