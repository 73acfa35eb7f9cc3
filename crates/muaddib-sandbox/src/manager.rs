//! `TerminalManager` — runs sandboxed, one-shot commands for `execute_code`.

use crate::{
    error::{Result, TerminalError},
    safety, truncate,
    types::{ExecOptions, ExecResult},
};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Runs one-shot commands with safety checking, timeout, and output
/// truncation. Stateless — cheap to construct and share behind an `Arc`.
pub struct TerminalManager;

impl TerminalManager {
    pub fn new() -> Self {
        Self
    }

    /// Execute `command` via `sh -c` with safety checking, timeout, and output
    /// truncation.
    ///
    /// Uses `tokio::process::Command` so the timeout future can race against
    /// the child without blocking the Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `CommandBlocked` — command was rejected by the safety checker.
    /// - `Timeout`        — child exceeded `options.timeout_secs`.
    /// - `PtySpawn`       — child could not be spawned.
    /// - `IoError`        — underlying I/O failure.
    pub async fn exec(&self, command: &str, options: ExecOptions) -> Result<ExecResult> {
        debug!("exec: {command}");

        if !options.skip_safety {
            safety::check_command(command).map_err(|reason| TerminalError::CommandBlocked { reason })?;
        }

        let timeout_secs = options.effective_timeout_secs();
        let timeout_duration = std::time::Duration::from_secs(timeout_secs);

        let child = AsyncCommand::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| TerminalError::PtySpawn(format!("spawn failed: {e}")))?;

        // `wait_with_output` takes `self` by value, so we drive it on a spawned
        // task and communicate back via a oneshot channel. Capture the PID
        // first so we can issue a SIGKILL on the timeout path.
        let pid = child.id();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let _ = tx.send(child.wait_with_output().await);
        });

        match tokio::time::timeout(timeout_duration, rx).await {
            Ok(Ok(Ok(output))) => {
                let exit_code = output.status.code().unwrap_or(-1);
                let stdout = truncate::truncate_output(&strip_text(&output.stdout), options.max_output_chars);
                let stderr = truncate::truncate_output(&strip_text(&output.stderr), options.max_output_chars);
                Ok(ExecResult { exit_code, stdout, stderr })
            }

            Ok(Ok(Err(e))) => Err(TerminalError::IoError(e)),

            Ok(Err(_recv_err)) => {
                Err(TerminalError::PtySpawn("wait task panicked unexpectedly".to_string()))
            }

            Err(_elapsed) => {
                // POSIX kill(2) with SIGKILL is the most reliable way to
                // terminate the child when we no longer own the Child handle.
                if let Some(raw_pid) = pid {
                    #[cfg(unix)]
                    unsafe {
                        libc::kill(raw_pid as libc::pid_t, libc::SIGKILL);
                    }
                    #[cfg(not(unix))]
                    {
                        let _ = std::process::Command::new("taskkill")
                            .args(["/F", "/PID", &raw_pid.to_string()])
                            .output();
                    }
                }
                Err(TerminalError::Timeout { ms: timeout_secs * 1_000 })
            }
        }
    }
}

impl Default for TerminalManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip ANSI escape codes and convert bytes to a UTF-8 string.
fn strip_text(raw: &[u8]) -> String {
    let clean = strip_ansi_escapes::strip(raw);
    String::from_utf8_lossy(&clean).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exec_returns_stdout_and_exit_code() {
        let mgr = TerminalManager::new();
        let result = mgr.exec("echo hello", ExecOptions::default()).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn exec_blocks_unsafe_commands() {
        let mgr = TerminalManager::new();
        let result = mgr.exec("rm -rf /", ExecOptions::default()).await;
        assert!(matches!(result, Err(TerminalError::CommandBlocked { .. })));
    }

    #[tokio::test]
    async fn exec_times_out_long_running_commands() {
        let mgr = TerminalManager::new();
        let options = ExecOptions { timeout_secs: 1, ..ExecOptions::default() };
        let result = mgr.exec("sleep 5", options).await;
        assert!(matches!(result, Err(TerminalError::Timeout { .. })));
    }
}
