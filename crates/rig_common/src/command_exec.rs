//! Command execution layer.
//!
//! Single execution layer that:
//! - Runs one shell command with a hard timeout
//! - Captures real exit code, stdout, stderr, duration
//! - Classifies the outcome WITHOUT interpreting domain meaning
//!
//! All interpretation (similar-error lookup, fix escalation) belongs to
//! the resolution engine. Production code uses `ShellRunner`; test code
//! uses `ScriptedRunner` with pre-configured outcomes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Maximum output length to capture per stream (prevent memory issues)
const MAX_OUTPUT_BYTES: usize = 64 * 1024; // 64KB

/// Outcome classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Command ran successfully (exit code 0)
    Success,
    /// Command ran but returned non-zero exit code
    NonZeroExit,
    /// Command not found on system
    CommandNotFound,
    /// Permission denied
    PermissionDenied,
    /// Command exceeded its timeout and was killed
    Timeout,
    /// Other OS error (spawn failure etc.)
    OsError,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NonZeroExit => "non-zero exit",
            Self::CommandNotFound => "command not found",
            Self::PermissionDenied => "permission denied",
            Self::Timeout => "timeout",
            Self::OsError => "OS error",
        }
    }
}

/// Result of a single command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// Exit code (0 = success, -1 when no code is available)
    pub exit_code: i32,
    /// Stdout (truncated if too long)
    pub stdout: String,
    pub stdout_truncated: bool,
    /// Stderr (truncated if too long)
    pub stderr: String,
    pub stderr_truncated: bool,
    pub duration_ms: u64,
    pub status: ExecutionStatus,
}

impl Outcome {
    pub fn success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// The most diagnostic text available: stderr, else stdout.
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }

    /// Canned successful outcome (tests and scripted runners)
    pub fn ok(stdout: &str) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.to_string(),
            stdout_truncated: false,
            stderr: String::new(),
            stderr_truncated: false,
            duration_ms: 1,
            status: ExecutionStatus::Success,
        }
    }

    /// Canned failed outcome (tests and scripted runners)
    pub fn failed(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stdout_truncated: false,
            stderr: stderr.to_string(),
            stderr_truncated: false,
            duration_ms: 1,
            status: classify(exit_code, stderr),
        }
    }

    /// Canned timeout outcome
    pub fn timed_out(timeout: Duration) -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stdout_truncated: false,
            stderr: format!("command timed out after {}s", timeout.as_secs()),
            stderr_truncated: false,
            duration_ms: timeout.as_millis() as u64,
            status: ExecutionStatus::Timeout,
        }
    }
}

/// Classify a finished command from its exit code and stderr.
fn classify(exit_code: i32, stderr: &str) -> ExecutionStatus {
    if exit_code == 0 {
        ExecutionStatus::Success
    } else if stderr.contains("command not found") || stderr.contains("not found") {
        ExecutionStatus::CommandNotFound
    } else if stderr.contains("Permission denied") || stderr.contains("permission denied") {
        ExecutionStatus::PermissionDenied
    } else {
        ExecutionStatus::NonZeroExit
    }
}

/// Truncate output to max bytes, converting to string
fn truncate_output(bytes: &[u8]) -> (String, bool) {
    let truncated = bytes.len() > MAX_OUTPUT_BYTES;
    let slice = if truncated {
        &bytes[..MAX_OUTPUT_BYTES]
    } else {
        bytes
    };
    (String::from_utf8_lossy(slice).to_string(), truncated)
}

/// Trait abstraction for command execution.
///
/// The hosting application supplies the primitive; the engine only ever
/// sees an `Outcome`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Execute one command under `sh -c`, bounded by `timeout`.
    async fn execute(&self, command: &str, timeout: Duration) -> Outcome;
}

/// Real runner that executes on the system
#[derive(Debug, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn execute(&self, command: &str, timeout: Duration) -> Outcome {
        let start = Instant::now();
        debug!(command, timeout_secs = timeout.as_secs(), "executing");

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result,
            Err(_) => {
                // The dropped future kills the child (kill_on_drop).
                debug!(command, "command timed out");
                return Outcome::timed_out(timeout);
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        match output {
            Ok(output) => {
                let (stdout, stdout_truncated) = truncate_output(&output.stdout);
                let (stderr, stderr_truncated) = truncate_output(&output.stderr);
                let exit_code = output.status.code().unwrap_or(-1);
                let status = classify(exit_code, &stderr);
                Outcome {
                    exit_code,
                    stdout,
                    stdout_truncated,
                    stderr,
                    stderr_truncated,
                    duration_ms,
                    status,
                }
            }
            Err(e) => {
                let status = if e.kind() == std::io::ErrorKind::NotFound {
                    ExecutionStatus::CommandNotFound
                } else if e.kind() == std::io::ErrorKind::PermissionDenied {
                    ExecutionStatus::PermissionDenied
                } else {
                    ExecutionStatus::OsError
                };
                Outcome {
                    exit_code: -1,
                    stdout: String::new(),
                    stdout_truncated: false,
                    stderr: format!("OS error: {}", e),
                    stderr_truncated: false,
                    duration_ms,
                    status,
                }
            }
        }
    }
}

/// Scripted runner for deterministic tests.
///
/// Outcomes are matched by command substring, first match wins; commands
/// with no match fail with exit code 127. Every executed command is
/// recorded for assertions.
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Mutex<Vec<(String, Outcome)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` succeed.
    pub fn succeed_on(self, pattern: &str) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .push((pattern.to_string(), Outcome::ok("ok")));
        self
    }

    /// Commands containing `pattern` fail with the given stderr.
    pub fn fail_on(self, pattern: &str, stderr: &str) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .push((pattern.to_string(), Outcome::failed(1, stderr)));
        self
    }

    /// Commands containing `pattern` produce exactly `outcome`.
    pub fn outcome_on(self, pattern: &str, outcome: Outcome) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .push((pattern.to_string(), outcome));
        self
    }

    /// All commands executed so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn execute(&self, command: &str, _timeout: Duration) -> Outcome {
        self.calls.lock().unwrap().push(command.to_string());
        let scripts = self.scripts.lock().unwrap();
        for (pattern, outcome) in scripts.iter() {
            if command.contains(pattern.as_str()) {
                return outcome.clone();
            }
        }
        Outcome::failed(127, &format!("sh: {}: command not found", command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shell_runner_success() {
        let runner = ShellRunner::new();
        let outcome = runner.execute("echo rig-ok", Duration::from_secs(5)).await;
        assert!(outcome.success());
        assert!(outcome.stdout.contains("rig-ok"));
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn test_shell_runner_nonzero_exit() {
        let runner = ShellRunner::new();
        let outcome = runner.execute("exit 3", Duration::from_secs(5)).await;
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.status, ExecutionStatus::NonZeroExit);
    }

    #[tokio::test]
    async fn test_shell_runner_timeout() {
        let runner = ShellRunner::new();
        let outcome = runner.execute("sleep 5", Duration::from_millis(100)).await;
        assert_eq!(outcome.status, ExecutionStatus::Timeout);
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn test_shell_runner_command_not_found() {
        let runner = ShellRunner::new();
        let outcome = runner
            .execute("definitely-not-a-real-binary-xyz", Duration::from_secs(5))
            .await;
        assert_eq!(outcome.status, ExecutionStatus::CommandNotFound);
    }

    #[tokio::test]
    async fn test_scripted_runner_matches_and_records() {
        let runner = ScriptedRunner::new()
            .succeed_on("apt install")
            .fail_on("pip install", "permission denied: cannot write");

        let ok = runner
            .execute("apt install -y git", Duration::from_secs(1))
            .await;
        assert!(ok.success());

        let failed = runner
            .execute("pip install torch", Duration::from_secs(1))
            .await;
        assert_eq!(failed.status, ExecutionStatus::PermissionDenied);

        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn test_truncation() {
        let big = vec![b'x'; MAX_OUTPUT_BYTES + 10];
        let (text, truncated) = truncate_output(&big);
        assert!(truncated);
        assert_eq!(text.len(), MAX_OUTPUT_BYTES);
    }

    #[test]
    fn test_error_text_prefers_stderr() {
        let outcome = Outcome::failed(1, "E: Unable to locate package");
        assert_eq!(outcome.error_text(), "E: Unable to locate package");
        let quiet = Outcome {
            stderr: String::new(),
            stdout: "nothing to do".to_string(),
            ..Outcome::failed(1, "")
        };
        assert_eq!(quiet.error_text(), "nothing to do");
    }
}
