//! Host command execution.
//!
//! Runs external programs with an argument vector via `tokio::process::Command`.
//! Arguments are never joined into a shell string, so caller-supplied values
//! (container names, credentials) cannot break out of their argument position.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, error};

/// Command to execute on the host.
#[derive(Debug, Clone)]
pub struct ExecutionCommand {
    /// Program name or path to execute
    pub program: String,
    /// Command line arguments
    pub args: Vec<String>,
    /// Working directory for command execution
    pub working_dir: Option<PathBuf>,
    /// Environment variables to set
    pub env: HashMap<String, String>,
    /// Maximum execution time (None = no timeout)
    pub timeout: Option<Duration>,
}

impl ExecutionCommand {
    /// Create a new command with just program and args.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            env: HashMap::new(),
            timeout: None,
        }
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of command execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Standard output from the command
    pub stdout: String,
    /// Standard error from the command
    pub stderr: String,
    /// Exit code (0 = success, non-zero = failure)
    pub exit_code: i32,
    /// Duration of command execution
    pub duration: Duration,
}

impl ExecutionResult {
    /// Check if the command executed successfully (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined stdout + stderr, for diagnostics.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Errors during command execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Command execution timed out
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// I/O error spawning or waiting on the process
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Executes commands directly on the host system.
#[derive(Debug, Clone, Default)]
pub struct HostExecutor;

impl HostExecutor {
    /// Create a new host executor.
    pub fn new() -> Self {
        Self
    }

    /// Execute a command and capture its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or the timeout elapses.
    /// A non-zero exit code is not an error here; callers inspect the result.
    pub async fn execute(&self, cmd: ExecutionCommand) -> Result<ExecutionResult, ExecutorError> {
        debug!("Executing on host: {} {:?}", cmd.program, cmd.args);

        let start = Instant::now();

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);

        if let Some(ref dir) = cmd.working_dir {
            command.current_dir(dir);
        }

        for (key, value) in &cmd.env {
            command.env(key, value);
        }

        let output = if let Some(timeout) = cmd.timeout {
            match tokio::time::timeout(timeout, command.output()).await {
                Ok(result) => result?,
                Err(_) => {
                    error!("Command {} timed out after {:?}", cmd.program, timeout);
                    return Err(ExecutorError::Timeout(timeout));
                }
            }
        } else {
            command.output().await?
        };

        let duration = start.elapsed();
        let exit_code = output.status.code().unwrap_or(-1);

        if exit_code != 0 {
            debug!("Command {} exited with code {}", cmd.program, exit_code);
        }

        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code,
            duration,
        })
    }
}
