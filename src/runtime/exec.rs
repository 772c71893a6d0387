//! Command execution inside running containers.

use crate::runtime::{Result, RuntimeClient, RuntimeError};
use bollard::exec::{CreateExecOptions, StartExecResults};
use futures::stream::StreamExt;
use tracing::debug;

/// Output from an in-container command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code (None if the runtime did not report one)
    pub exit_code: Option<i64>,
}

impl ExecOutput {
    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Combined output (stdout + stderr).
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

impl RuntimeClient {
    /// Execute a command inside a running container and collect its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the exec instance cannot be created or its output
    /// cannot be read. A non-zero exit code is reported in the output, not as
    /// an error.
    pub async fn exec(&self, name: &str, cmd: Vec<String>) -> Result<ExecOutput> {
        debug!("exec {} {:?}", name, cmd);

        let exec = self
            .docker()
            .create_exec(
                name,
                CreateExecOptions {
                    cmd: Some(cmd),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let start_results = self.docker().start_exec(&exec.id, None).await?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        match start_results {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(result) = output.next().await {
                    match result {
                        Ok(log) => {
                            let text = log.to_string();
                            match log {
                                bollard::container::LogOutput::StdOut { .. } => {
                                    stdout.push_str(&text);
                                }
                                bollard::container::LogOutput::StdErr { .. } => {
                                    stderr.push_str(&text);
                                }
                                _ => {}
                            }
                        }
                        Err(e) => {
                            return Err(RuntimeError::Exec(format!(
                                "failed to read exec output: {}",
                                e
                            )));
                        }
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(RuntimeError::Exec("unexpected detached execution".to_string()));
            }
        }

        let inspect = self.docker().inspect_exec(&exec.id).await?;
        let exit_code = inspect.exit_code;

        debug!("exec in {} finished with exit code {:?}", name, exit_code);

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}
