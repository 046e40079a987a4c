//! Timeout-bounded external tool execution.

use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::ConversionError;

/// One external tool call: a program and its arguments, built up by the
/// operation modules and executed under a timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Run to completion under `timeout`. Nonzero exit is an error carrying
    /// the tool's stderr; hitting the timeout kills the process.
    pub async fn run(&self, timeout: Duration) -> Result<(), ConversionError> {
        debug!("Running {} {:?}", self.program, self.args);

        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ConversionError::Spawn {
                    tool: self.program.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(ConversionError::Timeout {
                    tool: self.program.clone(),
                    seconds: timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim().chars().take(512).collect::<String>();
            return Err(ConversionError::ToolFailed {
                tool: self.program.clone(),
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(())
    }

    /// Run, then require a non-empty file at `expected_output`.
    pub async fn run_expecting(
        &self,
        timeout: Duration,
        expected_output: &Path,
    ) -> Result<(), ConversionError> {
        self.run(timeout).await?;

        let metadata = tokio::fs::metadata(expected_output).await.map_err(|_| {
            ConversionError::MissingOutput {
                tool: self.program.clone(),
            }
        })?;

        if metadata.len() == 0 {
            return Err(ConversionError::EmptyOutput {
                tool: self.program.clone(),
            });
        }

        Ok(())
    }
}
