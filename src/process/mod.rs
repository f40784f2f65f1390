//! Child-process invocation for the external downloader, resolver and ASR runner.
//!
//! Output is always captured and read to completion; on timeout the child is killed
//! (`kill_on_drop`) so no stage leaves a blocked or zombie process behind.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::utils::tail;

/// Characters of stderr kept in error messages and notes
const STDERR_TAIL_CHARS: usize = 600;

#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("{tool} not found")]
    Missing { tool: String },

    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {}s", .timeout.as_secs())]
    TimedOut { tool: String, timeout: Duration },

    #[error("{tool} exited with {}: {stderr_tail}", exit_label(.code))]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr_tail: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

impl ToolError {
    pub fn tool(&self) -> &str {
        match self {
            ToolError::Missing { tool }
            | ToolError::Spawn { tool, .. }
            | ToolError::TimedOut { tool, .. }
            | ToolError::Failed { tool, .. } => tool,
        }
    }
}

/// Captured result of a finished child process
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub tool: String,
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Turn a non-zero exit into [`ToolError::Failed`]
    pub fn into_success(self) -> Result<ToolOutput, ToolError> {
        if self.success {
            Ok(self)
        } else {
            Err(ToolError::Failed {
                tool: self.tool,
                code: self.code,
                stderr_tail: tail(self.stderr.trim(), STDERR_TAIL_CHARS),
            })
        }
    }

    pub fn stderr_tail(&self) -> String {
        tail(self.stderr.trim(), STDERR_TAIL_CHARS)
    }
}

/// A fully described subprocess call. Environment entries apply to this child only.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub envs: Vec<(String, String)>,
    pub timeout: Duration,
    label: String,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        let program = program.into();
        let label = program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());
        Self {
            program,
            args: Vec::new(),
            envs: Vec::new(),
            timeout,
            label,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run to completion or kill on timeout. Non-zero exits are returned as output, not errors.
    pub async fn run(&self) -> Result<ToolOutput, ToolError> {
        tracing::debug!(
            tool = %self.label,
            args = ?self.args,
            timeout_secs = self.timeout.as_secs(),
            "spawning subprocess"
        );

        if self.timeout.is_zero() {
            return Err(ToolError::TimedOut {
                tool: self.label.clone(),
                timeout: self.timeout,
            });
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.envs {
            command.env(key, value);
        }

        let child = command.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ToolError::Missing {
                    tool: self.label.clone(),
                }
            } else {
                ToolError::Spawn {
                    tool: self.label.clone(),
                    source,
                }
            }
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ToolError::Spawn {
                tool: self.label.clone(),
                source,
            })?,
            Err(_) => {
                tracing::warn!(
                    tool = %self.label,
                    "subprocess timed out after {}s, killing",
                    self.timeout.as_secs()
                );
                return Err(ToolError::TimedOut {
                    tool: self.label.clone(),
                    timeout: self.timeout,
                });
            }
        };

        Ok(ToolOutput {
            tool: self.label.clone(),
            code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Resolve a tool: explicit path if it exists, otherwise a PATH lookup of `name`
pub fn find_program(explicit: Option<&Path>, name: &str) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return is_executable(path).then(|| path.to_path_buf());
    }
    which::which(name).ok()
}

/// Whether `path` is a regular file we are allowed to execute
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
