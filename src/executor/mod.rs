//! Command execution abstraction for jdkstrap.
//!
//! This module provides:
//! - [`CommandSpec`]: Specification for commands to execute
//! - [`ExecutionResult`]: Result of command execution
//! - [`CommandExecutor`]: Trait for command execution strategies
//! - [`RealCommandExecutor`]: Production implementation using `std::process::Command`

mod pipe;
mod real;

use std::process::ExitStatus;

use anyhow::Result;
use camino::Utf8PathBuf;

use crate::privilege::PrivilegeMethod;

pub use real::RealCommandExecutor;

/// Formats string arguments into a space-separated, debug-quoted string.
///
/// Used by error messages and log output to consistently format
/// command arguments (e.g., `"attach" "/tmp/jdk-11.dmg"`).
pub(crate) fn format_command_args(args: &[String]) -> String {
    args.iter()
        .map(|a| format!("{:?}", a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Specification for a command to be executed
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The command to execute (e.g., "hdiutil")
    pub command: String,
    /// Command arguments
    pub args: Vec<String>,
    /// Working directory (optional, defaults to current directory)
    pub cwd: Option<Utf8PathBuf>,
    /// Environment variables to set (in addition to inherited environment)
    pub env: Vec<(String, String)>,
    /// Privilege escalation method to wrap the command
    pub privilege: Option<PrivilegeMethod>,
}

impl CommandSpec {
    /// Creates a new CommandSpec with command and args
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: None,
            env: Vec::new(),
            privilege: None,
        }
    }

    /// Sets the privilege escalation method
    #[must_use]
    pub fn with_privilege(mut self, privilege: Option<PrivilegeMethod>) -> Self {
        self.privilege = privilege;
        self
    }

    /// Sets the working directory
    #[must_use]
    pub fn with_cwd(mut self, cwd: Utf8PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    /// Adds an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Result of command execution
#[derive(Debug)]
pub struct ExecutionResult {
    /// Exit status of the command (None when the process left no status)
    pub status: Option<ExitStatus>,
    /// Last stderr lines of a failed command, joined for one message.
    pub stderr_tail: Option<String>,
}

impl ExecutionResult {
    /// Returns true if the command exited with a zero status.
    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    /// Returns the exit code if available
    pub fn code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    /// Describes the exit status for log and error messages.
    pub fn describe(&self) -> String {
        let status = self
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "process exited without status (possibly killed by signal)".into());
        match &self.stderr_tail {
            Some(tail) => format!("{} (stderr: {})", status, tail),
            None => status,
        }
    }
}

/// Trait for command execution.
///
/// Implementations must be `Send + Sync` so a single executor can be shared
/// through `Arc<dyn CommandExecutor>` by the mounter, the package installer
/// and the archive extractor.
pub trait CommandExecutor: Send + Sync {
    /// Executes a command with the given specification.
    ///
    /// Returns `Err` only when the command could not be run at all
    /// (not found, spawn failure, wait failure). A command that ran and
    /// exited non-zero is reported through [`ExecutionResult`].
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult>;
}
