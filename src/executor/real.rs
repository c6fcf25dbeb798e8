//! Real command executor implementation.
//!
//! This module provides [`RealCommandExecutor`], which executes commands
//! using `std::process::Command` with real-time output streaming.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use which::which;

use super::pipe::{OutputTail, StreamType, panic_message, read_pipe_to_log};
use super::{CommandExecutor, CommandSpec, ExecutionResult};
use crate::error::JdkstrapError;

/// Cleans up a child process and its associated reader threads.
///
/// Kills the child, waits for it to terminate and joins all reader threads.
fn cleanup_child_process<I>(child: &mut Child, handles: I)
where
    I: IntoIterator<Item = JoinHandle<OutputTail>>,
{
    let pid = child.id();
    if let Err(e) = child.kill() {
        tracing::debug!(pid = pid, "kill returned error (process may have already exited): {}", e);
    }
    if let Err(e) = child.wait() {
        tracing::warn!(pid = pid, "failed to wait for child process after kill: {}", e);
    }
    for handle in handles {
        if let Err(e) = handle.join() {
            tracing::warn!("reader thread panicked during cleanup: {}", panic_message(&*e));
        }
    }
}

/// Resolves a command name on `PATH`, mapping a miss to `CommandNotFound`.
fn resolve_command(command: &str) -> Result<PathBuf> {
    which(command).map_err(|e| {
        tracing::debug!("lookup of {} failed: {}", command, e);
        JdkstrapError::CommandNotFound {
            command: command.to_string(),
        }
        .into()
    })
}

/// Builds the program and argument list, wrapping it in the privilege
/// escalation tool when one is requested.
///
/// The wrapped tool is passed by absolute path so that `sudo`'s
/// `secure_path` cannot substitute a different binary.
fn build_command(spec: &CommandSpec) -> Result<Command> {
    let tool = resolve_command(&spec.command)?;
    let command = match spec.privilege {
        Some(method) => {
            let wrapper = resolve_command(method.command_name())?;
            tracing::trace!("wrapping {} with {}", tool.display(), wrapper.display());
            let mut command = Command::new(wrapper);
            command.arg(tool).args(&spec.args);
            command
        }
        None => {
            let mut command = Command::new(tool);
            command.args(&spec.args);
            command
        }
    };
    Ok(command)
}

/// Command executor that runs actual system commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealCommandExecutor;

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        let mut command = build_command(spec)?;

        if let Some(ref cwd) = spec.cwd {
            command.current_dir(cwd);
        }

        for (key, value) in &spec.env {
            command.env(key, value);
        }

        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        tracing::debug!(privilege = ?spec.privilege, "running: {} {:?}", spec.command, spec.args);

        let mut child = command.spawn().with_context(|| {
            format!("failed to spawn command `{}` with args {:?}", spec.command, spec.args)
        })?;

        tracing::trace!("spawned command: {}: pid={}", spec.command, child.id());

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let stdout_handle = match thread::Builder::new()
            .name("stdout-reader".to_string())
            .spawn(move || read_pipe_to_log(stdout_pipe, StreamType::Stdout))
        {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, []);
                return Err(JdkstrapError::execution(
                    spec,
                    format!("failed to spawn stdout reader thread: {}", e),
                )
                .into());
            }
        };

        let stderr_handle = match thread::Builder::new()
            .name("stderr-reader".to_string())
            .spawn(move || read_pipe_to_log(stderr_pipe, StreamType::Stderr))
        {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, [stdout_handle]);
                return Err(JdkstrapError::execution(
                    spec,
                    format!("failed to spawn stderr reader thread: {}", e),
                )
                .into());
            }
        };

        let status = match child.wait() {
            Ok(s) => s,
            Err(e) => {
                cleanup_child_process(&mut child, [stdout_handle, stderr_handle]);
                return Err(JdkstrapError::execution(
                    spec,
                    format!("failed to wait for command: {}", e),
                )
                .into());
            }
        };

        let mut panicked_streams = Vec::new();
        let mut stderr_tail = OutputTail::default();
        let handles = [(StreamType::Stdout, stdout_handle), (StreamType::Stderr, stderr_handle)];
        for (stream, handle) in handles {
            match handle.join() {
                Ok(tail) if stream == StreamType::Stderr => stderr_tail = tail,
                Ok(_) => {}
                Err(e) => {
                    let msg = panic_message(&*e);
                    tracing::error!(stream = %stream, panic = msg, "reader thread panicked");
                    panicked_streams.push(format!("{}: {}", stream, msg));
                }
            }
        }

        if !panicked_streams.is_empty() {
            return Err(JdkstrapError::execution(
                spec,
                format!(
                    "reader thread(s) panicked during command execution: {}",
                    panicked_streams.join(", ")
                ),
            )
            .into());
        }

        let stderr_tail =
            (!status.success() && !stderr_tail.is_empty()).then(|| stderr_tail.joined());
        tracing::trace!("executed command: {}: success={}", spec.command, status.success());

        Ok(ExecutionResult {
            status: Some(status),
            stderr_tail,
        })
    }
}
