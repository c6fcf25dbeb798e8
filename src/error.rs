//! Domain-specific error types for jdkstrap.
//!
//! This module defines `JdkstrapError`, a `thiserror`-based enum that
//! provides typed error variants for every failure mode of the JDK
//! acquisition flow. Public API functions return `Result<T, JdkstrapError>`
//! for programmatic error handling, while trait boundaries (executors,
//! mounters, extractors, fetchers) continue to use `anyhow::Result`.
//!
//! `JdkstrapError` implements `Into<anyhow::Error>`, so the `?` operator
//! converts it automatically at trait boundaries that return `anyhow::Result`,
//! and callers can recover the typed variant with `downcast_ref`.

use std::io;

use crate::executor::{CommandSpec, format_command_args};

/// Formats an IO error kind into a human-readable message.
///
/// Provides consistent, user-friendly messages for common IO error kinds
/// (e.g., "I/O error: not found") instead of the OS-level messages
/// (e.g., "No such file or directory (os error 2)"). For unrecognized
/// error kinds, falls back to including the OS-level error message.
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

/// Why a package file could not be chosen on a mounted volume.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackageLookupError {
    /// The volume holds no `.pkg` file at all.
    #[error("no package file found in {volume}")]
    NotFound { volume: String },

    /// The volume holds several `.pkg` files and none is preferred.
    #[error("multiple package files found in {volume}: {}", .packages.join(", "))]
    Multiple {
        volume: String,
        packages: Vec<String>,
    },

    /// The package path handed to the installer does not exist.
    #[error("package file does not exist: {path}")]
    Missing { path: String },
}

/// Why the JDK root diff could not be turned into a JDK home.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstallDetectionError {
    /// The installer left no new entry and no earlier install is registered.
    #[error(
        "JDK did not install: no new entry appeared in {root} and {variable} is not set \
        for version {version}"
    )]
    NotInstalled {
        root: String,
        variable: String,
        version: String,
    },

    /// More than one entry appeared, so the installed JDK cannot be told apart.
    #[error("ambiguous install result in {root}: {}", .entries.join(", "))]
    Ambiguous { root: String, entries: Vec<String> },
}

/// Domain-specific error type for jdkstrap.
///
/// Provides typed variants for common failure modes, enabling callers
/// to match on error kinds programmatically rather than parsing error
/// message strings.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum JdkstrapError {
    /// The archive name does not end with a recognized suffix.
    #[error("unsupported file extension: {0}")]
    Classification(String),

    /// Attaching a disk image did not produce exactly one new volume.
    #[error(
        "unsupported disk-image structure: expected exactly one new volume in {root}, found {}",
        describe_entries(.entries)
    )]
    MountStructure { root: String, entries: Vec<String> },

    /// The package file on a mounted volume could not be chosen.
    #[error(transparent)]
    PackageLookup(#[from] PackageLookupError),

    /// The installed JDK could not be detected after the package installer ran.
    #[error(transparent)]
    InstallDetection(#[from] InstallDetectionError),

    /// A pre-installed JDK was requested but its variable is not set.
    #[error("JDK {version} is not pre-installed: {variable} is not set")]
    PreinstalledMissing { version: String, variable: String },

    /// Only the tool cache was to be consulted and it has no match.
    #[error("JDK {version} ({architecture}) is not in the tool cache")]
    NotCached {
        version: String,
        architecture: String,
    },

    /// An external program could not be launched or exited unsuccessfully
    /// where success is required.
    #[error("command execution failed: {command}: {status}")]
    ProcessExecution {
        /// The command that was executed.
        command: String,
        /// Human-readable reason for the failure: exit code, signal information,
        /// or a description of the internal error (e.g., thread spawn failure).
        status: String,
    },

    /// The command could not be found on `PATH`.
    #[error("command not found in PATH: {command}")]
    CommandNotFound {
        /// The command that was looked up.
        command: String,
    },

    /// The archive kind needs a capability the current platform lacks.
    #[error("{kind} archives are not supported on {platform}")]
    UnsupportedPlatform { kind: String, platform: String },

    /// The operation was cancelled between two steps.
    #[error("operation cancelled before {0}")]
    Cancelled(String),

    /// A remote artifact could not be listed or downloaded.
    #[error("download error: {0}")]
    Download(String),

    /// An extracted archive did not contain a recognizable JDK.
    #[error("no JDK found in {0}: expected a bin/java executable")]
    JdkNotFound(String),

    /// A validation constraint was violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// A configuration file could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O operation failed with contextual information.
    #[error("{context}: {message}")]
    Io {
        /// What was being done when the error occurred, usually an operation
        /// description with a path (e.g., `"failed to read directory: /Volumes"`).
        context: String,
        /// Human-readable description of the I/O failure, derived from
        /// [`io_error_kind_message`].
        message: String,
        /// The underlying I/O error, preserved for programmatic inspection.
        #[source]
        source: std::io::Error,
    },
}

fn describe_entries(entries: &[String]) -> String {
    if entries.is_empty() {
        "none".to_string()
    } else {
        format!("{} ({})", entries.len(), entries.join(", "))
    }
}

impl JdkstrapError {
    /// Creates an `Io` variant with the `message` field automatically derived
    /// from the `source` via [`io_error_kind_message`].
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }

    /// Creates a `ProcessExecution` variant describing the given command spec.
    pub(crate) fn execution(spec: &CommandSpec, status: impl Into<String>) -> Self {
        let command = if spec.args.is_empty() {
            spec.command.clone()
        } else {
            format!("{} {}", spec.command, format_command_args(&spec.args))
        };
        Self::ProcessExecution {
            command,
            status: status.into(),
        }
    }
}
