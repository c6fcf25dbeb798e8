use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Acquire, install and publish the JDK described by the profile
    Install(InstallArgs),

    /// Validate the given YAML profile
    Validate(ValidateArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Path to the YAML file defining the profile
    #[arg(short, long, default_value = "profile.yaml")]
    pub file: Utf8PathBuf,

    /// Override the JDK version spec from the profile
    #[arg(long)]
    pub version: Option<String>,

    /// Override the architecture from the profile
    #[arg(long)]
    pub arch: Option<String>,

    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the YAML file to validate
    #[arg(short, long, default_value = "profile.yaml")]
    pub file: Utf8PathBuf,

    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}

/// Represents log levels for controlling the verbosity of logging output.
///
/// This enum maps directly to the log levels used by the `tracing` crate.
/// Specifying `--log-level debug` shows every command line that is run and
/// every directory snapshot that is taken.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Commands {
    /// Log level requested by the subcommand.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Install(opts) => opts.log_level,
            Self::Validate(opts) => opts.log_level,
            Self::Completions(_) => LogLevel::Warn,
        }
    }
}

pub fn parse_args() -> Result<Cli> {
    Ok(Cli::parse())
}
