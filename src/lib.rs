pub mod acquire;
pub mod archive;
pub mod cache;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod environment;
pub mod error;
pub mod executor;
pub mod extract;
pub mod fetch;
pub mod installer;
pub mod mounter;
pub mod package;
pub mod platform;
pub mod privilege;
pub mod snapshot;

pub use error::JdkstrapError;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::CommandFactory;
use tracing::info;
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::acquire::{AcquiredJdk, Acquirer, JdkRequest};
use crate::cache::{EmptyToolCache, LocalToolCache, ToolCache, agent_tool_cache_root};
use crate::cancel::CancellationToken;
use crate::config::{JdkSource, Profile};
use crate::environment::{EnvironmentPublisher, VariableLookup};
use crate::executor::CommandExecutor;
use crate::extract::JdkArchiveExtractor;
use crate::fetch::AzureBlobFetcher;
use crate::installer::Installer;
use crate::platform::{Platform, PlatformCapabilities};

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    // Logs go to stderr so stdout carries only pipeline logging commands.
    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(filter)
            .with_writer(std::io::stderr)
            .finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Process-wide collaborators of the `install` command.
pub struct Runtime {
    pub platform: Platform,
    pub executor: Arc<dyn CommandExecutor>,
    pub variables: Arc<dyn VariableLookup>,
    pub publisher: Arc<dyn EnvironmentPublisher>,
    pub cancel: CancellationToken,
    /// Whether the process already runs with administrative rights.
    pub privileged: bool,
}

/// Loads the profile, applies overrides and validates the result.
pub fn load_validated_profile(
    file: &camino::Utf8Path,
    version: Option<&str>,
    architecture: Option<&str>,
) -> Result<Profile> {
    let mut profile = config::load_profile(file)
        .with_context(|| format!("failed to load profile from {}", file))?;
    profile.apply_overrides(version, architecture);
    profile.validate().context("profile validation failed")?;
    Ok(profile)
}

/// Builds the acquisition flow for `profile` on top of `runtime`.
pub fn build_acquirer(profile: &Profile, runtime: &Runtime) -> Result<Acquirer> {
    let privilege = profile.privilege.resolve(runtime.platform, runtime.privileged);
    let capabilities =
        PlatformCapabilities::for_platform(runtime.platform, runtime.executor.clone(), privilege);
    tracing::debug!("platform {}: {:?}", runtime.platform, capabilities);

    let extractor = Arc::new(JdkArchiveExtractor::new(runtime.executor.clone(), runtime.platform));
    let installer = Installer::new(
        runtime.platform,
        profile.roots.clone(),
        capabilities,
        extractor,
        runtime.variables.clone(),
    )
    .with_cancellation(runtime.cancel.clone());

    let tool_cache: Arc<dyn ToolCache> =
        match profile.tool_cache.clone().or_else(agent_tool_cache_root) {
            Some(root) => Arc::new(LocalToolCache::new(root)),
            None => Arc::new(EmptyToolCache),
        };

    let mut acquirer = Acquirer::new(
        tool_cache,
        installer,
        runtime.variables.clone(),
        runtime.publisher.clone(),
    )
    .with_cancellation(runtime.cancel.clone());

    if let JdkSource::AzureStorage(azure) = &profile.source {
        let fetcher = AzureBlobFetcher::new(azure.clone())
            .context("failed to set up azure storage fetcher")?;
        acquirer = acquirer.with_fetcher(Arc::new(fetcher));
    }

    Ok(acquirer)
}

pub fn run_install(opts: &cli::InstallArgs, runtime: &Runtime) -> Result<AcquiredJdk> {
    let profile =
        load_validated_profile(&opts.file, opts.version.as_deref(), opts.arch.as_deref())?;
    let acquirer = build_acquirer(&profile, runtime)?;
    acquirer
        .acquire(&JdkRequest::from(&profile))
        .with_context(|| format!("failed to acquire JDK {}", profile.version))
}

pub fn run_validate(opts: &cli::ValidateArgs) -> Result<()> {
    let profile = load_validated_profile(&opts.file, None, None)?;
    info!("validation successful:\n{:#?}", profile);
    Ok(())
}

pub fn run_completions<W: Write>(opts: &cli::CompletionsArgs, out: &mut W) -> Result<()> {
    let mut cmd = cli::Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(opts.shell, &mut cmd, name, out);
    Ok(())
}
