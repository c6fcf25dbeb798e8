//! Source selection for one JDK request.
//!
//! The tool cache always wins. Otherwise the configured source decides:
//! a pre-installed JDK is taken from its agent variable, a local or remote
//! archive is handed to the [`Installer`]. The resolved home is published
//! only after everything else succeeded.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::archive::ArchiveKind;
use crate::cache::ToolCache;
use crate::cancel::CancellationToken;
use crate::config::{JdkSource, Profile};
use crate::environment::{
    EnvironmentPublisher, VariableLookup, extended_home_variable, publish_jdk_home,
};
use crate::error::JdkstrapError;
use crate::fetch::ArtifactFetcher;
use crate::installer::{InstallOutcome, InstallRequest, Installer};

/// What to acquire and from where.
#[derive(Debug, Clone)]
pub struct JdkRequest {
    pub version: String,
    pub architecture: String,
    pub source: JdkSource,
    /// Download and extraction directory.
    pub destination: Utf8PathBuf,
    pub clean_destination: bool,
    pub variable_prefix: String,
}

impl JdkRequest {
    /// Name of the `<PREFIX>_<version>_<arch>` variable.
    pub fn extended_variable(&self) -> String {
        extended_home_variable(&self.variable_prefix, &self.version, &self.architecture)
    }
}

impl From<&Profile> for JdkRequest {
    fn from(profile: &Profile) -> Self {
        Self {
            version: profile.version.clone(),
            architecture: profile.architecture.clone(),
            source: profile.source.clone(),
            destination: profile.destination.clone(),
            clean_destination: profile.clean_destination,
            variable_prefix: profile.variable_prefix.clone(),
        }
    }
}

/// Where the published JDK came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum JdkOrigin {
    ToolCache,
    Preinstalled,
    Installed,
    Recovered,
}

/// A resolved and published JDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredJdk {
    pub home: Utf8PathBuf,
    pub origin: JdkOrigin,
}

/// Resolves a [`JdkRequest`] with injected collaborators.
pub struct Acquirer {
    tool_cache: Arc<dyn ToolCache>,
    fetcher: Option<Arc<dyn ArtifactFetcher>>,
    installer: Installer,
    variables: Arc<dyn VariableLookup>,
    publisher: Arc<dyn EnvironmentPublisher>,
    cancel: CancellationToken,
}

impl Acquirer {
    pub fn new(
        tool_cache: Arc<dyn ToolCache>,
        installer: Installer,
        variables: Arc<dyn VariableLookup>,
        publisher: Arc<dyn EnvironmentPublisher>,
    ) -> Self {
        Self {
            tool_cache,
            fetcher: None,
            installer,
            variables,
            publisher,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the fetcher used for remote sources.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolves, installs if needed, and publishes the requested JDK.
    #[tracing::instrument(
        skip_all,
        fields(version = %request.version, source = request.source.name())
    )]
    pub fn acquire(&self, request: &JdkRequest) -> Result<AcquiredJdk> {
        let extended_variable = request.extended_variable();

        self.cancel.check("tool cache lookup")?;
        let acquired = if let Some(home) =
            self.tool_cache.find(&request.version, &request.architecture)?
        {
            info!("found JDK {} in the tool cache: {}", request.version, home);
            AcquiredJdk {
                home,
                origin: JdkOrigin::ToolCache,
            }
        } else {
            self.acquire_from_source(request, &extended_variable)?
        };

        self.cancel.check("publishing variables")?;
        publish_jdk_home(
            self.publisher.as_ref(),
            &request.variable_prefix,
            &extended_variable,
            &acquired.home,
        )
        .context("failed to publish JDK variables")?;

        info!("JDK {} ready ({}): {}", request.version, acquired.origin, acquired.home);
        Ok(acquired)
    }

    fn acquire_from_source(
        &self,
        request: &JdkRequest,
        extended_variable: &str,
    ) -> Result<AcquiredJdk> {
        let archive = match &request.source {
            JdkSource::Cache => {
                return Err(JdkstrapError::NotCached {
                    version: request.version.clone(),
                    architecture: request.architecture.clone(),
                }
                .into());
            }
            JdkSource::Preinstalled => {
                let home = self.variables.get(extended_variable).ok_or_else(|| {
                    JdkstrapError::PreinstalledMissing {
                        version: request.version.clone(),
                        variable: extended_variable.to_string(),
                    }
                })?;
                info!("using pre-installed JDK from {}: {}", extended_variable, home);
                return Ok(AcquiredJdk {
                    home: Utf8PathBuf::from(home),
                    origin: JdkOrigin::Preinstalled,
                });
            }
            JdkSource::Local { file } => {
                ArchiveKind::classify(file.as_str())?;
                self.prepare_destination(request, Some(file.as_path()))?;
                file.clone()
            }
            JdkSource::AzureStorage(azure) => {
                // A pattern can only be classified once it resolved to a file.
                if !azure.is_pattern() {
                    ArchiveKind::classify(azure.file_name())?;
                }
                let fetcher = self.fetcher.as_ref().ok_or_else(|| {
                    JdkstrapError::Config("no fetcher configured for azure-storage".to_string())
                })?;
                self.prepare_destination(request, None)?;
                self.cancel.check("download")?;
                let mut files = fetcher.fetch(&request.destination, &azure.blob)?;
                if files.len() != 1 {
                    return Err(JdkstrapError::Download(format!(
                        "expected exactly one archive for {}, downloaded {}",
                        azure.blob,
                        files.len()
                    ))
                    .into());
                }
                files.remove(0)
            }
        };

        let install = InstallRequest::new(
            archive,
            request.destination.clone(),
            request.version.clone(),
            extended_variable,
        )?;
        let acquired = match self.installer.install(&install)? {
            InstallOutcome::Installed { home } => AcquiredJdk {
                home,
                origin: JdkOrigin::Installed,
            },
            InstallOutcome::Recovered { home } => AcquiredJdk {
                home,
                origin: JdkOrigin::Recovered,
            },
        };
        Ok(acquired)
    }

    fn prepare_destination(&self, request: &JdkRequest, keep: Option<&Utf8Path>) -> Result<()> {
        if request.clean_destination {
            self.cancel.check("cleaning destination")?;
            clean_directory(&request.destination, keep)?;
        }
        fs::create_dir_all(&request.destination).map_err(|e| {
            JdkstrapError::io(format!("failed to create directory: {}", request.destination), e)
        })?;
        Ok(())
    }
}

/// Removes everything inside `dir` except the entry holding `keep`.
///
/// Both paths are compared in canonical form, so a relative `keep` or one
/// spelled through symlinks or `..` is still recognized. A missing `dir` is
/// left alone.
fn clean_directory(dir: &Utf8Path, keep: Option<&Utf8Path>) -> Result<(), JdkstrapError> {
    let canonical_dir = match dir.canonicalize_utf8() {
        Ok(canonical_dir) => canonical_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(JdkstrapError::io(format!("failed to resolve directory: {}", dir), e));
        }
    };
    let read_dir = canonical_dir
        .read_dir_utf8()
        .map_err(|e| JdkstrapError::io(format!("failed to read directory: {}", dir), e))?;
    // A missing archive holds nothing worth keeping.
    let keep = keep.and_then(|keep| keep.canonicalize_utf8().ok());

    info!("cleaning destination directory {}", dir);
    for entry in read_dir {
        let entry =
            entry.map_err(|e| JdkstrapError::io(format!("failed to read entry in: {}", dir), e))?;
        let path = entry.path();
        if keep.as_ref().is_some_and(|keep| keep.starts_with(path)) {
            warn!("not removing {} because it holds the source archive", path);
            continue;
        }

        let file_type = entry
            .file_type()
            .map_err(|e| JdkstrapError::io(format!("failed to read metadata: {}", path), e))?;
        let removed = if file_type.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        removed.map_err(|e| JdkstrapError::io(format!("failed to remove: {}", path), e))?;
    }
    Ok(())
}
