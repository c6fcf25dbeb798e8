//! Installation orchestrator.
//!
//! Turns a JDK archive into a JDK home directory:
//!
//! - `.tar`, `.tar.gz`, `.zip`, `.7z` are handed to the [`ArchiveExtractor`].
//! - `.pkg` is installed with the platform [`PackageInstaller`].
//! - `.dmg` is attached with the [`DiskImageMounter`], the single `.pkg` on
//!   the new volume is installed, and the volume is detached again.
//!
//! The package installer does not say where it put the JDK. The new JDK is
//! whatever single entry appears under the JDK root while it runs. No new
//! entry means the same version was already installed; that is recovered from
//! the `<PREFIX>_<version>_<arch>` variable when the agent provides it. More
//! than one new entry is never guessed at.
//!
//! Steps run strictly one after another. Cancellation is honoured between
//! steps, never during a running tool.

use std::fs;
use std::sync::Arc;

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::archive::ArchiveKind;
use crate::cancel::CancellationToken;
use crate::environment::VariableLookup;
use crate::error::{InstallDetectionError, JdkstrapError, PackageLookupError};
use crate::extract::ArchiveExtractor;
use crate::mounter::DiskImageMounter;
use crate::package::PackageInstaller;
use crate::platform::{Platform, PlatformCapabilities};
use crate::snapshot::DirectoryWatch;

const PACKAGE_SUFFIX: &str = ".pkg";

fn default_volumes_root() -> Utf8PathBuf {
    Utf8PathBuf::from("/Volumes")
}

fn default_jdk_root() -> Utf8PathBuf {
    Utf8PathBuf::from("/Library/Java/JavaVirtualMachines")
}

fn default_home_suffix() -> Utf8PathBuf {
    Utf8PathBuf::from("Contents/Home")
}

fn default_install_target() -> Utf8PathBuf {
    Utf8PathBuf::from("/")
}

/// Filesystem locations used by disk-image and package installs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstallRoots {
    /// Where attached disk images appear.
    #[serde(default = "default_volumes_root")]
    pub volumes: Utf8PathBuf,
    /// Where the package installer puts JDK bundles.
    #[serde(default = "default_jdk_root")]
    pub jdk: Utf8PathBuf,
    /// JDK home relative to a bundle under `jdk`.
    #[serde(default = "default_home_suffix")]
    pub home_suffix: Utf8PathBuf,
    /// Target volume passed to the package installer.
    #[serde(default = "default_install_target")]
    pub install_target: Utf8PathBuf,
}

impl Default for InstallRoots {
    fn default() -> Self {
        Self {
            volumes: default_volumes_root(),
            jdk: default_jdk_root(),
            home_suffix: default_home_suffix(),
            install_target: default_install_target(),
        }
    }
}

impl InstallRoots {
    pub fn validate(&self) -> Result<(), JdkstrapError> {
        for (field, path) in [
            ("roots.volumes", &self.volumes),
            ("roots.jdk", &self.jdk),
            ("roots.install_target", &self.install_target),
        ] {
            if !path.is_absolute() {
                return Err(JdkstrapError::Validation(format!(
                    "{} must be an absolute path: {}",
                    field, path
                )));
            }
        }
        if self.home_suffix.is_absolute() {
            return Err(JdkstrapError::Validation(format!(
                "roots.home_suffix must be relative: {}",
                self.home_suffix
            )));
        }
        Ok(())
    }
}

/// One archive to install.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub archive: Utf8PathBuf,
    pub kind: ArchiveKind,
    /// Extraction directory for portable archives.
    pub destination: Utf8PathBuf,
    /// Requested version, for diagnostics.
    pub version: String,
    /// Variable that names an already installed JDK of this version.
    pub extended_variable: String,
}

impl InstallRequest {
    /// Classifies `archive` and builds the request.
    pub fn new(
        archive: impl Into<Utf8PathBuf>,
        destination: impl Into<Utf8PathBuf>,
        version: impl Into<String>,
        extended_variable: impl Into<String>,
    ) -> Result<Self, JdkstrapError> {
        let archive = archive.into();
        let kind = ArchiveKind::classify(archive.as_str())?;
        Ok(Self {
            archive,
            kind,
            destination: destination.into(),
            version: version.into(),
            extended_variable: extended_variable.into(),
        })
    }
}

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// A new JDK was installed or extracted.
    Installed { home: Utf8PathBuf },
    /// The installer changed nothing; the already installed JDK of the
    /// requested version is used.
    Recovered { home: Utf8PathBuf },
}

impl InstallOutcome {
    pub fn home(&self) -> &Utf8Path {
        match self {
            Self::Installed { home } | Self::Recovered { home } => home,
        }
    }

    pub fn into_home(self) -> Utf8PathBuf {
        match self {
            Self::Installed { home } | Self::Recovered { home } => home,
        }
    }
}

/// Coordinates classification, mounting, package installation and
/// extraction for one archive at a time.
pub struct Installer {
    platform: Platform,
    roots: InstallRoots,
    capabilities: PlatformCapabilities,
    extractor: Arc<dyn ArchiveExtractor>,
    variables: Arc<dyn VariableLookup>,
    cancel: CancellationToken,
}

impl Installer {
    pub fn new(
        platform: Platform,
        roots: InstallRoots,
        capabilities: PlatformCapabilities,
        extractor: Arc<dyn ArchiveExtractor>,
        variables: Arc<dyn VariableLookup>,
    ) -> Self {
        Self {
            platform,
            roots,
            capabilities,
            extractor,
            variables,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` to abort between steps.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Installs the archive described by `request` and returns its JDK home.
    #[tracing::instrument(
        skip(self, request),
        fields(archive = %request.archive, kind = %request.kind)
    )]
    pub fn install(&self, request: &InstallRequest) -> Result<InstallOutcome> {
        self.cancel.check("installation")?;

        match request.kind {
            ArchiveKind::DiskImage => self.install_disk_image(request),
            ArchiveKind::Package => {
                let installer = self.package_installer(request.kind)?;
                self.install_package(installer.as_ref(), &request.archive, request)
            }
            ArchiveKind::Tar | ArchiveKind::TarGz | ArchiveKind::Zip | ArchiveKind::SevenZip => {
                let home =
                    self.extractor
                        .extract(&request.archive, request.kind, &request.destination)?;
                Ok(InstallOutcome::Installed { home })
            }
        }
    }

    fn unsupported(&self, kind: ArchiveKind) -> JdkstrapError {
        JdkstrapError::UnsupportedPlatform {
            kind: kind.to_string(),
            platform: self.platform.to_string(),
        }
    }

    fn package_installer(&self, kind: ArchiveKind) -> Result<Arc<dyn PackageInstaller>> {
        self.capabilities
            .package_installer
            .clone()
            .ok_or_else(|| self.unsupported(kind).into())
    }

    fn mounter(&self, kind: ArchiveKind) -> Result<Arc<dyn DiskImageMounter>> {
        self.capabilities
            .mounter
            .clone()
            .ok_or_else(|| self.unsupported(kind).into())
    }

    fn install_disk_image(&self, request: &InstallRequest) -> Result<InstallOutcome> {
        let mounter = self.mounter(request.kind)?;
        let installer = self.package_installer(request.kind)?;

        let watch = DirectoryWatch::begin(&self.roots.volumes)?;
        self.cancel.check("disk image attach")?;
        mounter.attach(&request.archive)?;
        let new_volumes = watch.finish()?;

        let volume = match new_volumes.as_slice() {
            [volume] => self.roots.volumes.join(volume),
            _ => {
                if !new_volumes.is_empty() {
                    warn!(
                        "{} volumes appeared while attaching {}, leaving them mounted: {:?}",
                        new_volumes.len(),
                        request.archive,
                        new_volumes
                    );
                }
                return Err(JdkstrapError::MountStructure {
                    root: self.roots.volumes.to_string(),
                    entries: new_volumes,
                }
                .into());
            }
        };
        info!("disk image mounted at {}", volume);

        // Detach must run once the volume is attached, whatever happens here.
        let outcome = (|| -> Result<InstallOutcome> {
            self.cancel.check("package install")?;
            let package = find_single_package(&volume)?;
            self.install_package(installer.as_ref(), &package, request)
        })();

        if let Err(e) = mounter.detach(&volume) {
            warn!("failed to detach {}: {:#}", volume, e);
        }

        outcome
    }

    fn install_package(
        &self,
        installer: &dyn PackageInstaller,
        package: &Utf8Path,
        request: &InstallRequest,
    ) -> Result<InstallOutcome> {
        if !package.exists() {
            return Err(JdkstrapError::from(PackageLookupError::Missing {
                path: package.to_string(),
            })
            .into());
        }

        let watch = DirectoryWatch::begin(&self.roots.jdk)?;
        installer.install(package, &self.roots.install_target)?;
        let new_jdks = watch.finish()?;

        match new_jdks.as_slice() {
            [jdk] => {
                let home = self.roots.jdk.join(jdk).join(&self.roots.home_suffix);
                info!("JDK installed to {}", home);
                Ok(InstallOutcome::Installed { home })
            }
            [] => match self.variables.get(&request.extended_variable) {
                Some(existing) => {
                    info!(
                        "JDK {} was already installed, using {} from {}",
                        request.version, existing, request.extended_variable
                    );
                    Ok(InstallOutcome::Recovered {
                        home: Utf8PathBuf::from(existing),
                    })
                }
                None => Err(JdkstrapError::from(InstallDetectionError::NotInstalled {
                    root: self.roots.jdk.to_string(),
                    variable: request.extended_variable.clone(),
                    version: request.version.clone(),
                })
                .into()),
            },
            _ => Err(JdkstrapError::from(InstallDetectionError::Ambiguous {
                root: self.roots.jdk.to_string(),
                entries: new_jdks,
            })
            .into()),
        }
    }
}

/// Finds the only `.pkg` below `volume`.
///
/// Package bundles are directories; they match by name and are not descended
/// into.
pub fn find_single_package(volume: &Utf8Path) -> Result<Utf8PathBuf, JdkstrapError> {
    let mut packages = Vec::new();
    collect_packages(volume, &mut packages)?;
    packages.sort();

    match packages.len() {
        1 => Ok(packages.remove(0)),
        0 => Err(PackageLookupError::NotFound {
            volume: volume.to_string(),
        }
        .into()),
        _ => Err(PackageLookupError::Multiple {
            volume: volume.to_string(),
            packages: packages.iter().map(|p| p.to_string()).collect(),
        }
        .into()),
    }
}

fn collect_packages(
    dir: &Utf8Path,
    packages: &mut Vec<Utf8PathBuf>,
) -> Result<(), JdkstrapError> {
    let read_dir = dir
        .read_dir_utf8()
        .map_err(|e| JdkstrapError::io(format!("failed to read directory: {}", dir), e))?;

    for entry in read_dir {
        let entry =
            entry.map_err(|e| JdkstrapError::io(format!("failed to read entry in: {}", dir), e))?;
        let path = entry.path();
        let file_type = fs::symlink_metadata(path)
            .map_err(|e| JdkstrapError::io(format!("failed to read metadata: {}", path), e))?
            .file_type();

        if entry.file_name().ends_with(PACKAGE_SUFFIX) {
            packages.push(path.to_owned());
        } else if file_type.is_dir() {
            collect_packages(path, packages)?;
        }
    }
    Ok(())
}
