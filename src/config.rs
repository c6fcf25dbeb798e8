//! Profile configuration.
//!
//! A profile describes which JDK to acquire, where it comes from and where
//! portable archives are extracted. It is loaded from YAML, optionally
//! overridden from the command line, and validated before anything runs.

use std::fs::File;
use std::io::BufReader;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::archive::ArchiveKind;
use crate::environment::DEFAULT_VARIABLE_PREFIX;
use crate::error::JdkstrapError;
use crate::fetch::AzureStorageConfig;
use crate::installer::InstallRoots;
use crate::privilege::Privilege;

/// Where the JDK comes from when the tool cache has no match.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JdkSource {
    /// Only the tool cache is consulted.
    Cache,
    /// A JDK shipped with the agent image, announced via
    /// `<PREFIX>_<version>_<arch>`.
    Preinstalled,
    /// An archive in Azure blob storage.
    AzureStorage(AzureStorageConfig),
    /// An archive already on the agent's disk.
    Local {
        /// Path to the archive.
        file: Utf8PathBuf,
    },
}

impl JdkSource {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Preinstalled => "preinstalled",
            Self::AzureStorage(_) => "azure-storage",
            Self::Local { .. } => "local",
        }
    }
}

fn default_variable_prefix() -> String {
    DEFAULT_VARIABLE_PREFIX.to_string()
}

/// Top-level profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// Version spec, e.g. `11` or `1.8`.
    pub version: String,
    /// Architecture tag, e.g. `x64`, `x86`, `arm64`.
    pub architecture: String,
    /// Directory archives are downloaded to and extracted below.
    pub destination: Utf8PathBuf,
    /// Remove everything in `destination` before acquiring an archive.
    #[serde(default)]
    pub clean_destination: bool,
    /// JDK source.
    pub source: JdkSource,
    /// Tool cache root. Falls back to `AGENT_TOOLSDIRECTORY`.
    #[serde(default)]
    pub tool_cache: Option<Utf8PathBuf>,
    /// Name of the fixed JDK home variable.
    #[serde(default = "default_variable_prefix")]
    pub variable_prefix: String,
    /// Privilege escalation for `hdiutil` and `installer`.
    #[serde(default)]
    pub privilege: Privilege,
    /// Filesystem roots watched during macOS installs.
    #[serde(default)]
    pub roots: InstallRoots,
}

impl Profile {
    /// Validates the profile.
    ///
    /// The archive suffix of a local source is checked here so that a bad
    /// file name fails before anything is cleaned or downloaded.
    pub fn validate(&self) -> Result<(), JdkstrapError> {
        if self.version.trim().is_empty() {
            return Err(JdkstrapError::Validation("version must not be empty".to_string()));
        }
        if self.architecture.trim().is_empty() {
            return Err(JdkstrapError::Validation("architecture must not be empty".to_string()));
        }
        for (field, value) in [("version", &self.version), ("architecture", &self.architecture)] {
            if !value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            {
                return Err(JdkstrapError::Validation(format!(
                    "{} '{}' may only contain letters, digits, '.', '-' and '_'",
                    field, value
                )));
            }
        }
        if self.variable_prefix.trim().is_empty() {
            return Err(JdkstrapError::Validation(
                "variable_prefix must not be empty".to_string(),
            ));
        }
        if self.destination.as_str().is_empty() {
            return Err(JdkstrapError::Validation("destination must not be empty".to_string()));
        }
        if self.clean_destination && is_filesystem_root(&self.destination) {
            return Err(JdkstrapError::Validation(format!(
                "refusing to clean filesystem root: {}",
                self.destination
            )));
        }

        match &self.source {
            JdkSource::Local { file } => {
                ArchiveKind::classify(file.as_str())?;
            }
            JdkSource::AzureStorage(azure) => azure.validate()?,
            JdkSource::Cache | JdkSource::Preinstalled => {}
        }

        self.roots.validate()
    }

    /// Applies command-line overrides.
    pub fn apply_overrides(&mut self, version: Option<&str>, architecture: Option<&str>) {
        if let Some(version) = version {
            self.version = version.to_string();
        }
        if let Some(architecture) = architecture {
            self.architecture = architecture.to_string();
        }
    }
}

fn is_filesystem_root(path: &Utf8Path) -> bool {
    path.parent().is_none()
}

/// Loads a profile from a YAML file.
pub fn load_profile(path: &Utf8Path) -> Result<Profile, JdkstrapError> {
    let file = File::open(path).map_err(|e| JdkstrapError::io(path.as_str(), e))?;
    let reader = BufReader::new(file);
    serde_yaml::from_reader(reader)
        .map_err(|e| JdkstrapError::Config(format!("failed to parse {}: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Profile {
        serde_yaml::from_str(yaml).expect("profile should parse")
    }

    #[test]
    fn local_source_with_defaults() {
        let profile = parse(
            "version: \"11\"\narchitecture: x64\ndestination: /opt/jdks\n\
            source:\n  type: local\n  file: /tmp/jdk-11.tar.gz\n",
        );
        assert_eq!(profile.variable_prefix, "JAVA_HOME");
        assert!(!profile.clean_destination);
        assert_eq!(profile.privilege, Privilege::Auto);
        assert_eq!(profile.roots, InstallRoots::default());
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unsupported_local_archive() {
        let profile = parse(
            "version: \"11\"\narchitecture: x64\ndestination: /opt/jdks\n\
            source:\n  type: local\n  file: /tmp/jdk-11.exe\n",
        );
        let err = profile.validate().unwrap_err();
        assert!(matches!(err, JdkstrapError::Classification(_)));
    }

    #[test]
    fn validate_rejects_cleaning_root() {
        let profile = parse(
            "version: \"11\"\narchitecture: x64\ndestination: /\nclean_destination: true\n\
            source:\n  type: preinstalled\n",
        );
        assert!(matches!(profile.validate(), Err(JdkstrapError::Validation(_))));
    }

    #[test]
    fn validate_rejects_version_with_separator() {
        let profile = parse(
            "version: \"11/../x\"\narchitecture: x64\ndestination: /opt\n\
            source:\n  type: preinstalled\n",
        );
        assert!(matches!(profile.validate(), Err(JdkstrapError::Validation(_))));
    }

    #[test]
    fn unknown_source_type_is_rejected() {
        let result: Result<Profile, _> = serde_yaml::from_str(
            "version: \"11\"\narchitecture: x64\ndestination: /opt\nsource:\n  type: ftp\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn overrides_replace_version_and_architecture() {
        let mut profile = parse(
            "version: \"11\"\narchitecture: x64\ndestination: /opt\nsource:\n  type: cache\n",
        );
        profile.apply_overrides(Some("17"), None);
        assert_eq!(profile.version, "17");
        assert_eq!(profile.architecture, "x64");
    }
}
