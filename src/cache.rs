//! Lookup of JDKs already present in the agent's tool cache.
//!
//! The cache uses the hosted tool cache layout:
//!
//! ```text
//! <root>/Java/<version>/<arch>/          JDK home
//! <root>/Java/<version>/<arch>.complete  marker written after a full install
//! ```
//!
//! Only versions with the marker are considered.

use std::fs;

use camino::Utf8PathBuf;
use semver::{Version, VersionReq};
use tracing::debug;

use crate::error::JdkstrapError;

const TOOL_NAME: &str = "Java";

/// Resolves a version spec against previously installed JDKs.
pub trait ToolCache: Send + Sync {
    /// Returns the cached JDK home of the best match, if any.
    fn find(
        &self,
        version_spec: &str,
        architecture: &str,
    ) -> Result<Option<Utf8PathBuf>, JdkstrapError>;
}

/// Tool cache on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalToolCache {
    root: Utf8PathBuf,
}

impl LocalToolCache {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn tool_dir(&self) -> Utf8PathBuf {
        self.root.join(TOOL_NAME)
    }

    /// Lists completed versions for `architecture`, in directory order.
    fn complete_versions(
        &self,
        architecture: &str,
    ) -> Result<Vec<(Version, String)>, JdkstrapError> {
        let tool_dir = self.tool_dir();
        let read_dir = match fs::read_dir(&tool_dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("tool cache {} does not exist", tool_dir);
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(JdkstrapError::io(
                    format!("failed to read tool cache: {}", tool_dir),
                    e,
                ));
            }
        };

        let mut versions = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| {
                JdkstrapError::io(format!("failed to read tool cache: {}", tool_dir), e)
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(version) = parse_cached_version(&name) else {
                debug!("ignoring non-version entry in tool cache: {}", name);
                continue;
            };
            let marker = tool_dir.join(&name).join(format!("{}.complete", architecture));
            if marker.is_file() {
                versions.push((version, name));
            } else {
                debug!("tool cache entry {} has no {} marker", name, marker);
            }
        }
        Ok(versions)
    }
}

/// Parses a cache directory name, accepting `1.8.0_252` style names by
/// treating the update number as build metadata.
fn parse_cached_version(name: &str) -> Option<Version> {
    Version::parse(name)
        .or_else(|_| Version::parse(&name.replacen('_', "+", 1)))
        .ok()
}

/// Parses the requested version spec. A plain `11` matches any `11.x.y`.
fn parse_version_spec(spec: &str) -> Option<VersionReq> {
    match VersionReq::parse(spec.trim()) {
        Ok(requirement) => Some(requirement),
        Err(e) => {
            debug!("version spec '{}' is not a semver range ({}), skipping tool cache", spec, e);
            None
        }
    }
}

impl ToolCache for LocalToolCache {
    fn find(
        &self,
        version_spec: &str,
        architecture: &str,
    ) -> Result<Option<Utf8PathBuf>, JdkstrapError> {
        let Some(requirement) = parse_version_spec(version_spec) else {
            return Ok(None);
        };
        let best = self
            .complete_versions(architecture)?
            .into_iter()
            .filter(|(version, _)| requirement.matches(version))
            .max_by(|(a, _), (b, _)| a.cmp(b));

        Ok(best.map(|(version, name)| {
            let home = self.tool_dir().join(name).join(architecture);
            debug!("tool cache match for {}: {} at {}", version_spec, version, home);
            home
        }))
    }
}

/// Returns the tool cache root from `AGENT_TOOLSDIRECTORY`, if set.
pub fn agent_tool_cache_root() -> Option<Utf8PathBuf> {
    std::env::var("AGENT_TOOLSDIRECTORY")
        .ok()
        .filter(|v| !v.is_empty())
        .map(Utf8PathBuf::from)
}

/// Tool cache that never has anything, for agents without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyToolCache;

impl ToolCache for EmptyToolCache {
    fn find(
        &self,
        _version_spec: &str,
        _architecture: &str,
    ) -> Result<Option<Utf8PathBuf>, JdkstrapError> {
        Ok(None)
    }
}
