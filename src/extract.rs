//! Extraction of portable JDK archives (tar, tar.gz, zip, 7z).
//!
//! Each archive is unpacked into its own folder under the destination
//! directory, named after the archive without its suffix. The JDK home is the
//! first directory, breadth-first, that holds `bin/java`. This covers both
//! flat archives and macOS tarballs with a `Contents/Home` layout.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::archive::ArchiveKind;
use crate::error::JdkstrapError;
use crate::executor::{CommandExecutor, CommandSpec};
use crate::platform::Platform;

const SEVEN_ZIP: &str = "7z";

/// How deep below the extraction folder a JDK home is searched for.
const MAX_HOME_DEPTH: usize = 4;

/// Unpacks an archive and locates the JDK inside it.
pub trait ArchiveExtractor: Send + Sync {
    /// Extracts `archive` of the given `kind` below `destination` and
    /// returns the JDK home.
    fn extract(
        &self,
        archive: &Utf8Path,
        kind: ArchiveKind,
        destination: &Utf8Path,
    ) -> Result<Utf8PathBuf>;
}

/// Extractor backed by the `tar`, `flate2` and `zip` crates, with `7z` run
/// as an external tool.
pub struct JdkArchiveExtractor {
    executor: Arc<dyn CommandExecutor>,
    platform: Platform,
}

impl JdkArchiveExtractor {
    pub fn new(executor: Arc<dyn CommandExecutor>, platform: Platform) -> Self {
        Self { executor, platform }
    }

    fn unpack(&self, archive: &Utf8Path, kind: ArchiveKind, target: &Utf8Path) -> Result<()> {
        match kind {
            ArchiveKind::Tar => {
                let file = open_archive(archive)?;
                tar::Archive::new(file)
                    .unpack(target)
                    .with_context(|| format!("failed to unpack tar archive {}", archive))
            }
            ArchiveKind::TarGz => {
                let file = open_archive(archive)?;
                tar::Archive::new(GzDecoder::new(file))
                    .unpack(target)
                    .with_context(|| format!("failed to unpack tar.gz archive {}", archive))
            }
            ArchiveKind::Zip => {
                let file = open_archive(archive)?;
                let mut zip = zip::ZipArchive::new(file)
                    .with_context(|| format!("failed to read zip archive {}", archive))?;
                zip.extract(target)
                    .with_context(|| format!("failed to unpack zip archive {}", archive))
            }
            ArchiveKind::SevenZip => {
                let spec = CommandSpec::new(
                    SEVEN_ZIP,
                    vec![
                        "x".to_string(),
                        "-y".to_string(),
                        format!("-o{}", target),
                        archive.to_string(),
                    ],
                );
                let result = self.executor.execute(&spec)?;
                if !result.success() {
                    return Err(JdkstrapError::execution(&spec, result.describe()).into());
                }
                Ok(())
            }
            ArchiveKind::DiskImage | ArchiveKind::Package => Err(JdkstrapError::Validation(
                format!("{} archives cannot be extracted: {}", kind, archive),
            )
            .into()),
        }
    }
}

fn open_archive(archive: &Utf8Path) -> Result<File> {
    File::open(archive)
        .map_err(|e| JdkstrapError::io(format!("failed to open archive: {}", archive), e).into())
}

impl ArchiveExtractor for JdkArchiveExtractor {
    fn extract(
        &self,
        archive: &Utf8Path,
        kind: ArchiveKind,
        destination: &Utf8Path,
    ) -> Result<Utf8PathBuf> {
        let file_name = archive.file_name().ok_or_else(|| {
            JdkstrapError::Validation(format!("archive path has no file name: {}", archive))
        })?;
        let target = destination.join(kind.strip_suffix(file_name));
        let java = self.platform.java_executable();

        if target.is_dir()
            && let Some(home) = find_java_home(&target, java)?
        {
            info!("{} is already extracted, using {}", archive, home);
            return Ok(home);
        }

        if !archive.is_file() {
            return Err(JdkstrapError::Validation(format!(
                "JDK archive does not exist or is not a file: {}",
                archive
            ))
            .into());
        }

        info!("extracting {} to {}", archive, target);
        fs::create_dir_all(&target)
            .map_err(|e| JdkstrapError::io(format!("failed to create directory: {}", target), e))?;
        self.unpack(archive, kind, &target)?;

        let home = find_java_home(&target, java)?
            .ok_or_else(|| JdkstrapError::JdkNotFound(target.to_string()))?;
        info!("extracted JDK home: {}", home);
        Ok(home)
    }
}

/// Finds the shallowest directory below `root` containing `bin/<java>`.
pub fn find_java_home(root: &Utf8Path, java: &str) -> Result<Option<Utf8PathBuf>, JdkstrapError> {
    let mut queue = VecDeque::from([(root.to_owned(), 0usize)]);

    while let Some((dir, depth)) = queue.pop_front() {
        if dir.join("bin").join(java).is_file() {
            return Ok(Some(dir));
        }
        if depth >= MAX_HOME_DEPTH {
            continue;
        }

        let read_dir = fs::read_dir(&dir)
            .map_err(|e| JdkstrapError::io(format!("failed to read directory: {}", dir), e))?;
        let mut children = Vec::new();
        for entry in read_dir {
            let entry = entry
                .map_err(|e| JdkstrapError::io(format!("failed to read entry in: {}", dir), e))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                debug!("skipping non UTF-8 path in {}", dir);
                continue;
            };
            if path.is_dir() {
                children.push(path);
            }
        }
        children.sort();
        queue.extend(children.into_iter().map(|c| (c, depth + 1)));
    }

    Ok(None)
}
