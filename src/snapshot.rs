//! Directory snapshots and before/after diffing.
//!
//! None of the platform install tools report where they put things. The only
//! reliable signal is which top-level entries appear in a well-known
//! directory (`/Volumes`, `/Library/Java/JavaVirtualMachines`) while the tool
//! runs. Entries are compared by name only.

use std::collections::BTreeSet;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::JdkstrapError;

/// The set of entry names in one directory at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    entries: BTreeSet<String>,
}

impl DirectorySnapshot {
    /// Lists the immediate entries of `path`.
    pub fn capture(path: &Utf8Path) -> Result<Self, JdkstrapError> {
        let read_dir = fs::read_dir(path)
            .map_err(|e| JdkstrapError::io(format!("failed to read directory: {}", path), e))?;

        let mut entries = BTreeSet::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| {
                JdkstrapError::io(format!("failed to read directory entry: {}", path), e)
            })?;
            entries.insert(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(Self { entries })
    }

    /// Builds a snapshot from a list of names.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the names present in `after` but not in `before`.
    pub fn diff(before: &Self, after: &Self) -> Vec<String> {
        after.entries.difference(&before.entries).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains(name)
    }
}

/// A pending before/after observation of one directory.
///
/// [`begin`](Self::begin) captures the "before" state. [`finish`](Self::finish)
/// consumes the watch, so every "after" snapshot is paired with the "before"
/// of the same directory.
#[derive(Debug)]
#[must_use = "a directory watch must be finished to observe new entries"]
pub struct DirectoryWatch {
    root: Utf8PathBuf,
    before: DirectorySnapshot,
}

impl DirectoryWatch {
    /// Captures the current entries of `root`.
    ///
    /// A missing `root` counts as empty; installers create it on first use.
    pub fn begin(root: &Utf8Path) -> Result<Self, JdkstrapError> {
        let before = match DirectorySnapshot::capture(root) {
            Ok(snapshot) => snapshot,
            Err(JdkstrapError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("{} does not exist yet, treating as empty", root);
                DirectorySnapshot::default()
            }
            Err(e) => return Err(e),
        };
        tracing::debug!("watching {} ({} existing entries)", root, before.len());
        Ok(Self {
            root: root.to_owned(),
            before,
        })
    }

    /// Captures `root` again and returns the entries that appeared since
    /// [`begin`](Self::begin), in name order.
    pub fn finish(self) -> Result<Vec<String>, JdkstrapError> {
        let after = DirectorySnapshot::capture(&self.root)?;
        let added = DirectorySnapshot::diff(&self.before, &after);
        tracing::debug!("{} new entries in {}: {:?}", added.len(), self.root, added);
        Ok(added)
    }
}
