//! Archive classification by file name suffix.

use strum::{Display, EnumIter, IntoEnumIterator};

use crate::error::JdkstrapError;

/// Recognized JDK archive formats.
///
/// Declaration order is the order suffixes are tested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ArchiveKind {
    #[strum(serialize = ".tar")]
    Tar,
    #[strum(serialize = ".tar.gz")]
    TarGz,
    #[strum(serialize = ".zip")]
    Zip,
    #[strum(serialize = ".7z")]
    SevenZip,
    #[strum(serialize = ".dmg")]
    DiskImage,
    #[strum(serialize = ".pkg")]
    Package,
}

impl ArchiveKind {
    /// Returns the file name suffix of this kind, including the leading dot.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Tar => ".tar",
            Self::TarGz => ".tar.gz",
            Self::Zip => ".zip",
            Self::SevenZip => ".7z",
            Self::DiskImage => ".dmg",
            Self::Package => ".pkg",
        }
    }

    /// Classifies `name` by the first recognized suffix it ends with.
    ///
    /// The test is a plain, case-sensitive `ends_with`. `jdk.TAR.GZ` is
    /// rejected rather than normalized.
    pub fn classify(name: &str) -> Result<Self, JdkstrapError> {
        Self::iter()
            .find(|kind| name.ends_with(kind.suffix()))
            .ok_or_else(|| JdkstrapError::Classification(name.to_string()))
    }

    /// Returns `name` without this kind's suffix, or `name` unchanged when it
    /// does not carry the suffix.
    pub fn strip_suffix<'a>(&self, name: &'a str) -> &'a str {
        name.strip_suffix(self.suffix()).unwrap_or(name)
    }
}
