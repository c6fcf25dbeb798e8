//! Platform detection and capability selection.
//!
//! The disk-image mounter and the package installer only exist on macOS.
//! [`PlatformCapabilities::for_platform`] is called once at startup and hands
//! the orchestrator whichever of them the current platform provides, so the
//! orchestrator never checks the operating system itself.

use std::sync::Arc;

use strum::Display;

use crate::executor::CommandExecutor;
use crate::mounter::{DiskImageMounter, HdiutilMounter};
use crate::package::{MacPackageInstaller, PackageInstaller};
use crate::privilege::PrivilegeMethod;

/// Operating system family the installer runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Platform {
    #[strum(serialize = "macOS")]
    MacOs,
    #[strum(serialize = "Windows")]
    Windows,
    #[strum(serialize = "Linux")]
    Linux,
    #[strum(serialize = "an unknown platform")]
    Other,
}

impl Platform {
    /// Returns the platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Other
        }
    }

    /// Name of the `java` launcher inside a JDK's `bin` directory.
    pub fn java_executable(&self) -> &'static str {
        match self {
            Self::Windows => "java.exe",
            _ => "java",
        }
    }
}

/// Platform-specific install steps available to the orchestrator.
#[derive(Clone, Default)]
pub struct PlatformCapabilities {
    pub mounter: Option<Arc<dyn DiskImageMounter>>,
    pub package_installer: Option<Arc<dyn PackageInstaller>>,
}

impl PlatformCapabilities {
    /// Selects the concrete install steps for `platform`.
    pub fn for_platform(
        platform: Platform,
        executor: Arc<dyn CommandExecutor>,
        privilege: Option<PrivilegeMethod>,
    ) -> Self {
        match platform {
            Platform::MacOs => Self {
                mounter: Some(Arc::new(HdiutilMounter::new(executor.clone(), privilege))),
                package_installer: Some(Arc::new(MacPackageInstaller::new(executor, privilege))),
            },
            Platform::Windows | Platform::Linux | Platform::Other => Self::default(),
        }
    }
}

impl std::fmt::Debug for PlatformCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformCapabilities")
            .field("mounter", &self.mounter.is_some())
            .field("package_installer", &self.package_installer.is_some())
            .finish()
    }
}
