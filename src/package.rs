//! macOS package installation.

use std::sync::Arc;

use anyhow::Result;
use camino::Utf8Path;
use tracing::{info, warn};

use crate::executor::{CommandExecutor, CommandSpec};
use crate::privilege::PrivilegeMethod;

const INSTALLER: &str = "installer";

/// Installs a package file onto a target volume.
pub trait PackageInstaller: Send + Sync {
    /// Runs the installer for `package` against `target`.
    ///
    /// Returns `Err` only when the installer could not be run. Whether the
    /// package actually installed is decided by the caller from the
    /// filesystem.
    fn install(&self, package: &Utf8Path, target: &Utf8Path) -> Result<()>;
}

/// Runs `installer -package <pkg> -target <root>`.
pub struct MacPackageInstaller {
    executor: Arc<dyn CommandExecutor>,
    privilege: Option<PrivilegeMethod>,
}

impl MacPackageInstaller {
    pub fn new(executor: Arc<dyn CommandExecutor>, privilege: Option<PrivilegeMethod>) -> Self {
        Self {
            executor,
            privilege,
        }
    }
}

impl PackageInstaller for MacPackageInstaller {
    fn install(&self, package: &Utf8Path, target: &Utf8Path) -> Result<()> {
        info!("installing {} onto {}", package, target);
        let spec = CommandSpec::new(
            INSTALLER,
            vec![
                "-package".to_string(),
                package.to_string(),
                "-target".to_string(),
                target.to_string(),
            ],
        )
        .with_privilege(self.privilege);

        let result = self.executor.execute(&spec)?;
        if !result.success() {
            // Some installer versions exit non-zero after a successful install.
            warn!(
                "installer exited unsuccessfully ({}) for {}; checking the JDK directory anyway",
                result.describe(),
                package
            );
        }
        Ok(())
    }
}
