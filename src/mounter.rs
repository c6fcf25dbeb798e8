//! Disk image attach/detach.
//!
//! [`HdiutilMounter`] drives macOS `hdiutil`. Attaching makes the image's
//! volume appear under `/Volumes`; the orchestrator finds it by diffing that
//! directory, so neither operation returns a path.

use std::sync::Arc;

use anyhow::Result;
use camino::Utf8Path;
use tracing::info;

use crate::error::JdkstrapError;
use crate::executor::{CommandExecutor, CommandSpec};
use crate::privilege::PrivilegeMethod;

const HDIUTIL: &str = "hdiutil";

/// Attaches and detaches disk images.
pub trait DiskImageMounter: Send + Sync {
    /// Mounts `image`. Any failure must be returned as `Err`.
    fn attach(&self, image: &Utf8Path) -> Result<()>;

    /// Unmounts the volume mounted at `volume`.
    fn detach(&self, volume: &Utf8Path) -> Result<()>;
}

/// `hdiutil`-based mounter.
pub struct HdiutilMounter {
    executor: Arc<dyn CommandExecutor>,
    privilege: Option<PrivilegeMethod>,
}

impl HdiutilMounter {
    pub fn new(executor: Arc<dyn CommandExecutor>, privilege: Option<PrivilegeMethod>) -> Self {
        Self {
            executor,
            privilege,
        }
    }

    fn run(&self, verb: &str, target: &Utf8Path) -> Result<()> {
        let spec = CommandSpec::new(HDIUTIL, vec![verb.to_string(), target.to_string()])
            .with_privilege(self.privilege);
        let result = self.executor.execute(&spec)?;
        if !result.success() {
            return Err(JdkstrapError::execution(&spec, result.describe()).into());
        }
        Ok(())
    }
}

impl DiskImageMounter for HdiutilMounter {
    fn attach(&self, image: &Utf8Path) -> Result<()> {
        info!("attaching disk image {}", image);
        self.run("attach", image)
    }

    fn detach(&self, volume: &Utf8Path) -> Result<()> {
        info!("detaching volume {}", volume);
        self.run("detach", volume)
    }
}
