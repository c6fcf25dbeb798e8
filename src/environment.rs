//! Reading and publishing agent variables.
//!
//! Pre-installed JDKs are announced by the agent image through variables
//! named `<PREFIX>_<version>_<arch>` (e.g. `JAVA_HOME_11_X64`). The resolved
//! JDK is published back under the same name, under the bare prefix, and as
//! a search-path entry for its `bin` directory.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};

/// Default name of the fixed JDK home variable.
pub const DEFAULT_VARIABLE_PREFIX: &str = "JAVA_HOME";

/// Returns the version- and architecture-specific variable name.
///
/// The whole name is upper-cased: `("JAVA_HOME", "11", "x64")` gives
/// `JAVA_HOME_11_X64`.
pub fn extended_home_variable(prefix: &str, version: &str, architecture: &str) -> String {
    format!("{}_{}_{}", prefix, version, architecture).to_uppercase()
}

/// Looks up variables provided by the agent.
pub trait VariableLookup: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads variables from the process environment. Empty values count as unset.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl VariableLookup for ProcessEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

/// Fixed set of variables, for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct StaticVariables(HashMap<String, String>);

impl StaticVariables {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl VariableLookup for StaticVariables {
    fn get(&self, name: &str) -> Option<String> {
        self.0.get(name).filter(|v| !v.is_empty()).cloned()
    }
}

/// Makes the resolved JDK visible to later build steps.
pub trait EnvironmentPublisher: Send + Sync {
    fn set_variable(&self, name: &str, value: &str) -> Result<()>;

    fn prepend_path(&self, path: &Utf8Path) -> Result<()>;
}

/// Publishes through Azure Pipelines logging commands written to `W`.
pub struct PipelineCommandPublisher<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> PipelineCommandPublisher<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, line: &str) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("publisher output lock poisoned"))?;
        writeln!(out, "{}", line).context("failed to write logging command")?;
        out.flush().context("failed to flush logging command")
    }
}

/// Escapes a logging command property value.
fn escape_property(value: &str) -> String {
    value
        .replace('%', "%AZP25")
        .replace(';', "%3B")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
        .replace(']', "%5D")
}

/// Escapes a logging command message body.
fn escape_data(value: &str) -> String {
    value
        .replace('%', "%AZP25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

impl<W: Write + Send> EnvironmentPublisher for PipelineCommandPublisher<W> {
    fn set_variable(&self, name: &str, value: &str) -> Result<()> {
        self.emit(&format!(
            "##vso[task.setvariable variable={};]{}",
            escape_property(name),
            escape_data(value)
        ))
    }

    fn prepend_path(&self, path: &Utf8Path) -> Result<()> {
        self.emit(&format!("##vso[task.prependpath]{}", escape_data(path.as_str())))
    }
}

/// Records published values in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    pub variables: Mutex<Vec<(String, String)>>,
    pub paths: Mutex<Vec<Utf8PathBuf>>,
}

impl EnvironmentPublisher for RecordingPublisher {
    fn set_variable(&self, name: &str, value: &str) -> Result<()> {
        self.variables
            .lock()
            .map_err(|_| anyhow::anyhow!("recording lock poisoned"))?
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn prepend_path(&self, path: &Utf8Path) -> Result<()> {
        self.paths
            .lock()
            .map_err(|_| anyhow::anyhow!("recording lock poisoned"))?
            .push(path.to_owned());
        Ok(())
    }
}

/// Publishes `home` under both variable names and prepends its `bin` folder.
pub fn publish_jdk_home(
    publisher: &dyn EnvironmentPublisher,
    prefix: &str,
    extended_variable: &str,
    home: &Utf8Path,
) -> Result<()> {
    tracing::info!("setting {} to {}", prefix, home);
    publisher.set_variable(prefix, home.as_str())?;
    tracing::info!("setting {} to {}", extended_variable, home);
    publisher.set_variable(extended_variable, home.as_str())?;
    publisher.prepend_path(&home.join("bin"))
}
