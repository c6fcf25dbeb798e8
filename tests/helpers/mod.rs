#![allow(dead_code)]

use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use jdkstrap::environment::{StaticVariables, VariableLookup};
use jdkstrap::executor::{CommandExecutor, CommandSpec, ExecutionResult};
use jdkstrap::extract::JdkArchiveExtractor;
use jdkstrap::installer::{InstallRoots, Installer};
use jdkstrap::platform::{Platform, PlatformCapabilities};

/// Creates a temporary directory and returns it with its UTF-8 path.
///
/// The `TempDir` guard must be kept alive for the duration of the test.
pub fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf())
        .expect("temp dir path should be UTF-8");
    (temp_dir, path)
}

/// Builds an exit status with the given exit code.
pub fn exit_status(code: i32) -> ExitStatus {
    ExitStatus::from_raw(code << 8)
}

type Handler = dyn Fn(&CommandSpec) -> i32 + Send + Sync;

/// Executor that records every command and lets the test decide what the
/// command does and which exit code it returns.
pub struct ScriptedExecutor {
    calls: Mutex<Vec<CommandSpec>>,
    handler: Box<Handler>,
}

impl ScriptedExecutor {
    pub fn new(handler: impl Fn(&CommandSpec) -> i32 + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// Executor whose commands all succeed without side effects.
    pub fn succeeding() -> Self {
        Self::new(|_| 0)
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines as `program arg arg`.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|spec| {
                std::iter::once(spec.command.as_str())
                    .chain(spec.args.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    pub fn ran(&self, program: &str) -> bool {
        self.calls().iter().any(|spec| spec.command == program)
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        self.calls.lock().unwrap().push(spec.clone());
        let code = (self.handler)(spec);
        Ok(ExecutionResult {
            status: Some(exit_status(code)),
            stderr_tail: None,
        })
    }
}

/// Temporary stand-ins for `/Volumes` and `/Library/Java/JavaVirtualMachines`.
pub struct MacRoots {
    pub _guard: tempfile::TempDir,
    pub base: Utf8PathBuf,
    pub roots: InstallRoots,
}

impl MacRoots {
    pub fn new() -> Self {
        let (guard, base) = utf8_tempdir();
        let roots = InstallRoots {
            volumes: base.join("Volumes"),
            jdk: base.join("JavaVirtualMachines"),
            ..InstallRoots::default()
        };
        fs::create_dir_all(&roots.volumes).unwrap();
        fs::create_dir_all(&roots.jdk).unwrap();
        Self {
            _guard: guard,
            base,
            roots,
        }
    }

    /// Writes an (empty) archive file and returns its path.
    pub fn archive(&self, name: &str) -> Utf8PathBuf {
        let path = self.base.join(name);
        fs::write(&path, "").unwrap();
        path
    }
}

/// What the simulated `hdiutil` and `installer` do.
#[derive(Clone, Default)]
pub struct MacBehavior {
    /// Volumes created by `hdiutil attach`, each with its package files.
    pub volumes: Vec<(String, Vec<String>)>,
    /// Entries created under the JDK root by `installer`.
    pub installed: Vec<String>,
    pub attach_exit: i32,
    pub detach_exit: i32,
    pub installer_exit: i32,
}

/// Simulates `hdiutil` and `installer` on top of temporary roots.
pub fn mac_executor(roots: &InstallRoots, behavior: MacBehavior) -> Arc<ScriptedExecutor> {
    let volumes_root = roots.volumes.clone();
    let jdk_root = roots.jdk.clone();
    Arc::new(ScriptedExecutor::new(move |spec| {
        match (spec.command.as_str(), spec.args.first().map(String::as_str)) {
            ("hdiutil", Some("attach")) => {
                for (volume, packages) in &behavior.volumes {
                    let dir = volumes_root.join(volume);
                    fs::create_dir_all(&dir).unwrap();
                    for package in packages {
                        fs::write(dir.join(package), "").unwrap();
                    }
                }
                behavior.attach_exit
            }
            ("hdiutil", Some("detach")) => {
                if behavior.detach_exit == 0 {
                    let volume = Utf8Path::new(&spec.args[1]);
                    fs::remove_dir_all(volume).unwrap();
                }
                behavior.detach_exit
            }
            ("installer", _) => {
                for entry in &behavior.installed {
                    fs::create_dir_all(jdk_root.join(entry).join("Contents/Home/bin")).unwrap();
                }
                behavior.installer_exit
            }
            _ => 0,
        }
    }))
}

/// Builds an installer with macOS capabilities backed by `executor`.
pub fn mac_installer(
    roots: &InstallRoots,
    executor: Arc<ScriptedExecutor>,
    variables: StaticVariables,
) -> Installer {
    let capabilities = PlatformCapabilities::for_platform(Platform::MacOs, executor.clone(), None);
    let extractor = Arc::new(JdkArchiveExtractor::new(executor, Platform::MacOs));
    let variables: Arc<dyn VariableLookup> = Arc::new(variables);
    Installer::new(Platform::MacOs, roots.clone(), capabilities, extractor, variables)
}

/// Writes a `.tar.gz` holding `<top>/bin/java`.
pub fn write_jdk_tar_gz(path: &Utf8Path, top: &str) {
    let file = fs::File::create(path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let body = b"#!/bin/sh\n";
    let mut header = tar::Header::new_gnu();
    header.set_size(body.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, format!("{}/bin/java", top), &body[..])
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap();
}

/// Writes `yaml` to a temporary profile file and loads it.
pub fn load_profile_from_yaml(
    yaml: &str,
) -> Result<jdkstrap::config::Profile, jdkstrap::JdkstrapError> {
    let (_guard, dir) = utf8_tempdir();
    let path = dir.join("profile.yml");
    fs::write(&path, yaml).unwrap();
    jdkstrap::config::load_profile(&path)
}
