#![cfg(unix)]

mod helpers;

use std::fs;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use helpers::{MacBehavior, MacRoots, ScriptedExecutor, mac_executor, mac_installer};
use jdkstrap::JdkstrapError;
use jdkstrap::acquire::{Acquirer, JdkOrigin, JdkRequest};
use jdkstrap::cache::{EmptyToolCache, LocalToolCache};
use jdkstrap::cancel::CancellationToken;
use jdkstrap::config::JdkSource;
use jdkstrap::environment::{RecordingPublisher, StaticVariables};
use jdkstrap::fetch::{ArtifactFetcher, AzureStorageConfig};

/// Fetcher that copies prepared files into the destination.
struct LocalFetcher {
    files: Vec<Utf8PathBuf>,
    patterns: Mutex<Vec<String>>,
}

impl LocalFetcher {
    fn new(files: Vec<Utf8PathBuf>) -> Self {
        Self {
            files,
            patterns: Mutex::new(Vec::new()),
        }
    }
}

impl ArtifactFetcher for LocalFetcher {
    fn fetch(&self, destination: &Utf8Path, pattern: &str) -> Result<Vec<Utf8PathBuf>> {
        self.patterns.lock().unwrap().push(pattern.to_string());
        fs::create_dir_all(destination)?;
        let mut fetched = Vec::new();
        for file in &self.files {
            let target = destination.join(file.file_name().unwrap());
            fs::copy(file, &target)?;
            fetched.push(target);
        }
        Ok(fetched)
    }
}

fn jdk_request(source: JdkSource, destination: Utf8PathBuf) -> JdkRequest {
    JdkRequest {
        version: "11".to_string(),
        architecture: "x64".to_string(),
        source,
        destination,
        clean_destination: false,
        variable_prefix: "JAVA_HOME".to_string(),
    }
}

fn azure_source(blob: &str) -> JdkSource {
    JdkSource::AzureStorage(AzureStorageConfig {
        endpoint: "core.windows.net".to_string(),
        account: "agents".to_string(),
        container: "jdks".to_string(),
        blob: blob.to_string(),
        sas_token: None,
    })
}

fn published(publisher: &RecordingPublisher) -> Vec<(String, String)> {
    publisher.variables.lock().unwrap().clone()
}

#[test]
fn tool_cache_hit_skips_install() {
    let mac = MacRoots::new();
    let cache_root = mac.base.join("toolcache");
    let cached = cache_root.join("Java/11.0.2/x64");
    fs::create_dir_all(&cached).unwrap();
    fs::write(cache_root.join("Java/11.0.2/x64.complete"), "").unwrap();

    let executor = Arc::new(ScriptedExecutor::succeeding());
    let publisher = Arc::new(RecordingPublisher::default());
    let acquirer = Acquirer::new(
        Arc::new(LocalToolCache::new(cache_root)),
        mac_installer(&mac.roots, executor.clone(), StaticVariables::new()),
        Arc::new(StaticVariables::new()),
        publisher.clone(),
    );

    let request = jdk_request(
        JdkSource::Local {
            file: mac.base.join("jdk-11.dmg"),
        },
        mac.base.join("out"),
    );
    let acquired = acquirer.acquire(&request).unwrap();

    assert_eq!(acquired.origin, JdkOrigin::ToolCache);
    assert_eq!(acquired.home, cached);
    assert!(executor.calls().is_empty());
    assert_eq!(
        published(&publisher),
        vec![
            ("JAVA_HOME".to_string(), cached.to_string()),
            ("JAVA_HOME_11_X64".to_string(), cached.to_string()),
        ]
    );
    assert_eq!(*publisher.paths.lock().unwrap(), vec![cached.join("bin")]);
}

#[test]
fn cache_source_miss_fails() {
    let mac = MacRoots::new();
    let executor = Arc::new(ScriptedExecutor::succeeding());
    let publisher = Arc::new(RecordingPublisher::default());
    let acquirer = Acquirer::new(
        Arc::new(EmptyToolCache),
        mac_installer(&mac.roots, executor, StaticVariables::new()),
        Arc::new(StaticVariables::new()),
        publisher.clone(),
    );

    let err = acquirer
        .acquire(&jdk_request(JdkSource::Cache, mac.base.join("out")))
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<JdkstrapError>(),
        Some(JdkstrapError::NotCached { .. })
    ));
    assert!(published(&publisher).is_empty());
}

#[test]
fn preinstalled_source_uses_extended_variable() {
    let mac = MacRoots::new();
    let executor = Arc::new(ScriptedExecutor::succeeding());
    let publisher = Arc::new(RecordingPublisher::default());
    let variables = StaticVariables::new().with("JAVA_HOME_11_X64", "/usr/lib/jvm/java-11");
    let acquirer = Acquirer::new(
        Arc::new(EmptyToolCache),
        mac_installer(&mac.roots, executor.clone(), StaticVariables::new()),
        Arc::new(variables),
        publisher.clone(),
    );

    let acquired = acquirer
        .acquire(&jdk_request(JdkSource::Preinstalled, mac.base.join("out")))
        .unwrap();

    assert_eq!(acquired.origin, JdkOrigin::Preinstalled);
    assert_eq!(acquired.home, Utf8PathBuf::from("/usr/lib/jvm/java-11"));
    assert_eq!(published(&publisher)[0].1, "/usr/lib/jvm/java-11");
    assert!(executor.calls().is_empty());
}

#[test]
fn preinstalled_source_without_variable_fails() {
    let mac = MacRoots::new();
    let executor = Arc::new(ScriptedExecutor::succeeding());
    let publisher = Arc::new(RecordingPublisher::default());
    let acquirer = Acquirer::new(
        Arc::new(EmptyToolCache),
        mac_installer(&mac.roots, executor, StaticVariables::new()),
        Arc::new(StaticVariables::new()),
        publisher.clone(),
    );

    let err = acquirer
        .acquire(&jdk_request(JdkSource::Preinstalled, mac.base.join("out")))
        .unwrap_err();

    match err.downcast_ref::<JdkstrapError>() {
        Some(JdkstrapError::PreinstalledMissing { version, variable }) => {
            assert_eq!(version, "11");
            assert_eq!(variable, "JAVA_HOME_11_X64");
        }
        other => panic!("expected PreinstalledMissing, got {:?}", other),
    }
    assert!(published(&publisher).is_empty());
}

#[test]
fn local_disk_image_is_installed_and_published() {
    let mac = MacRoots::new();
    let executor = mac_executor(
        &mac.roots,
        MacBehavior {
            volumes: vec![("JDK 11".to_string(), vec!["JDK 11.pkg".to_string()])],
            installed: vec!["jdk-11.jdk".to_string()],
            ..Default::default()
        },
    );
    let publisher = Arc::new(RecordingPublisher::default());
    let acquirer = Acquirer::new(
        Arc::new(EmptyToolCache),
        mac_installer(&mac.roots, executor, StaticVariables::new()),
        Arc::new(StaticVariables::new()),
        publisher.clone(),
    );

    let request = jdk_request(
        JdkSource::Local {
            file: mac.archive("jdk-11.dmg"),
        },
        mac.base.join("out"),
    );
    let acquired = acquirer.acquire(&request).unwrap();

    let home = mac.roots.jdk.join("jdk-11.jdk/Contents/Home");
    assert_eq!(acquired.origin, JdkOrigin::Installed);
    assert_eq!(acquired.home, home);
    assert_eq!(
        published(&publisher),
        vec![
            ("JAVA_HOME".to_string(), home.to_string()),
            ("JAVA_HOME_11_X64".to_string(), home.to_string()),
        ]
    );
}

#[test]
fn remote_tar_gz_is_downloaded_and_extracted() {
    let mac = MacRoots::new();
    let staged = mac.base.join("staged");
    fs::create_dir_all(&staged).unwrap();
    let archive = staged.join("jdk-11.tar.gz");
    helpers::write_jdk_tar_gz(&archive, "jdk-11.0.2");

    let fetcher = Arc::new(LocalFetcher::new(vec![archive]));
    let executor = Arc::new(ScriptedExecutor::succeeding());
    let publisher = Arc::new(RecordingPublisher::default());
    let acquirer = Acquirer::new(
        Arc::new(EmptyToolCache),
        mac_installer(&mac.roots, executor, StaticVariables::new()),
        Arc::new(StaticVariables::new()),
        publisher.clone(),
    )
    .with_fetcher(fetcher.clone());

    let destination = mac.base.join("out");
    let acquired = acquirer
        .acquire(&jdk_request(azure_source("java/jdk-11*.tar.gz"), destination.clone()))
        .unwrap();

    assert_eq!(acquired.home, destination.join("jdk-11/jdk-11.0.2"));
    assert_eq!(*fetcher.patterns.lock().unwrap(), vec!["java/jdk-11*.tar.gz".to_string()]);
    assert_eq!(*publisher.paths.lock().unwrap(), vec![acquired.home.join("bin")]);
}

#[test]
fn remote_pattern_matching_several_archives_fails() {
    let mac = MacRoots::new();
    let a = mac.archive("jdk-11.0.1.tar.gz");
    let b = mac.archive("jdk-11.0.2.tar.gz");
    let executor = Arc::new(ScriptedExecutor::succeeding());
    let acquirer = Acquirer::new(
        Arc::new(EmptyToolCache),
        mac_installer(&mac.roots, executor, StaticVariables::new()),
        Arc::new(StaticVariables::new()),
        Arc::new(RecordingPublisher::default()),
    )
    .with_fetcher(Arc::new(LocalFetcher::new(vec![a, b])));

    let err = acquirer
        .acquire(&jdk_request(azure_source("jdk-11*"), mac.base.join("out")))
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<JdkstrapError>(),
        Some(JdkstrapError::Download(_))
    ));
}

#[test]
fn clean_destination_removes_previous_content() {
    let mac = MacRoots::new();
    let archive = mac.base.join("jdk-11.tar.gz");
    helpers::write_jdk_tar_gz(&archive, "jdk-11.0.2");
    let destination = mac.base.join("out");
    fs::create_dir_all(destination.join("stale")).unwrap();

    let executor = Arc::new(ScriptedExecutor::succeeding());
    let acquirer = Acquirer::new(
        Arc::new(EmptyToolCache),
        mac_installer(&mac.roots, executor, StaticVariables::new()),
        Arc::new(StaticVariables::new()),
        Arc::new(RecordingPublisher::default()),
    );

    let mut request = jdk_request(JdkSource::Local { file: archive }, destination.clone());
    request.clean_destination = true;
    acquirer.acquire(&request).unwrap();

    assert!(!destination.join("stale").exists());
    assert!(destination.join("jdk-11/jdk-11.0.2/bin/java").is_file());
}

#[test]
fn cancellation_stops_before_any_work() {
    let mac = MacRoots::new();
    let executor = Arc::new(ScriptedExecutor::succeeding());
    let publisher = Arc::new(RecordingPublisher::default());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let acquirer = Acquirer::new(
        Arc::new(EmptyToolCache),
        mac_installer(&mac.roots, executor.clone(), StaticVariables::new()),
        Arc::new(StaticVariables::new()),
        publisher.clone(),
    )
    .with_cancellation(cancel);

    let err = acquirer
        .acquire(&jdk_request(JdkSource::Preinstalled, mac.base.join("out")))
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<JdkstrapError>(),
        Some(JdkstrapError::Cancelled(_))
    ));
    assert!(published(&publisher).is_empty());
}

/// Spells `path` relative to the current directory by climbing to `/` first.
fn relative_to_cwd(path: &Utf8Path) -> Utf8PathBuf {
    let cwd = std::env::current_dir().unwrap();
    let mut relative = Utf8PathBuf::new();
    for _ in cwd.components().skip(1) {
        relative.push("..");
    }
    relative.push(path.strip_prefix("/").unwrap());
    relative
}

#[test]
fn clean_destination_keeps_relative_source_archive() {
    let mac = MacRoots::new();
    let destination = mac.base.join("out");
    fs::create_dir_all(destination.join("stale")).unwrap();
    let archive = destination.join("jdk-11.tar.gz");
    helpers::write_jdk_tar_gz(&archive, "jdk-11.0.2");

    let executor = Arc::new(ScriptedExecutor::succeeding());
    let acquirer = Acquirer::new(
        Arc::new(EmptyToolCache),
        mac_installer(&mac.roots, executor, StaticVariables::new()),
        Arc::new(StaticVariables::new()),
        Arc::new(RecordingPublisher::default()),
    );

    let file = relative_to_cwd(&archive);
    assert!(file.is_relative());
    let mut request = jdk_request(JdkSource::Local { file }, destination.clone());
    request.clean_destination = true;
    let acquired = acquirer.acquire(&request).unwrap();

    assert!(archive.is_file());
    assert!(!destination.join("stale").exists());
    assert_eq!(acquired.home, destination.join("jdk-11/jdk-11.0.2"));
}

#[test]
fn unsupported_local_archive_leaves_destination_untouched() {
    let mac = MacRoots::new();
    let destination = mac.base.join("out");
    fs::create_dir_all(destination.join("previous-jdk")).unwrap();

    let executor = Arc::new(ScriptedExecutor::succeeding());
    let acquirer = Acquirer::new(
        Arc::new(EmptyToolCache),
        mac_installer(&mac.roots, executor.clone(), StaticVariables::new()),
        Arc::new(StaticVariables::new()),
        Arc::new(RecordingPublisher::default()),
    );

    let mut request = jdk_request(
        JdkSource::Local {
            file: mac.archive("jdk-11.exe"),
        },
        destination.clone(),
    );
    request.clean_destination = true;
    let err = acquirer.acquire(&request).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<JdkstrapError>(),
        Some(JdkstrapError::Classification(_))
    ));
    assert!(destination.join("previous-jdk").is_dir());
    assert!(executor.calls().is_empty());
}

#[test]
fn unsupported_blob_name_fails_before_download() {
    let mac = MacRoots::new();
    let destination = mac.base.join("out");
    fs::create_dir_all(destination.join("previous-jdk")).unwrap();

    let fetcher = Arc::new(LocalFetcher::new(Vec::new()));
    let executor = Arc::new(ScriptedExecutor::succeeding());
    let acquirer = Acquirer::new(
        Arc::new(EmptyToolCache),
        mac_installer(&mac.roots, executor, StaticVariables::new()),
        Arc::new(StaticVariables::new()),
        Arc::new(RecordingPublisher::default()),
    )
    .with_fetcher(fetcher.clone());

    let mut request = jdk_request(azure_source("java/jdk-11.msi"), destination.clone());
    request.clean_destination = true;
    let err = acquirer.acquire(&request).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<JdkstrapError>(),
        Some(JdkstrapError::Classification(_))
    ));
    assert!(fetcher.patterns.lock().unwrap().is_empty());
    assert!(destination.join("previous-jdk").is_dir());
}
