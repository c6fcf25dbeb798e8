//! Download of JDK archives from Azure blob storage.
//!
//! Files are streamed into a uniquely named `.part` file, synced to disk and
//! renamed into place, so a returned path always refers to a complete,
//! closed file that extraction can open right away.

use std::collections::BTreeMap;
use std::fs::{self, File};

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::JdkstrapError;

const DEFAULT_ENDPOINT: &str = "core.windows.net";


/// Downloads remote artifacts into a local directory.
pub trait ArtifactFetcher: Send + Sync {
    /// Downloads every artifact matching `pattern` into `destination`.
    ///
    /// Returns the local paths once all files are fully written and closed.
    fn fetch(&self, destination: &Utf8Path, pattern: &str) -> Result<Vec<Utf8PathBuf>>;
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// Location of a JDK archive in Azure blob storage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AzureStorageConfig {
    /// Storage endpoint suffix (`core.windows.net`), or a full URL for
    /// path-style endpoints such as Azurite (`http://127.0.0.1:10000`).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Storage account name.
    pub account: String,
    /// Container holding the archive.
    pub container: String,
    /// Blob name, optionally with `*` / `?` wildcards.
    pub blob: String,
    /// Shared access signature appended to every request.
    #[serde(default)]
    pub sas_token: Option<String>,
}

impl AzureStorageConfig {
    /// Returns the account base URL.
    pub fn account_url(&self) -> Result<Url, JdkstrapError> {
        let raw = if self.endpoint.contains("://") {
            format!("{}/{}", self.endpoint.trim_end_matches('/'), self.account)
        } else {
            format!("https://{}.blob.{}", self.account, self.endpoint)
        };
        Url::parse(&raw).map_err(|e| {
            JdkstrapError::Config(format!("invalid storage endpoint '{}': {}", raw, e))
        })
    }

    /// Returns the file name the archive will have locally when `blob`
    /// has no wildcard.
    pub fn file_name(&self) -> &str {
        blob_file_name(&self.blob)
    }

    /// True when `blob` is a wildcard pattern rather than a single blob.
    pub fn is_pattern(&self) -> bool {
        has_wildcard(&self.blob)
    }

    pub fn validate(&self) -> Result<(), JdkstrapError> {
        for (field, value) in [
            ("account", &self.account),
            ("container", &self.container),
            ("blob", &self.blob),
        ] {
            if value.trim().is_empty() {
                return Err(JdkstrapError::Validation(format!(
                    "azure storage {} must not be empty",
                    field
                )));
            }
        }
        self.account_url().map(|_| ())
    }
}

/// Returns true if `pattern` contains glob wildcards.
fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

/// Compiles a `*` / `?` glob into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).with_context(|| format!("invalid blob pattern: {}", pattern))
}

/// Last path segment of a blob name.
fn blob_file_name(blob: &str) -> &str {
    blob.rsplit('/').next().unwrap_or(blob)
}

/// One page of a `List Blobs` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    #[serde(default)]
    blobs: BlobList,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
struct BlobItem {
    #[serde(rename = "Name")]
    name: String,
}

fn parse_blob_list(body: &str) -> Result<EnumerationResults, JdkstrapError> {
    serde_xml_rs::from_str(body)
        .map_err(|e| JdkstrapError::Download(format!("malformed blob listing: {}", e)))
}

/// Fails when two blobs would be saved under the same local file name.
fn ensure_distinct_file_names(blobs: &[String]) -> Result<(), JdkstrapError> {
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    for blob in blobs {
        if let Some(previous) = seen.insert(blob_file_name(blob), blob) {
            return Err(JdkstrapError::Download(format!(
                "blobs {} and {} would both be saved as {}",
                previous,
                blob,
                blob_file_name(blob)
            )));
        }
    }
    Ok(())
}

/// Blob storage fetcher using the REST API.
pub struct AzureBlobFetcher {
    config: AzureStorageConfig,
    client: reqwest::blocking::Client,
}

impl AzureBlobFetcher {
    pub fn new(config: AzureStorageConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { config, client })
    }

    /// Builds a URL below the container, carrying the SAS token.
    fn container_url(&self, blob: Option<&str>) -> Result<Url> {
        let mut url = self.config.account_url()?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| JdkstrapError::Config("storage endpoint cannot be a base".into()))?;
            segments.pop_if_empty().push(&self.config.container);
            if let Some(blob) = blob {
                segments.extend(blob.split('/'));
            }
        }
        if let Some(sas) = self.config.sas_token.as_deref() {
            url.set_query(Some(sas.trim_start_matches('?')));
        }
        Ok(url)
    }

    /// Lists all blob names starting with `prefix`, following continuation markers.
    fn list_blobs(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = self.container_url(None)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("restype", "container");
                query.append_pair("comp", "list");
                if !prefix.is_empty() {
                    query.append_pair("prefix", prefix);
                }
                if let Some(marker) = marker.as_deref() {
                    query.append_pair("marker", marker);
                }
            }
            debug!("listing blobs: {}", url.path());

            let body = self
                .client
                .get(url)
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.text())
                .map_err(|e| {
                    JdkstrapError::Download(format!(
                        "failed to list container {}: {}",
                        self.config.container, e
                    ))
                })?;

            let page = parse_blob_list(&body)?;
            names.extend(page.blobs.items.into_iter().map(|blob| blob.name));

            marker = page.next_marker.filter(|m| !m.is_empty());
            if marker.is_none() {
                break;
            }
        }

        Ok(names)
    }

    fn download(&self, blob: &str, destination: &Utf8Path) -> Result<Utf8PathBuf> {
        let file_name = blob_file_name(blob);
        let target = destination.join(file_name);
        let partial = destination.join(format!(".{}.{}.part", file_name, uuid::Uuid::new_v4()));
        let url = self.container_url(Some(blob))?;

        info!("downloading blob {} to {}", blob, target);
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                JdkstrapError::Download(format!("failed to download blob {}: {}", blob, e))
            })?;

        let result = (|| -> Result<()> {
            let mut file = File::create(&partial)
                .map_err(|e| JdkstrapError::io(format!("failed to create: {}", partial), e))?;
            response.copy_to(&mut file).map_err(|e| {
                JdkstrapError::Download(format!("failed to read blob {}: {}", blob, e))
            })?;
            file.sync_all()
                .map_err(|e| JdkstrapError::io(format!("failed to sync: {}", partial), e))?;
            fs::rename(&partial, &target).map_err(|e| {
                JdkstrapError::io(format!("failed to move download into place: {}", target), e)
            })?;
            Ok(())
        })();

        if result.is_err()
            && let Err(e) = fs::remove_file(&partial)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!("failed to remove partial download {}: {}", partial, e);
        }
        result?;

        Ok(target)
    }
}

impl ArtifactFetcher for AzureBlobFetcher {
    fn fetch(&self, destination: &Utf8Path, pattern: &str) -> Result<Vec<Utf8PathBuf>> {
        fs::create_dir_all(destination).map_err(|e| {
            JdkstrapError::io(format!("failed to create directory: {}", destination), e)
        })?;

        let blobs = if has_wildcard(pattern) {
            let prefix: String = pattern.chars().take_while(|c| !matches!(c, '*' | '?')).collect();
            let matcher = glob_to_regex(pattern)?;
            let matched: Vec<String> = self
                .list_blobs(&prefix)?
                .into_iter()
                .filter(|name| matcher.is_match(name))
                .collect();
            if matched.is_empty() {
                return Err(JdkstrapError::Download(format!(
                    "no blob in container {} matches {}",
                    self.config.container, pattern
                ))
                .into());
            }
            ensure_distinct_file_names(&matched)?;
            matched
        } else {
            vec![pattern.to_string()]
        };

        blobs
            .iter()
            .map(|blob| self.download(blob, destination))
            .collect()
    }
}
