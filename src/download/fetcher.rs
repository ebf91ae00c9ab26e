//! Single resource retrieval
//!
//! Downloads stream into `<destination>.part` and are renamed over the
//! destination once complete, so an interrupted transfer never leaves a
//! half-written file under the final name.

use crate::defaults::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT, PARTIAL_DOWNLOAD_SUFFIX,
};
use crate::download::validity::is_valid;
use crate::exceptions::{Result, VaultError};
use crate::signing::SignatureInspector;
use anyhow::{Context, anyhow, bail, ensure};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use url::Url;

/// Terminal outcome of one successful fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Destination was already a valid download
    Skipped,
    /// Resource was retrieved
    Downloaded { bytes: u64 },
}

/// Retrieves one resource to a local path
#[async_trait]
pub trait Fetch: Send + Sync + fmt::Debug {
    /// Fetch `uri` into `destination` unless it is already valid.
    ///
    /// `force` re-downloads even a valid destination.
    async fn fetch(&self, uri: &str, destination: &Path, force: bool) -> Result<FetchOutcome>;
}

/// `http`, `https` and `file` fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    inspector: SignatureInspector,
}

impl HttpFetcher {
    pub fn new(inspector: SignatureInspector) -> Result<Self> {
        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VaultError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, inspector })
    }

    async fn destination_is_valid(&self, destination: &Path) -> anyhow::Result<bool> {
        let inspector = self.inspector.clone();
        let path = destination.to_path_buf();
        tokio::task::spawn_blocking(move || is_valid(&path, &inspector))
            .await
            .context("validity check did not complete")
    }

    async fn download_http(&self, url: Url, partial: &Path) -> anyhow::Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("request failed")?;

        let status = response.status();
        ensure!(status.is_success(), "HTTP {}", status.as_u16());

        let mut file = File::create(partial)
            .await
            .with_context(|| format!("failed to create {partial:?}"))?;
        let mut bytes = 0u64;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("transfer interrupted")?;
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }

        file.flush().await?;
        Ok(bytes)
    }
}

async fn copy_local(url: &Url, partial: &Path) -> anyhow::Result<u64> {
    let source = url
        .to_file_path()
        .map_err(|_| anyhow!("{url} is not a local file path"))?;

    fs::copy(&source, partial)
        .await
        .with_context(|| format!("failed to copy {source:?}"))
}

/// `<destination>.part`
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".");
    name.push(PARTIAL_DOWNLOAD_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, uri: &str, destination: &Path, force: bool) -> Result<FetchOutcome> {
        let already_valid = !force
            && self
                .destination_is_valid(destination)
                .await
                .map_err(|e| VaultError::fetch(uri, format!("{e:#}")))?;
        if already_valid {
            debug!("{destination:?} is already a valid download, skipping {uri}");
            return Ok(FetchOutcome::Skipped);
        }

        let url =
            Url::parse(uri).map_err(|e| VaultError::fetch(uri, format!("malformed URI: {e}")))?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| VaultError::fetch(uri, format!("failed to create {parent:?}: {e}")))?;
        }

        let partial = partial_path(destination);
        let transfer = async {
            let bytes = match url.scheme() {
                "http" | "https" => self.download_http(url.clone(), &partial).await?,
                "file" => copy_local(&url, &partial).await?,
                other => bail!("unsupported URI scheme '{other}'"),
            };
            fs::rename(&partial, destination)
                .await
                .with_context(|| format!("failed to move download to {destination:?}"))?;
            Ok::<_, anyhow::Error>(bytes)
        };

        match transfer.await {
            Ok(bytes) => {
                info!("Downloaded {uri} ({bytes} bytes)");
                Ok(FetchOutcome::Downloaded { bytes })
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&partial).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial download {partial:?}: {cleanup}");
                    }
                }
                Err(VaultError::fetch(uri, format!("{e:#}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::test_support::{fake_inspector, signed_pe};
    use std::fs as std_fs;
    use tempfile::TempDir;

    fn file_uri(path: &Path) -> String {
        Url::from_file_path(path).unwrap().to_string()
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(fake_inspector()).unwrap()
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/work/kb1.exe")),
            PathBuf::from("/work/kb1.exe.part")
        );
    }

    #[tokio::test]
    async fn test_fetch_local_file() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("mirror").join("kb1.exe");
        std_fs::create_dir_all(source.parent().unwrap()).unwrap();
        std_fs::write(&source, b"package bytes").unwrap();

        let destination = temp_dir.path().join("work").join("kb1.exe");
        let outcome = fetcher()
            .fetch(&file_uri(&source), &destination, false)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Downloaded { bytes: 13 });
        assert_eq!(std_fs::read(&destination).unwrap(), b"package bytes");
        assert!(!partial_path(&destination).exists());
    }

    #[tokio::test]
    async fn test_valid_destination_is_skipped_unless_forced() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("kb1-new.exe");
        std_fs::write(&source, b"newer bytes").unwrap();

        let destination = temp_dir.path().join("kb1.exe");
        let signed = signed_pe("2023-04-01T10:15:30Z");
        std_fs::write(&destination, &signed).unwrap();

        let fetcher = fetcher();
        let uri = file_uri(&source);

        let outcome = fetcher.fetch(&uri, &destination, false).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Skipped);
        assert_eq!(std_fs::read(&destination).unwrap(), signed);

        let outcome = fetcher.fetch(&uri, &destination, true).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Downloaded { bytes: 11 });
        assert_eq!(std_fs::read(&destination).unwrap(), b"newer bytes");
    }

    #[tokio::test]
    async fn test_invalid_destination_is_refetched() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.exe");
        std_fs::write(&source, signed_pe("2023-04-01T10:15:30Z")).unwrap();

        let destination = temp_dir.path().join("kb1.exe");
        std_fs::write(&destination, b"MZ truncat").unwrap();

        let outcome = fetcher()
            .fetch(&file_uri(&source), &destination, false)
            .await
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::Downloaded { .. }));
        assert_eq!(
            std_fs::read(&destination).unwrap(),
            std_fs::read(&source).unwrap()
        );
    }

    #[tokio::test]
    async fn test_malformed_uri_is_a_fetch_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = fetcher()
            .fetch("not a uri", &temp_dir.path().join("a.exe"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_scheme_is_a_fetch_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = fetcher()
            .fetch("ftp://example.com/a.exe", &temp_dir.path().join("a.exe"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Fetch { ref uri, .. } if uri == "ftp://example.com/a.exe"));
    }

    #[tokio::test]
    async fn test_unwritable_destination_dir_is_a_fetch_error() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("kb1.exe");
        std_fs::write(&source, b"package bytes").unwrap();
        // "work" is a file, so the destination directory cannot be created
        std_fs::write(temp_dir.path().join("work"), b"").unwrap();

        let uri = file_uri(&source);
        let err = fetcher()
            .fetch(&uri, &temp_dir.path().join("work").join("kb1.exe"), false)
            .await
            .unwrap_err();

        assert!(matches!(err, VaultError::Fetch { uri: ref failed, .. } if *failed == uri));
    }

    #[tokio::test]
    async fn test_missing_source_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("a.exe");
        let err = fetcher()
            .fetch(&file_uri(&temp_dir.path().join("gone.exe")), &destination, false)
            .await
            .unwrap_err();

        assert!(matches!(err, VaultError::Fetch { .. }));
        assert!(!destination.exists());
        assert!(!partial_path(&destination).exists());
    }
}
