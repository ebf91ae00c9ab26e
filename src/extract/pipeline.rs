//! Extraction and archival of downloaded packages
//!
//! Each package is extracted on its own blocking task into a private
//! temporary directory. Payloads are filed under the archive root by the
//! package's signing time, then the temporary directory is removed on every
//! exit path.

use crate::defaults::{DEFAULT_PAYLOAD_EXTENSION, DEFAULT_TEMP_PREFIX};
use crate::exceptions::{Result, VaultError};
use crate::extract::archive::{archive_dir, archive_name, copy_payload, move_payload};
use crate::extract::extractor::Extractor;
use crate::manifest::Platform;
use crate::signing::SignatureInspector;
use crate::utils::has_extension;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// One payload on its way into the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPayload {
    pub source_temp_path: PathBuf,
    pub target_archive_path: PathBuf,
}

/// Per-package outcomes of an extraction phase, in input order
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Package and the archive paths it produced
    pub archived: Vec<(PathBuf, Vec<PathBuf>)>,
    pub failed: Vec<(PathBuf, VaultError)>,
}

impl ExtractionReport {
    pub fn payload_count(&self) -> usize {
        self.archived.iter().map(|(_, paths)| paths.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionPipeline {
    extractor: Arc<dyn Extractor>,
    inspector: SignatureInspector,
    temp_root: Option<PathBuf>,
}

impl ExtractionPipeline {
    pub fn new(extractor: Arc<dyn Extractor>, inspector: SignatureInspector) -> Self {
        Self {
            extractor,
            inspector,
            temp_root: None,
        }
    }

    /// Create temporary directories under `temp_root` instead of the system
    /// temp dir
    pub fn with_temp_root(mut self, temp_root: Option<PathBuf>) -> Self {
        self.temp_root = temp_root;
        self
    }

    /// Extract every package concurrently, one blocking task each.
    ///
    /// A failing package does not stop the others; the first failure in
    /// input order is returned once all of them have settled.
    pub async fn extract_all(
        &self,
        packages: &[PathBuf],
        archive_root: &Path,
        platform: Platform,
    ) -> Result<ExtractionReport> {
        info!(
            "Extracting {} package(s) with {} for {platform}",
            packages.len(),
            self.extractor.name()
        );

        let handles: Vec<_> = packages
            .iter()
            .map(|package| {
                let pipeline = self.clone();
                let package = package.clone();
                let archive_root = archive_root.to_path_buf();
                tokio::task::spawn_blocking(move || {
                    pipeline.extract_package(&package, &archive_root, platform)
                })
            })
            .collect();

        let mut report = ExtractionReport::default();
        for (package, handle) in packages.iter().zip(handles) {
            let result = handle.await.map_err(VaultError::from).and_then(|r| r);
            match result {
                Ok(paths) => report.archived.push((package.clone(), paths)),
                Err(e) => {
                    error!("{e}");
                    report.failed.push((package.clone(), e));
                }
            }
        }

        info!(
            "Extraction phase finished: {} payload(s) archived, {} package(s) failed",
            report.payload_count(),
            report.failed.len()
        );

        if !report.failed.is_empty() {
            let (_, first) = report.failed.swap_remove(0);
            return Err(first);
        }

        Ok(report)
    }

    /// Extract one package and file its payloads. Blocks until the
    /// extractor exits.
    pub fn extract_package(
        &self,
        package: &Path,
        archive_root: &Path,
        platform: Platform,
    ) -> Result<Vec<PathBuf>> {
        let label = package
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| package.display().to_string());

        let temp_dir = self
            .create_temp_dir()
            .map_err(|e| VaultError::extraction(&label, format!("failed to create temp dir: {e}")))?;
        debug!("Extracting {label} into {:?}", temp_dir.path());

        let timestamp = self.inspector.inspect(package).ok_or_else(|| {
            VaultError::extraction(&label, "package has no trusted signing time")
        })?;

        self.extractor.extract(package, temp_dir.path())?;

        let payloads = plan_payloads(temp_dir.path(), &timestamp, archive_root, platform)
            .map_err(|e| VaultError::extraction(&label, format!("failed to plan archive: {e}")))?;
        if payloads.is_empty() {
            warn!("{label} produced no .{DEFAULT_PAYLOAD_EXTENSION} payloads");
        }

        let archived = file_payloads(&payloads)
            .map_err(|e| VaultError::extraction(&label, format!("failed to archive payload: {e}")))?;

        temp_dir
            .close()
            .map_err(|e| VaultError::extraction(&label, format!("failed to remove temp dir: {e}")))?;

        info!("{label}: archived {} payload(s)", archived.len());
        Ok(archived)
    }

    fn create_temp_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(DEFAULT_TEMP_PREFIX);
        match &self.temp_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }
}

/// Payload files at the top level of `extract_dir`, sorted by name
fn find_payloads(extract_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut payloads = Vec::new();
    for entry in fs::read_dir(extract_dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && has_extension(&path, DEFAULT_PAYLOAD_EXTENSION) {
            payloads.push(path);
        }
    }
    payloads.sort();
    Ok(payloads)
}

/// Map every payload to its archive path(s), creating the platform
/// directories as needed.
fn plan_payloads(
    extract_dir: &Path,
    timestamp: &DateTime<Utc>,
    archive_root: &Path,
    platform: Platform,
) -> std::io::Result<Vec<ExtractedPayload>> {
    let mut target_dirs = Vec::new();
    for platform_dir in platform.archive_dirs() {
        let dir = archive_dir(archive_root, platform_dir);
        fs::create_dir_all(&dir)?;
        target_dirs.push(dir);
    }

    let mut planned = Vec::new();
    for source in find_payloads(extract_dir)? {
        let Some(file_name) = source.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let name = archive_name(timestamp, &file_name);
        for dir in &target_dirs {
            planned.push(ExtractedPayload {
                source_temp_path: source.clone(),
                target_archive_path: dir.join(&name),
            });
        }
    }

    Ok(planned)
}

/// File payloads in order. A source that feeds several targets is copied to
/// all but its last one and moved there.
fn file_payloads(payloads: &[ExtractedPayload]) -> std::io::Result<Vec<PathBuf>> {
    let mut archived = Vec::with_capacity(payloads.len());

    for (i, payload) in payloads.iter().enumerate() {
        let reused_later = payloads[i + 1..]
            .iter()
            .any(|p| p.source_temp_path == payload.source_temp_path);

        if reused_later {
            copy_payload(&payload.source_temp_path, &payload.target_archive_path)?;
        } else {
            move_payload(&payload.source_temp_path, &payload.target_archive_path)?;
        }
        debug!(
            "Archived {:?} -> {:?}",
            payload.source_temp_path, payload.target_archive_path
        );
        archived.push(payload.target_archive_path.clone());
    }

    Ok(archived)
}
