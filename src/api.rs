//! High-level API for update runs
//!
//! A [`Session`] validates the run's paths once, then drives the download
//! and extraction phases over a manifest.

use crate::defaults::{
    DEFAULT_PACKAGE_EXTENSION, get_concurrency, get_extractor_template, get_force, get_temp_root,
};
use crate::download::{DownloadReport, Fetch, HttpFetcher, download_all};
use crate::exceptions::{Result, VaultError};
use crate::extract::extractor::{self, Extractor};
use crate::extract::{ExtractionPipeline, ExtractionReport};
use crate::manifest::{Manifest, PlatformSet};
use crate::signing::SignatureInspector;
use glob::{MatchOptions, Pattern};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options for one update run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Update manifest (XML)
    pub manifest_path: PathBuf,
    /// Staging directory for downloads, created if absent
    pub working_dir: PathBuf,
    /// Root of the `X86`/`X64` archive trees; must exist
    pub archive_root: PathBuf,
    /// Maximum parallel downloads
    pub concurrency: usize,
    /// Re-download files that are already valid
    pub force: bool,
    /// Extractor command template; packages extract themselves when unset
    pub extractor_template: Option<String>,
    /// Parent for extraction temp directories
    pub temp_root: Option<PathBuf>,
}

impl RunOptions {
    /// Options for the given paths, with the rest taken from the environment
    pub fn new(manifest_path: PathBuf, working_dir: PathBuf, archive_root: PathBuf) -> Self {
        Self {
            manifest_path,
            working_dir,
            archive_root,
            concurrency: get_concurrency(),
            force: get_force(),
            extractor_template: get_extractor_template(),
            temp_root: get_temp_root(),
        }
    }
}

/// What a completed run did
#[derive(Debug)]
pub struct RunSummary {
    pub manifest: Manifest,
    pub download: DownloadReport,
    pub extraction: ExtractionReport,
}

/// One initialized update run
#[derive(Debug)]
pub struct Session {
    options: RunOptions,
    platforms: PlatformSet,
    fetcher: Arc<dyn Fetch>,
    pipeline: ExtractionPipeline,
}

impl Session {
    /// Initialize with the CMS verifier, the HTTP fetcher and the
    /// configured extractor
    pub fn new(options: RunOptions) -> Result<Self> {
        let inspector = SignatureInspector::default();
        let fetcher = Arc::new(HttpFetcher::new(inspector.clone())?);
        let extractor = extractor::from_template(options.extractor_template.as_deref())?;
        Self::with_components(options, inspector, fetcher, extractor)
    }

    /// Initialize with explicit collaborators
    pub fn with_components(
        options: RunOptions,
        inspector: SignatureInspector,
        fetcher: Arc<dyn Fetch>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self> {
        let platforms = initialize(&options)?;
        let pipeline = ExtractionPipeline::new(extractor, inspector)
            .with_temp_root(options.temp_root.clone());

        Ok(Self {
            options,
            platforms,
            fetcher,
            pipeline,
        })
    }

    /// Platform directories found under the archive root
    pub fn platforms(&self) -> PlatformSet {
        self.platforms
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Download everything the manifest lists, then extract and archive
    /// every package in the working directory
    pub async fn run(&self) -> Result<RunSummary> {
        let manifest = Manifest::load(&self.options.manifest_path)?;

        if !self.platforms.contains(manifest.platform()) {
            warn!(
                "Archive root {:?} has no directory for {}; it will be created",
                self.options.archive_root,
                manifest.platform()
            );
        }

        info!("Starting downloads in {:?}", self.options.working_dir);
        let download = self.download(&manifest).await?;

        info!("Starting extraction");
        let packages = find_packages(&self.options.working_dir)?;
        let extraction = self
            .pipeline
            .extract_all(&packages, &self.options.archive_root, manifest.platform())
            .await?;

        Ok(RunSummary {
            manifest,
            download,
            extraction,
        })
    }

    /// Run only the download phase
    pub async fn download(&self, manifest: &Manifest) -> Result<DownloadReport> {
        download_all(
            self.fetcher.as_ref(),
            manifest,
            &self.options.working_dir,
            self.options.concurrency,
            self.options.force,
        )
        .await
    }
}

/// Validate the run's paths and detect archive platforms
fn initialize(options: &RunOptions) -> Result<PlatformSet> {
    if !options.archive_root.is_dir() {
        return Err(VaultError::Config(format!(
            "Archive root {:?} does not exist",
            options.archive_root
        )));
    }

    if !options.manifest_path.is_file() {
        return Err(VaultError::Manifest(format!(
            "Manifest file {:?} does not exist",
            options.manifest_path
        )));
    }

    if !options.working_dir.is_dir() {
        debug!("Creating working directory {:?}", options.working_dir);
        fs::create_dir_all(&options.working_dir)?;
    }

    PlatformSet::detect(&options.archive_root)
}

/// Packages staged in `working_dir` (`*.exe`, any case), sorted
pub fn find_packages(working_dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/*.{DEFAULT_PACKAGE_EXTENSION}",
        Pattern::escape(&working_dir.to_string_lossy())
    );
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    let entries = glob::glob_with(&pattern, options)
        .map_err(|e| VaultError::Config(format!("Invalid package pattern '{pattern}': {e}")))?;

    let mut packages = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| VaultError::Io(e.into_error()))?;
        if path.is_file() {
            packages.push(path);
        }
    }
    packages.sort();

    debug!("Found {} package(s) in {working_dir:?}", packages.len());
    Ok(packages)
}
