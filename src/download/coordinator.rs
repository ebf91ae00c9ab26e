//! Bounded-concurrency download of every manifest resource

use crate::download::fetcher::{Fetch, FetchOutcome};
use crate::exceptions::{Result, VaultError};
use crate::manifest::Manifest;
use crate::utils::file_name_from_uri;
use futures_util::stream::{self, StreamExt};
use log::{debug, error, info};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One resource to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub source_uri: String,
    pub destination: PathBuf,
    /// Set once the fetch reports the destination was already valid
    pub already_valid: bool,
}

impl DownloadJob {
    fn for_resource(uri: &str, working_dir: &Path) -> Result<Self> {
        let name = file_name_from_uri(uri)
            .ok_or_else(|| VaultError::fetch(uri, "URI does not name a file"))?;

        Ok(Self {
            source_uri: uri.to_string(),
            destination: working_dir.join(name),
            already_valid: false,
        })
    }
}

/// Per-resource outcomes of a download phase, in manifest order
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub completed: Vec<(DownloadJob, FetchOutcome)>,
    /// Resources that could not be fetched, keyed by source URI
    pub failed: Vec<(String, VaultError)>,
}

impl DownloadReport {
    pub fn downloaded(&self) -> usize {
        self.completed
            .iter()
            .filter(|(_, outcome)| matches!(outcome, FetchOutcome::Downloaded { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.completed
            .iter()
            .filter(|(_, outcome)| *outcome == FetchOutcome::Skipped)
            .count()
    }
}

/// Plan one job per distinct destination, in manifest order.
///
/// A resource that cannot be planned keeps its slot as an error so the
/// remaining resources are still fetched.
fn plan_jobs(manifest: &Manifest, working_dir: &Path) -> Vec<(String, Result<DownloadJob>)> {
    let mut seen = HashSet::new();
    let mut jobs = Vec::with_capacity(manifest.resources().len());

    for uri in manifest.resources() {
        let planned = DownloadJob::for_resource(uri, working_dir);
        if let Ok(job) = &planned {
            if !seen.insert(job.destination.clone()) {
                debug!("{uri} maps to an already planned download, ignoring");
                continue;
            }
        }
        jobs.push((uri.clone(), planned));
    }

    jobs
}

/// Fetch every manifest resource into `working_dir`.
///
/// At most `concurrency` fetches run at once (0 is treated as 1). Fetches
/// already started are never cancelled: when one fails, or a resource does
/// not name a file, the rest still settle and the first failure in manifest
/// order is returned afterwards.
pub async fn download_all(
    fetcher: &dyn Fetch,
    manifest: &Manifest,
    working_dir: &Path,
    concurrency: usize,
    force: bool,
) -> Result<DownloadReport> {
    let jobs = plan_jobs(manifest, working_dir);
    let concurrency = concurrency.max(1);
    info!(
        "Downloading {} resource(s) with concurrency {concurrency}",
        jobs.len()
    );

    let mut results: Vec<(usize, String, Result<(DownloadJob, FetchOutcome)>)> = stream::iter(
        jobs.into_iter().enumerate(),
    )
    .map(|(index, (uri, planned))| async move {
        let result = match planned {
            Ok(mut job) => fetcher
                .fetch(&job.source_uri, &job.destination, force)
                .await
                .map(|outcome| {
                    job.already_valid = outcome == FetchOutcome::Skipped;
                    (job, outcome)
                }),
            Err(e) => Err(e),
        };
        (index, uri, result)
    })
    .buffer_unordered(concurrency)
    .collect()
    .await;

    results.sort_by_key(|(index, _, _)| *index);

    let mut report = DownloadReport::default();
    for (_, uri, result) in results {
        match result {
            Ok(completed) => report.completed.push(completed),
            Err(e) => {
                error!("{e}");
                report.failed.push((uri, e));
            }
        }
    }

    info!(
        "Download phase finished: {} downloaded, {} already valid, {} failed",
        report.downloaded(),
        report.skipped(),
        report.failed.len()
    );

    if !report.failed.is_empty() {
        let (_, first) = report.failed.swap_remove(0);
        return Err(first);
    }

    Ok(report)
}
