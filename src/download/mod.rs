//! Download phase: validity checks, single fetches and the bounded
//! coordinator that drives them over a manifest.

pub mod coordinator;
pub mod fetcher;
pub mod validity;

pub use coordinator::{DownloadJob, DownloadReport, download_all};
pub use fetcher::{Fetch, FetchOutcome, HttpFetcher};
pub use validity::is_valid;
