// Centralized default values and environment overrides

use crate::utils::is_env_true;
use std::env;
use std::time::Duration;

// =================================
// Download defaults
// =================================
pub const DEFAULT_CONCURRENCY: usize = 3; // Parallel downloads
pub const DEFAULT_USER_AGENT: &str = concat!("patchvault/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30 * 60); // Packages can be large
pub const PARTIAL_DOWNLOAD_SUFFIX: &str = "part";

// =================================
// Extraction defaults
// =================================
pub const DEFAULT_PACKAGE_EXTENSION: &str = "exe"; // Extraction inputs in the working dir
pub const DEFAULT_PAYLOAD_EXTENSION: &str = "msp"; // Patch payloads produced by the extractor
pub const DEFAULT_TEMP_PREFIX: &str = "patchvault-";
pub const SELF_EXTRACT_ARG_PREFIX: &str = "/extract:";
pub const SELF_EXTRACT_QUIET_ARG: &str = "/passive";

// =================================
// Archive layout
// =================================
pub const UPDATES_DIR: &str = "updates";
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S"; // Sortable, second precision

// =================================
// Environment variables
// =================================
pub const ENV_CONCURRENCY: &str = "PATCHVAULT_CONCURRENCY";
pub const ENV_FORCE: &str = "PATCHVAULT_FORCE";
pub const ENV_EXTRACTOR: &str = "PATCHVAULT_EXTRACTOR";
pub const ENV_TMPDIR: &str = "PATCHVAULT_TMPDIR";

/// Download concurrency from `PATCHVAULT_CONCURRENCY`, or the default
pub fn get_concurrency() -> usize {
    env::var(ENV_CONCURRENCY)
        .ok()
        .and_then(|v| parse_concurrency(&v))
        .unwrap_or(DEFAULT_CONCURRENCY)
}

/// Parse a concurrency value, rejecting zero and garbage
pub fn parse_concurrency(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

/// Whether `PATCHVAULT_FORCE` asks to re-download valid files
pub fn get_force() -> bool {
    is_env_true(ENV_FORCE)
}

/// Extractor command template from `PATCHVAULT_EXTRACTOR`, if set
pub fn get_extractor_template() -> Option<String> {
    env::var(ENV_EXTRACTOR)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Root for extraction temp directories from `PATCHVAULT_TMPDIR`, if set
pub fn get_temp_root() -> Option<std::path::PathBuf> {
    env::var_os(ENV_TMPDIR).map(std::path::PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_concurrency() {
        assert_eq!(parse_concurrency("5"), Some(5));
        assert_eq!(parse_concurrency(" 2 "), Some(2));
        assert_eq!(parse_concurrency("0"), None);
        assert_eq!(parse_concurrency("many"), None);
    }
}
