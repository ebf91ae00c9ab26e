//! Standard exit codes for the patchvault binary
//!
//! Keeps error reporting stable for scripts that schedule update runs.

use crate::exceptions::VaultError;

/// Successful execution
pub const EXIT_SUCCESS: i32 = 0;

/// Generic error (avoid using - be more specific)
pub const EXIT_ERROR: i32 = 1;

/// Panic or unrecoverable error
pub const EXIT_PANIC: i32 = 101;

/// Extraction error (extractor failed to start or exited abnormally, payload move failed)
pub const EXIT_EXTRACTION_ERROR: i32 = 103;

/// Invalid command-line arguments or run configuration
pub const EXIT_INVALID_ARGS: i32 = 105;

/// I/O error (file not found, permission denied, disk error)
pub const EXIT_IO_ERROR: i32 = 106;

/// Manifest error (missing file, malformed XML, unknown platform)
pub const EXIT_MANIFEST_ERROR: i32 = 109;

/// At least one resource failed to download
pub const EXIT_DOWNLOAD_ERROR: i32 = 111;

/// Map an error to the exit code reported by the binary
pub fn exit_code_for(err: &VaultError) -> i32 {
    match err {
        VaultError::Manifest(_) => EXIT_MANIFEST_ERROR,
        VaultError::Fetch { .. } => EXIT_DOWNLOAD_ERROR,
        VaultError::Extraction { .. } => EXIT_EXTRACTION_ERROR,
        VaultError::Config(_) => EXIT_INVALID_ARGS,
        VaultError::Io(_) => EXIT_IO_ERROR,
        VaultError::Signature(_) | VaultError::Generic(_) => EXIT_ERROR,
    }
}
