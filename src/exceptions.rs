//! Error types for patchvault

use std::fmt;

/// Main error type for patchvault operations
#[derive(Debug)]
pub enum VaultError {
    /// Manifest missing, malformed or naming an unknown platform
    Manifest(String),

    /// A single resource could not be downloaded
    Fetch { uri: String, reason: String },

    /// Signed message could not be read, decoded or verified.
    /// Never escapes the signature inspector.
    Signature(String),

    /// A package could not be extracted or its payloads archived
    Extraction { package: String, reason: String },

    /// Invalid run configuration (missing directories, bad settings)
    Config(String),

    /// IO error
    Io(std::io::Error),

    /// Generic error with message
    Generic(String),
}

impl VaultError {
    pub(crate) fn fetch(uri: impl Into<String>, reason: impl fmt::Display) -> Self {
        VaultError::Fetch {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn extraction(package: impl Into<String>, reason: impl fmt::Display) -> Self {
        VaultError::Extraction {
            package: package.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultError::Manifest(msg) => write!(f, "Manifest error: {msg}"),
            VaultError::Fetch { uri, reason } => write!(f, "Failed to fetch {uri}: {reason}"),
            VaultError::Signature(msg) => write!(f, "Signature error: {msg}"),
            VaultError::Extraction { package, reason } => {
                write!(f, "Failed to extract {package}: {reason}")
            }
            VaultError::Config(msg) => write!(f, "Configuration error: {msg}"),
            VaultError::Io(err) => write!(f, "IO error: {err}"),
            VaultError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for VaultError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VaultError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::Io(err)
    }
}

impl From<anyhow::Error> for VaultError {
    fn from(err: anyhow::Error) -> Self {
        VaultError::Generic(format!("{err:#}"))
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(err: tokio::task::JoinError) -> Self {
        VaultError::Generic(format!("Background task failed: {err}"))
    }
}

/// Result type for patchvault operations
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_failing_item() {
        let err = VaultError::fetch("https://example.test/a.exe", "HTTP 404");
        assert_eq!(
            err.to_string(),
            "Failed to fetch https://example.test/a.exe: HTTP 404"
        );

        let err = VaultError::extraction("a.exe", "exit status 2");
        assert_eq!(err.to_string(), "Failed to extract a.exe: exit status 2");
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error;

        let err = VaultError::from(std::io::Error::other("disk full"));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("disk full"));
    }
}
