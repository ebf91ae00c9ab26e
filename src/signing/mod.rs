//! Embedded signature inspection
//!
//! The inspector reads the signed message embedded in a downloaded file,
//! hands it to a [`MessageVerifier`] and reports the counter-signed signing
//! time. Every failure degrades to "no timestamp": unsigned and corrupt
//! files are an expected input, not a fault.

pub mod cms;
pub mod constants;
pub mod pe;

pub use cms::{CmsVerifier, MessageVerifier, Verification};

use crate::exceptions::{Result, VaultError};
use chrono::{DateTime, Utc};
use log::{debug, trace};
use std::path::Path;
use std::sync::Arc;

/// Trusted signing time of a file, if it has one
pub type SignedTimestamp = Option<DateTime<Utc>>;

/// Reads and verifies embedded signed messages
#[derive(Debug, Clone)]
pub struct SignatureInspector {
    verifier: Arc<dyn MessageVerifier>,
}

impl Default for SignatureInspector {
    fn default() -> Self {
        Self::new(Arc::new(CmsVerifier))
    }
}

impl SignatureInspector {
    pub fn new(verifier: Arc<dyn MessageVerifier>) -> Self {
        Self { verifier }
    }

    /// Signing time of the file at `path`.
    ///
    /// `None` for missing, unsigned, tampered or unparseable files, and for
    /// valid signatures without a counter-signed time.
    pub fn inspect(&self, path: &Path) -> SignedTimestamp {
        match self.try_inspect(path) {
            Ok(timestamp) => timestamp,
            Err(e) => {
                debug!("No trusted timestamp for {path:?}: {e}");
                None
            }
        }
    }

    fn try_inspect(&self, path: &Path) -> Result<SignedTimestamp> {
        let message = pe::read_embedded_message(path)
            .map_err(|e| VaultError::Signature(format!("{e:#}")))?;
        trace!("Embedded message of {path:?} is {} bytes", message.len());

        let verification = self
            .verifier
            .verify(&message)
            .map_err(|e| VaultError::Signature(format!("{e:#}")))?;

        if !verification.valid {
            return Err(VaultError::Signature(
                "signature did not verify".to_string(),
            ));
        }

        Ok(verification.timestamp)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{fake_inspector, signed_pe, synthetic_pe};
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_inspect_returns_counter_signed_time() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kb1.exe");
        fs::write(&path, signed_pe("2023-04-01T10:15:30Z")).unwrap();

        let inspector = fake_inspector();
        let expected = Utc.with_ymd_and_hms(2023, 4, 1, 10, 15, 30).unwrap();
        assert_eq!(inspector.inspect(&path), Some(expected));
        // Same file, same answer
        assert_eq!(inspector.inspect(&path), Some(expected));
    }

    #[test]
    fn test_inspect_degrades_to_none() {
        let temp_dir = TempDir::new().unwrap();
        let inspector = fake_inspector();

        let cases: [(&str, Vec<u8>); 4] = [
            ("no-counter.exe", synthetic_pe(b"SIGNED")),
            ("tampered.exe", synthetic_pe(b"BAD")),
            ("garbage.exe", synthetic_pe(b"\xff\xfe")),
            ("plain.txt", b"not signed at all".to_vec()),
        ];
        for (name, contents) in cases {
            let path = temp_dir.path().join(name);
            fs::write(&path, contents).unwrap();
            assert_eq!(inspector.inspect(&path), None, "{name}");
        }

        assert_eq!(inspector.inspect(&temp_dir.path().join("missing.exe")), None);
    }

    #[test]
    fn test_default_inspector_reads_cms_counter_signature() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kb2760411.exe");
        fs::write(
            &path,
            synthetic_pe(include_bytes!("testdata/countersigned.p7")),
        )
        .unwrap();

        assert_eq!(
            SignatureInspector::default().inspect(&path),
            Some(Utc.with_ymd_and_hms(2023, 4, 1, 10, 15, 30).unwrap())
        );
    }

    #[test]
    fn test_default_inspector_rejects_non_cms() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kb1.exe");
        fs::write(&path, signed_pe("2023-04-01T10:15:30Z")).unwrap();

        assert_eq!(SignatureInspector::default().inspect(&path), None);
    }
}
