//! Local download validity

use crate::signing::SignatureInspector;
use log::trace;
use std::path::Path;

/// True iff `path` is a regular file carrying a verified, counter-signed
/// embedded signature.
///
/// A partial or corrupt download never verifies, so it is never valid.
pub fn is_valid(path: &Path, inspector: &SignatureInspector) -> bool {
    if !path.is_file() {
        trace!("{path:?} does not exist yet");
        return false;
    }

    let valid = inspector.inspect(path).is_some();
    trace!("{path:?} valid={valid}");
    valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::test_support::{fake_inspector, signed_pe, synthetic_pe};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_signed_file_is_valid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kb1.exe");
        fs::write(&path, signed_pe("2023-04-01T10:15:30Z")).unwrap();

        assert!(is_valid(&path, &fake_inspector()));
    }

    #[test]
    fn test_existence_alone_is_not_enough() {
        let temp_dir = TempDir::new().unwrap();
        let inspector = fake_inspector();

        let unsigned = temp_dir.path().join("unsigned.exe");
        fs::write(&unsigned, b"MZ partial download").unwrap();
        assert!(!is_valid(&unsigned, &inspector));

        let no_time = temp_dir.path().join("no-time.exe");
        fs::write(&no_time, synthetic_pe(b"SIGNED")).unwrap();
        assert!(!is_valid(&no_time, &inspector));

        assert!(!is_valid(&temp_dir.path().join("missing.exe"), &inspector));
        assert!(!is_valid(temp_dir.path(), &inspector));
    }
}
