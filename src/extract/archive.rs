//! Archive layout and payload filing
//!
//! Payloads land in `<root>/<X86|X64>/updates/<yyyy-MM-dd-HHmmss>-<name>`.
//! Names are keyed by the package's signing time, so a second run over the
//! same package resolves to the same path and overwrites it.

use crate::defaults::{ARCHIVE_TIMESTAMP_FORMAT, UPDATES_DIR};
use chrono::{DateTime, Utc};
use log::{debug, trace};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// `<signing time>-<original name>`
pub fn archive_name(timestamp: &DateTime<Utc>, file_name: &str) -> String {
    format!("{}-{file_name}", timestamp.format(ARCHIVE_TIMESTAMP_FORMAT))
}

/// `<root>/<platform dir>/updates`
pub fn archive_dir(archive_root: &Path, platform_dir: &str) -> PathBuf {
    archive_root.join(platform_dir).join(UPDATES_DIR)
}

fn remove_existing(destination: &Path) -> io::Result<()> {
    match fs::remove_file(destination) {
        Ok(()) => {
            debug!("Overwriting existing archive entry {destination:?}");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Move `source` to `destination`, replacing whatever is there.
///
/// Falls back to copy and delete when the two paths are on different
/// filesystems.
pub fn move_payload(source: &Path, destination: &Path) -> io::Result<()> {
    remove_existing(destination)?;

    if let Err(e) = fs::rename(source, destination) {
        trace!("rename {source:?} -> {destination:?} failed ({e}), copying instead");
        fs::copy(source, destination)?;
        fs::remove_file(source)?;
    }

    Ok(())
}

/// Copy `source` to `destination`, replacing whatever is there
pub fn copy_payload(source: &Path, destination: &Path) -> io::Result<()> {
    remove_existing(destination)?;
    fs::copy(source, destination)?;
    Ok(())
}
