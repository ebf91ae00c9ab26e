//! Update manifest and target platforms
//!
//! A manifest is a small XML document:
//!
//! ```xml
//! <updates platform="x64">
//!   <update uri="http://download.example.com/kb2760411-fullfile-x64.exe" />
//!   <update uri="http://download.example.com/kb2817430-fullfile-x64.exe" />
//! </updates>
//! ```

use crate::exceptions::{Result, VaultError};
use log::{debug, trace};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Target platform of a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    X86,
    X64,
    Both,
}

impl Platform {
    /// Archive subdirectory names this platform files payloads under
    pub fn archive_dirs(&self) -> &'static [&'static str] {
        match self {
            Platform::X86 => &["X86"],
            Platform::X64 => &["X64"],
            Platform::Both => &["X86", "X64"],
        }
    }

    const fn bits(&self) -> u8 {
        match self {
            Platform::X86 => 0b01,
            Platform::X64 => 0b10,
            Platform::Both => 0b11,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::X86 => write!(f, "X86"),
            Platform::X64 => write!(f, "X64"),
            Platform::Both => write!(f, "X86, X64"),
        }
    }
}

impl FromStr for Platform {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        let mut bits = 0u8;
        for part in s.split(',').map(str::trim) {
            bits |= match part.to_lowercase().as_str() {
                "x86" => Platform::X86.bits(),
                "x64" => Platform::X64.bits(),
                "both" => Platform::Both.bits(),
                _ => {
                    return Err(VaultError::Manifest(format!(
                        "Unknown platform '{s}' (expected x86, x64 or both)"
                    )));
                }
            };
        }

        match bits {
            0b01 => Ok(Platform::X86),
            0b10 => Ok(Platform::X64),
            0b11 => Ok(Platform::Both),
            _ => Err(VaultError::Manifest(format!("Unknown platform '{s}'"))),
        }
    }
}

/// Platforms whose subdirectories exist under the archive root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformSet(u8);

impl PlatformSet {
    /// Look for `x86`/`x64` subdirectories (any case) under the archive root
    pub fn detect(archive_root: &Path) -> Result<Self> {
        let mut set = PlatformSet::default();

        for entry in fs::read_dir(archive_root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_string_lossy().to_lowercase().as_str() {
                "x86" => set.insert(Platform::X86),
                "x64" => set.insert(Platform::X64),
                _ => {}
            }
        }

        debug!("Detected archive platforms under {archive_root:?}: {set:?}");
        Ok(set)
    }

    pub fn insert(&mut self, platform: Platform) {
        self.0 |= platform.bits();
    }

    /// True when every platform `platform` targets is present
    pub fn contains(&self, platform: Platform) -> bool {
        self.0 & platform.bits() == platform.bits()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Parsed update list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    platform: Platform,
    resources: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    platform: Option<String>,
    #[serde(rename = "update", default)]
    updates: Vec<RawUpdate>,
}

#[derive(Debug, Deserialize)]
struct RawUpdate {
    uri: Option<String>,
}

impl Manifest {
    /// Build a manifest directly from its parts
    pub fn new(platform: Platform, resources: Vec<String>) -> Self {
        Self {
            platform,
            resources,
        }
    }

    /// Read and parse a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(VaultError::Manifest(format!(
                "Manifest file {path:?} does not exist"
            )));
        }

        let source = fs::read_to_string(path).map_err(|e| {
            VaultError::Manifest(format!("Failed to read manifest {path:?}: {e}"))
        })?;

        debug!("Loaded manifest from {path:?} ({} bytes)", source.len());
        Self::parse(&source)
    }

    /// Parse manifest XML
    pub fn parse(source: &str) -> Result<Self> {
        let raw: RawManifest = serde_xml_rs::from_str(source)
            .map_err(|e| VaultError::Manifest(format!("Malformed manifest: {e}")))?;

        let platform = raw
            .platform
            .as_deref()
            .ok_or_else(|| {
                VaultError::Manifest("Manifest root is missing the 'platform' attribute".to_string())
            })?
            .parse::<Platform>()?;

        let mut resources = Vec::with_capacity(raw.updates.len());
        for (i, update) in raw.updates.into_iter().enumerate() {
            let uri = update.uri.as_deref().map(str::trim).unwrap_or_default();
            if uri.is_empty() {
                return Err(VaultError::Manifest(format!(
                    "Update entry {} has no 'uri' attribute",
                    i + 1
                )));
            }
            trace!("Manifest resource {}: {uri}", i + 1);
            resources.push(uri.to_string());
        }

        debug!(
            "Manifest targets {platform} with {} resource(s)",
            resources.len()
        );
        Ok(Self {
            platform,
            resources,
        })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Resource locators in manifest order
    pub fn resources(&self) -> &[String] {
        &self.resources
    }
}
