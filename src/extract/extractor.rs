//! External extraction tools
//!
//! An extractor is an opaque subprocess: it gets a package path and an
//! output directory, and its exit status plus the files it leaves behind
//! are the whole contract.

use crate::defaults::{SELF_EXTRACT_ARG_PREFIX, SELF_EXTRACT_QUIET_ARG};
use crate::exceptions::{Result, VaultError};
use log::{debug, info, warn};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// Extracts a package's payloads into a directory
pub trait Extractor: Send + Sync + fmt::Debug {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Run to completion, writing payloads into `output_dir`
    fn extract(&self, package: &Path, output_dir: &Path) -> Result<()>;
}

fn package_label(package: &Path) -> String {
    package
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| package.display().to_string())
}

/// Run a prepared command and wait for it to exit
fn run_to_completion(mut command: Command, package: &Path) -> Result<()> {
    debug!("Running extractor: {command:?}");

    let output = command.output().map_err(|e| {
        VaultError::extraction(
            package_label(package),
            format!("failed to start {:?}: {e}", command.get_program()),
        )
    })?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            info!("Extractor stdout:\n{}", stdout.trim_end());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = match output.status.code() {
            Some(code) => format!("extractor exited with status {code}"),
            None => "extractor was terminated by a signal".to_string(),
        };
        let reason = if stderr.trim().is_empty() {
            reason
        } else {
            format!("{reason}: {}", stderr.trim())
        };
        return Err(VaultError::extraction(package_label(package), reason));
    }

    Ok(())
}

/// Runs the package itself with `/extract:<dir> /passive`
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfExtractor;

impl SelfExtractor {
    fn arguments(output_dir: &Path) -> Vec<OsString> {
        let mut extract_arg = OsString::from(SELF_EXTRACT_ARG_PREFIX);
        extract_arg.push(output_dir.as_os_str());
        vec![extract_arg, OsString::from(SELF_EXTRACT_QUIET_ARG)]
    }
}

impl Extractor for SelfExtractor {
    fn name(&self) -> &str {
        "self-extract"
    }

    fn extract(&self, package: &Path, output_dir: &Path) -> Result<()> {
        let mut command = Command::new(package);
        command.args(Self::arguments(output_dir));
        run_to_completion(command, package)
    }
}

/// A configured tool, e.g. `7z x {package} -o{output} -y`
///
/// The template is split on whitespace; `{package}` and `{output}` are
/// replaced in every argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
}

impl CommandExtractor {
    pub fn parse(template: &str) -> Result<Self> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| VaultError::Config("Extractor command template is empty".to_string()))?;
        let args: Vec<String> = parts.collect();

        if !args
            .iter()
            .any(|a| a.contains("{package}") || a.contains("{output}"))
        {
            warn!("Extractor template '{template}' references neither {{package}} nor {{output}}");
        }

        Ok(Self { program, args })
    }

    /// Resolve bare program names through PATH
    fn resolve_program(&self) -> PathBuf {
        if self.program.contains(['/', '\\']) {
            return PathBuf::from(&self.program);
        }
        match which::which(&self.program) {
            Ok(path) => {
                debug!("Resolved extractor '{}' to {path:?}", self.program);
                path
            }
            Err(_) => PathBuf::from(&self.program),
        }
    }

    fn arguments(&self, package: &Path, output_dir: &Path) -> Vec<String> {
        let package = package.to_string_lossy();
        let output = output_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{package}", &package).replace("{output}", &output))
            .collect()
    }
}

impl Extractor for CommandExtractor {
    fn name(&self) -> &str {
        &self.program
    }

    fn extract(&self, package: &Path, output_dir: &Path) -> Result<()> {
        let mut command = Command::new(self.resolve_program());
        command.args(self.arguments(package, output_dir));
        run_to_completion(command, package)
    }
}

/// Extractor for an optional command template; packages extract themselves
/// when none is configured.
pub fn from_template(template: Option<&str>) -> Result<Arc<dyn Extractor>> {
    match template {
        Some(template) => Ok(Arc::new(CommandExtractor::parse(template)?)),
        None => Ok(Arc::new(SelfExtractor)),
    }
}
