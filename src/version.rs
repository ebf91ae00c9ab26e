//! Version information for the patchvault binary

/// Current version of patchvault
pub const VERSION: &str = env!("PATCHVAULT_VERSION");

/// Build timestamp (set at compile time)
pub const BUILD_TIME: Option<&str> = option_env!("BUILD_TIME");

/// Git commit hash (set at compile time)
pub const GIT_COMMIT: Option<&str> = option_env!("GIT_COMMIT");

/// Get full version string with optional build information
pub fn full_version() -> String {
    let mut version = VERSION.to_string();

    if let Some(commit) = GIT_COMMIT {
        let short: String = commit.chars().take(8).collect();
        version.push_str(&format!(" ({short})"));
    }

    if let Some(time) = BUILD_TIME {
        version.push_str(&format!(" built {time}"));
    }

    version
}
