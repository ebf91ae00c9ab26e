//! Utility functions for patchvault

use std::env;
use std::path::Path;

/// Check if an environment variable is set to a truthy value
/// Accepts: "1", "true", "on", "yes", "t" (case insensitive)
pub fn is_env_true(key: &str) -> bool {
    match env::var(key) {
        Ok(val) => is_truthy(&val),
        Err(_) => false,
    }
}

fn is_truthy(val: &str) -> bool {
    let val_lower = val.trim().to_lowercase();
    matches!(val_lower.as_str(), "1" | "true" | "on" | "yes" | "t")
}

/// Local file name for a resource URI.
///
/// Takes the last path segment and keeps the trailing run of
/// `[A-Za-z0-9._-]` characters, so query strings and odd characters never
/// reach the filesystem. Returns `None` when nothing usable is left.
pub fn file_name_from_uri(uri: &str) -> Option<String> {
    let without_query = uri.split(['?', '#']).next().unwrap_or(uri);
    let last_segment = without_query.rsplit(['/', '\\']).next().unwrap_or(without_query);

    let name: String = last_segment
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        None
    } else {
        Some(name)
    }
}

/// Case-insensitive extension check
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}
