use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Defaults and fixed configuration tables for the search pipeline.
// ---------------------------------------------------------------------------

pub const DEFAULT_LIMIT: usize = 10;
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_LOCALE: &str = "en-US";

/// Browser cold starts are slow; launching gets a multiple of the navigation
/// timeout so a slow start is not mistaken for a hang.
pub const LAUNCH_TIMEOUT_MULTIPLIER: u32 = 2;

/// Poll interval for selector waits and challenge-resolution polling.
pub const POLL_INTERVAL_MS: u64 = 500;

/// Per-selector bound when waiting for a result container to appear. The
/// full list is tried in order, so the worst case is `len * this`.
pub const SELECTOR_WAIT_MS: u64 = 5_000;

/// Regional Google endpoints. One is chosen pseudo-randomly on the first run
/// and persisted next to the fingerprint so every later run hits the same
/// endpoint.
pub const GOOGLE_DOMAINS: &[&str] = &[
    "www.google.com",
    "www.google.co.uk",
    "www.google.ca",
    "www.google.com.au",
];

/// Candidate query-input selectors, tried in order. First match wins;
/// no match at all is a fatal `InputNotFound`.
pub const QUERY_INPUT_SELECTORS: &[&str] = &[
    "textarea[name='q']",
    "input[name='q']",
    "textarea[title='Search']",
    "textarea[aria-label='Search']",
    "input[type='search']",
];

/// Result-container selectors awaited after query submission, in order.
pub const RESULT_CONTAINER_SELECTORS: &[&str] = &["#search", "#rso", "div.g", "#main"];

pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_STATE_DIR: &str = "SERP_PHANTOM_STATE_DIR";

/// Root directory for persisted state files.
///
/// `SERP_PHANTOM_STATE_DIR` overrides; otherwise `~/.serp-phantom`, falling
/// back to the system temp dir when no home directory is resolvable.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let dir = dir.trim();
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    match dirs::home_dir() {
        Some(home) => home.join(".serp-phantom"),
        None => std::env::temp_dir().join(".serp-phantom"),
    }
}

/// Default session-state file path: `<state_dir>/state.json`.
pub fn default_state_file() -> PathBuf {
    state_dir().join("state.json")
}

/// Derive the identity-file path from a session-state path by replacing the
/// extension with a fingerprint-suffixed name.
///
/// `…/state.json` → `…/state-fingerprint.json`
pub fn fingerprint_path(state_file: &Path) -> PathBuf {
    let stem = state_file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    state_file.with_file_name(format!("{}-fingerprint.json", stem))
}

/// Optional override for the Chromium-family browser executable.
///
/// Default behavior is auto-discovery (see `scraping::browser_manager`).
/// This only returns a value when `CHROME_EXECUTABLE` points at an existing
/// path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_path_replaces_extension() {
        assert_eq!(
            fingerprint_path(Path::new("/tmp/foo/state.json")),
            PathBuf::from("/tmp/foo/state-fingerprint.json")
        );
        assert_eq!(
            fingerprint_path(Path::new("session.dat")),
            PathBuf::from("session-fingerprint.json")
        );
    }

    #[test]
    fn default_state_file_is_under_state_dir() {
        assert!(default_state_file().ends_with("state.json"));
    }

    #[test]
    fn selector_lists_are_non_empty() {
        assert!(!QUERY_INPUT_SELECTORS.is_empty());
        assert!(!RESULT_CONTAINER_SELECTORS.is_empty());
        assert!(!GOOGLE_DOMAINS.is_empty());
    }
}
