//! Session persistence — opaque cookie blobs round-tripped through disk.
//!
//! The blob is whatever the browser runtime hands back for its cookie jar,
//! stored as raw JSON values and re-submitted unchanged on the next run.
//! Reusing an authenticated-looking jar measurably reduces repeated
//! challenge exposure. Corrupt or unreadable session data never aborts a
//! run — it degrades to a fresh, unauthenticated session.

use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetCookiesParams};
use chromiumoxide::{Browser, Page};
use std::path::Path;
use tracing::{debug, info, warn};

/// Whether a session file is present at `path`.
pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Load the stored cookie blob. Missing, empty, or corrupt files all read as
/// "no session".
pub fn load(path: &Path) -> Option<Vec<serde_json::Value>> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("session_store: unreadable session file {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<Vec<serde_json::Value>>(&content) {
        Ok(cookies) if cookies.is_empty() => None,
        Ok(cookies) => {
            info!(
                "session_store: loaded {} cookies from {}",
                cookies.len(),
                path.display()
            );
            Some(cookies)
        }
        Err(e) => {
            warn!(
                "session_store: corrupt session file {} — treating as absent: {}",
                path.display(),
                e
            );
            None
        }
    }
}

/// Persist a cookie blob, creating intermediate directories.
pub fn save(path: &Path, cookies: &[serde_json::Value]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(cookies)?;
    std::fs::write(path, json)?;
    debug!(
        "session_store: saved {} cookies to {}",
        cookies.len(),
        path.display()
    );
    Ok(())
}

/// Capture the live browser's cookie jar as raw JSON values.
pub async fn capture(browser: &Browser) -> anyhow::Result<Vec<serde_json::Value>> {
    let cookies = browser.get_cookies().await?;
    let raw: Vec<serde_json::Value> = cookies
        .iter()
        .filter_map(|c| serde_json::to_value(c).ok())
        .collect();
    debug!("session_store: captured {} cookies", raw.len());
    Ok(raw)
}

/// Inject a stored cookie blob into a page before navigation so the cookies
/// ride along on the initial request. Individual cookies that fail to
/// deserialize are skipped; a partially malformed blob never blocks the run.
pub async fn inject(page: &Page, raw_cookies: &[serde_json::Value]) {
    let cookie_params: Vec<CookieParam> = raw_cookies
        .iter()
        .filter_map(|v| serde_json::from_value::<CookieParam>(v.clone()).ok())
        .collect();

    if cookie_params.is_empty() {
        warn!("session_store: stored blob contained no usable cookies — skipping injection");
        return;
    }

    let count = cookie_params.len();
    match page.execute(SetCookiesParams::new(cookie_params)).await {
        Ok(_) => info!("session_store: injected {} session cookies", count),
        Err(e) => warn!("session_store: cookie injection failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!exists(&dir.path().join("state.json")));
        assert!(load(&dir.path().join("state.json")).is_none());
    }

    #[test]
    fn corrupt_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "][ not json").unwrap();
        assert!(load(&path).is_none());
    }

    #[test]
    fn empty_jar_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(load(&path).is_none());
    }

    #[test]
    fn blob_round_trips_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep").join("state.json");
        let cookies = vec![
            json!({"name": "NID", "value": "abc123", "domain": ".google.com", "path": "/", "expires": 1_800_000_000.0}),
            json!({"name": "AEC", "value": "xyz", "domain": ".google.com", "path": "/", "expires": -1.0}),
        ];
        save(&path, &cookies).unwrap();
        assert!(exists(&path));
        let loaded = load(&path).expect("saved blob should load");
        assert_eq!(loaded, cookies);
    }
}
