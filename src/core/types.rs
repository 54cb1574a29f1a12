use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::config;

/// One organic search result.
///
/// Within one extraction pass results are unique by `link` (first occurrence
/// wins) and both `title` and `link` are non-empty; `snippet` may be empty.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

/// Uniform response shape of the query operation. Returned even on pipeline
/// failure, carrying a single error-describing record in that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
}

/// Response of the raw-markup operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlResponse {
    pub query: String,
    /// Rendered page markup with all script/style elements removed.
    pub html: String,
    /// Final page URL after any redirects.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_html_length: Option<usize>,
}

/// Per-call options for the search pipeline.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum number of results to return.
    pub limit: usize,
    /// Per-navigation timeout in milliseconds. Selector waits and the
    /// assisted-mode challenge wait derive their bounds from this.
    pub timeout_ms: u64,
    /// Session-state file. The identity file lives next to it with a
    /// fingerprint-suffixed name.
    pub state_file: PathBuf,
    /// When set, neither the session nor the identity file is written.
    pub no_save_state: bool,
    /// Locale hint used when generating a fresh fingerprint.
    pub locale: String,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: config::DEFAULT_LIMIT,
            timeout_ms: config::DEFAULT_TIMEOUT_MS,
            state_file: config::default_state_file(),
            no_save_state: false,
            locale: config::DEFAULT_LOCALE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = SearchOptions::default();
        assert_eq!(opts.limit, 10);
        assert_eq!(opts.timeout_ms, 60_000);
        assert!(!opts.no_save_state);
        assert_eq!(opts.locale, "en-US");
    }

    #[test]
    fn html_response_omits_absent_artifacts() {
        let resp = HtmlResponse {
            query: "q".into(),
            html: "<html></html>".into(),
            url: "https://www.google.com/search?q=q".into(),
            saved_path: None,
            screenshot_path: None,
            original_html_length: Some(1234),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("savedPath"));
        assert!(!json.contains("screenshotPath"));
        assert!(json.contains("originalHtmlLength"));
    }
}
