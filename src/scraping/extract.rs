//! Layered result extraction from a rendered results page.
//!
//! Extraction runs as a single in-page evaluation over an ordered table of
//! strategy descriptors. The selector lists and thresholds are plain data
//! serialized into the call, so the algorithm is tweakable and testable
//! without re-deriving a live page. SERP markup drifts constantly; the
//! strategy order encodes "most specific first", and a generic anchor-scan
//! fallback tops the set up when the strategies come home short.
//!
//! `extract` never fails: an evaluation error yields an empty set, and zero
//! results is a valid outcome reported to the caller as such.

use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::core::types::SearchResult;

/// One extraction strategy: a container selector with title/snippet
/// selectors scoped to each container.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionStrategy {
    pub container: &'static str,
    pub title: &'static str,
    pub snippet: &'static str,
}

/// Ordered extraction configuration handed to the in-page pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractorConfig {
    /// Strategies in priority order; the pass stops early once enough
    /// results are gathered.
    pub strategies: Vec<ExtractionStrategy>,
    /// Standalone snippet selectors tried when a strategy's own snippet
    /// selector finds nothing.
    pub fallback_snippet_selectors: Vec<&'static str>,
    /// Link substrings excluded from the fallback anchor scan (the
    /// provider's own properties, account and support pages).
    pub excluded_link_markers: Vec<&'static str>,
    /// Minimum text length for a node to count as a snippet.
    pub min_snippet_length: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            strategies: vec![
                ExtractionStrategy {
                    container: "#search div.MjjYud",
                    title: "h3",
                    snippet: "div.VwiC3b",
                },
                ExtractionStrategy {
                    container: "#rso div.g",
                    title: "h3",
                    snippet: "div.VwiC3b",
                },
                ExtractionStrategy {
                    container: "div.g",
                    title: "h3",
                    snippet: "div.VwiC3b",
                },
                ExtractionStrategy {
                    container: "[data-sokoban-container]",
                    title: "h3",
                    snippet: "[data-sncf='1']",
                },
                ExtractionStrategy {
                    container: "div[data-hveid][data-ved]",
                    title: "h3",
                    snippet: "[data-sncf]",
                },
            ],
            fallback_snippet_selectors: vec![
                "div.VwiC3b",
                "[data-sncf]",
                "div.IsZvec",
                "span.aCOpRe",
                "div.lEBKkf",
                "div.s3v9rd",
            ],
            excluded_link_markers: vec![
                "google.",
                "gstatic.com",
                "googleusercontent.com",
                "webcache.",
                "/preferences",
                "/intl/",
                "accounts.",
                "support.",
                "policies.",
            ],
            min_snippet_length: 20,
        }
    }
}

/// Raw record shape produced by the in-page pass, re-validated on the Rust
/// side before it becomes a [`SearchResult`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// Two-phase extraction pass, evaluated in the page. Phase one walks the
/// strategy table; phase two is the anchor-scan fallback, sharing the seen
/// set so it only appends new links.
const EXTRACTION_SCRIPT: &str = r#"(cfg, maxResults) => {
    const out = [];
    const seen = new Set();
    const isHttp = (u) => typeof u === 'string'
        && (u.startsWith('http://') || u.startsWith('https://'));
    const clean = (t) => (t || '').replace(/\s+/g, ' ').trim();

    const snippetFor = (container, strategy) => {
        const selectors = [strategy.snippet, ...cfg.fallbackSnippetSelectors];
        for (const sel of selectors) {
            let el = null;
            try { el = container.querySelector(sel); } catch (_) { continue; }
            if (el) {
                const t = clean(el.innerText);
                if (t) return t;
            }
        }
        // Last resort: first descendant block with enough text and no
        // nested title element.
        for (const el of container.querySelectorAll('div, span, p')) {
            if (el.querySelector(strategy.title)) continue;
            const t = clean(el.innerText);
            if (t.length > cfg.minSnippetLength) return t;
        }
        return '';
    };

    for (const strategy of cfg.strategies) {
        if (out.length >= maxResults) break;
        let containers;
        try { containers = document.querySelectorAll(strategy.container); } catch (_) { continue; }
        for (const container of containers) {
            if (out.length >= maxResults) break;
            const titleEl = container.querySelector(strategy.title);
            if (!titleEl) continue;
            const linkEl = titleEl.querySelector('a')
                || titleEl.closest('a')
                || container.querySelector('a');
            const link = linkEl ? linkEl.href : '';
            if (!isHttp(link) || seen.has(link)) continue;
            const title = clean(titleEl.innerText);
            if (!title) continue;
            seen.add(link);
            out.push({ title, link, snippet: snippetFor(container, strategy) });
        }
    }

    if (out.length < maxResults) {
        for (const a of document.querySelectorAll('a[href]')) {
            if (out.length >= maxResults) break;
            const link = a.href;
            if (!isHttp(link) || seen.has(link)) continue;
            if (cfg.excludedLinkMarkers.some((m) => link.includes(m))) continue;
            const title = clean(a.innerText);
            if (!title) continue;
            let snippet = '';
            let node = a.parentElement;
            for (let depth = 0; node && depth < 3; depth++) {
                const t = clean(node.innerText);
                if (t.length > cfg.minSnippetLength && t !== title) {
                    snippet = t;
                    break;
                }
                node = node.parentElement;
            }
            seen.add(link);
            out.push({ title, link, snippet });
        }
    }

    return out.slice(0, maxResults);
}"#;

fn build_script(cfg: &ExtractorConfig, max_results: usize) -> String {
    let cfg_json = serde_json::to_string(cfg).unwrap_or_else(|_| "{}".to_string());
    format!("({})({}, {})", EXTRACTION_SCRIPT, cfg_json, max_results)
}

/// Run the extraction pass against a rendered page.
///
/// Returns at most `max_results` records and never errors — whatever could
/// be gathered is returned, possibly nothing.
pub async fn extract(page: &Page, cfg: &ExtractorConfig, max_results: usize) -> Vec<SearchResult> {
    if max_results == 0 {
        return Vec::new();
    }
    let script = build_script(cfg, max_results);
    let raw: Vec<RawRecord> = match page.evaluate(script).await {
        Ok(val) => val.into_value().unwrap_or_default(),
        Err(e) => {
            warn!("extract: in-page evaluation failed: {}", e);
            Vec::new()
        }
    };
    let results = validate_records(raw, max_results);
    debug!("extract: {} records after validation", results.len());
    results
}

/// Re-validate raw in-page records: non-empty title, absolute http(s) link,
/// unique by link (first occurrence wins), truncated to `max_results`.
pub fn validate_records(raw: Vec<RawRecord>, max_results: usize) -> Vec<SearchResult> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for rec in raw {
        if out.len() >= max_results {
            break;
        }
        let title = rec.title.trim();
        let link = rec.link.trim();
        if title.is_empty() || link.is_empty() {
            continue;
        }
        if !is_absolute_http(link) {
            continue;
        }
        if !seen.insert(link.to_string()) {
            continue;
        }
        out.push(SearchResult {
            title: title.to_string(),
            link: link.to_string(),
            snippet: rec.snippet.trim().to_string(),
        });
    }
    out
}

fn is_absolute_http(link: &str) -> bool {
    match url::Url::parse(link) {
        Ok(u) => matches!(u.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(title: &str, link: &str, snippet: &str) -> RawRecord {
        RawRecord {
            title: title.to_string(),
            link: link.to_string(),
            snippet: snippet.to_string(),
        }
    }

    #[test]
    fn duplicate_links_first_occurrence_wins() {
        let raw = vec![
            rec("First", "https://example.com/a", "one"),
            rec("Second", "https://example.com/a", "two"),
            rec("Third", "https://example.com/b", "three"),
        ];
        let out = validate_records(raw, 10);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "First");
        assert_eq!(out[1].link, "https://example.com/b");
    }

    #[test]
    fn non_http_links_are_rejected() {
        let raw = vec![
            rec("Js", "javascript:void(0)", ""),
            rec("Mail", "mailto:x@example.com", ""),
            rec("Relative", "/search?q=x", ""),
            rec("Ftp", "ftp://example.com/file", ""),
            rec("Ok", "https://example.com", ""),
        ];
        let out = validate_records(raw, 10);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].link, "https://example.com");
    }

    #[test]
    fn empty_title_or_link_is_rejected() {
        let raw = vec![
            rec("", "https://example.com/a", "s"),
            rec("  ", "https://example.com/b", "s"),
            rec("Ok", "", "s"),
            rec("Kept", "https://example.com/c", ""),
        ];
        let out = validate_records(raw, 10);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Kept");
        assert!(out[0].snippet.is_empty());
    }

    #[test]
    fn output_is_truncated_to_max() {
        let raw: Vec<RawRecord> = (0..25)
            .map(|i| rec(&format!("T{i}"), &format!("https://example.com/{i}"), ""))
            .collect();
        assert_eq!(validate_records(raw.clone(), 10).len(), 10);
        assert_eq!(validate_records(raw.clone(), 3).len(), 3);
        assert!(validate_records(raw, 0).is_empty());
    }

    #[test]
    fn every_record_keeps_invariants() {
        let raw = vec![
            rec("A", "https://a.example", "  padded  "),
            rec("B", "http://b.example", ""),
        ];
        for r in validate_records(raw, 10) {
            assert!(!r.title.is_empty());
            assert!(r.link.starts_with("http://") || r.link.starts_with("https://"));
            assert_eq!(r.snippet, r.snippet.trim());
        }
    }

    #[test]
    fn config_serializes_with_js_visible_keys() {
        let cfg = ExtractorConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"strategies\""));
        assert!(json.contains("\"fallbackSnippetSelectors\""));
        assert!(json.contains("\"excludedLinkMarkers\""));
        assert!(json.contains("\"minSnippetLength\""));
    }

    #[test]
    fn default_config_is_ordered_and_non_empty() {
        let cfg = ExtractorConfig::default();
        assert!(!cfg.strategies.is_empty());
        assert!(!cfg.fallback_snippet_selectors.is_empty());
        // Most specific strategy first — the ordered table is the tie-break.
        assert!(cfg.strategies[0].container.starts_with("#search"));
        assert!(cfg.min_snippet_length > 0);
    }

    #[test]
    fn script_embeds_config_as_data() {
        let script = build_script(&ExtractorConfig::default(), 10);
        assert!(script.contains("fallbackSnippetSelectors"));
        assert!(script.ends_with(", 10)"));
    }
}
