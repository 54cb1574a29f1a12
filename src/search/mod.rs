//! End-to-end search orchestration.
//!
//! One call sequences: resolve identity → resolve session → acquire browser
//! → navigate → challenge/escalation protocol → submit query → await result
//! containers → extract → persist state → release. The challenge protocol
//! runs at three checkpoints (post-navigation, post-submit, result wait) and
//! may escalate automated → assisted exactly once per run; an externally
//! supplied browser is abandoned on escalation, never closed.
//!
//! State persistence is a single finally-style step executed on every exit
//! path; its failures are logged and swallowed so they never mask the
//! primary outcome.

use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::core::config::{
    self, GOOGLE_DOMAINS, POLL_INTERVAL_MS, QUERY_INPUT_SELECTORS, RESULT_CONTAINER_SELECTORS,
    SELECTOR_WAIT_MS,
};
use crate::core::types::{HtmlResponse, SearchOptions, SearchResponse, SearchResult};
use crate::core::SearchError;
use crate::features::fingerprint::{self, StoredIdentity};
use crate::features::mode::{self, ModeController};
use crate::features::{challenge, session_store};
use crate::scraping::browser_manager::{self, BrowserHandle};
use crate::scraping::extract::{self, ExtractorConfig};

/// Attempt outcomes that are not plain success: a recoverable condition the
/// mode controller may answer with escalation, or a fatal error.
enum AttemptError {
    Recoverable(SearchError),
    Fatal(SearchError),
}

/// Per-call pipeline state. Owns at most one browser for the lifetime of
/// the call; a caller-supplied handle is borrowed and never closed here.
struct Pipeline<'a> {
    opts: &'a SearchOptions,
    external: Option<&'a BrowserHandle>,
    owned: Option<BrowserHandle>,
    controller: ModeController,
    identity: StoredIdentity,
    session: Option<Vec<serde_json::Value>>,
}

impl<'a> Pipeline<'a> {
    fn new(opts: &'a SearchOptions, external: Option<&'a BrowserHandle>) -> Self {
        let fp_path = config::fingerprint_path(&opts.state_file);
        let identity = fingerprint::load_identity(&fp_path).unwrap_or_else(|| StoredIdentity {
            fingerprint: fingerprint::generate(Some(&opts.locale)),
            google_domain: pick_google_domain(),
        });
        let session = session_store::load(&opts.state_file);
        Self {
            opts,
            external,
            owned: None,
            controller: ModeController::new(),
            identity,
            session,
        }
    }

    fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.opts.timeout_ms)
    }

    /// Assisted-mode wait for a human to clear a challenge. A person is
    /// slower than a page load, so this gets double the navigation timeout.
    fn challenge_wait(&self) -> Duration {
        self.navigation_timeout() * 2
    }

    /// Make sure a usable browser exists for the current mode. A borrowed
    /// external handle serves automated attempts; assisted mode always runs
    /// on an owned, headed instance.
    async fn ensure_handle(&mut self) -> Result<(), SearchError> {
        if self.owned.is_some() {
            return Ok(());
        }
        if self.external.is_some() && !self.controller.mode().is_assisted() {
            return Ok(());
        }
        let handle =
            BrowserHandle::launch(self.controller.mode(), self.navigation_timeout()).await?;
        self.owned = Some(handle);
        Ok(())
    }

    fn active_handle(&self) -> &BrowserHandle {
        self.owned
            .as_ref()
            .or(self.external)
            .expect("browser present after ensure_handle")
    }

    /// Challenge checkpoint. Automated mode reports the challenge upward so
    /// the run loop can escalate; assisted mode suspends in place until the
    /// page leaves the challenge URLs or the bounded wait expires.
    async fn checkpoint(&self, page: &Page) -> Result<(), AttemptError> {
        if !challenge::page_is_challenged(page).await {
            return Ok(());
        }
        if self.controller.mode().is_assisted() {
            mode::wait_for_challenge_resolution(page, self.challenge_wait())
                .await
                .map_err(AttemptError::Fatal)
        } else {
            info!("search: challenge detected in automated mode");
            Err(AttemptError::Recoverable(SearchError::ChallengeUnresolved))
        }
    }

    /// One full attempt from navigation through the result-container wait.
    /// The page is torn down on any failure so a restart begins clean.
    async fn attempt(&mut self, query: &str) -> Result<Page, AttemptError> {
        self.ensure_handle().await.map_err(AttemptError::Fatal)?;

        let page = self
            .active_handle()
            .new_page()
            .await
            .map_err(|e| AttemptError::Fatal(SearchError::LaunchFailure(e.to_string())))?;

        match self.drive(&page, query).await {
            Ok(()) => Ok(page),
            Err(e) => {
                let _ = page.close().await;
                Err(e)
            }
        }
    }

    /// Navigate, clear the three challenge checkpoints, submit the query,
    /// and wait for a result container.
    async fn drive(&self, page: &Page, query: &str) -> Result<(), AttemptError> {
        browser_manager::install_stealth(page).await;
        browser_manager::apply_fingerprint(page, &self.identity.fingerprint).await;
        if let Some(cookies) = &self.session {
            session_store::inject(page, cookies).await;
        }

        let home = format!("https://{}/", self.identity.google_domain);
        info!(
            "search: navigating to {} ({} mode)",
            home,
            self.controller.mode().as_str()
        );
        if let Err(e) = browser_manager::navigate(page, &home, self.navigation_timeout()).await {
            // A timed-out navigation in automated mode often *is* the block;
            // let the run loop answer with escalation before giving up.
            return Err(if self.controller.mode().is_assisted() {
                AttemptError::Fatal(e)
            } else {
                AttemptError::Recoverable(e)
            });
        }
        browser_manager::human_delay(800, 2_000).await;
        self.checkpoint(page).await?;

        let Some(input) = browser_manager::find_first_element(page, QUERY_INPUT_SELECTORS).await
        else {
            return Err(AttemptError::Fatal(SearchError::InputNotFound));
        };

        input.click().await.map_err(|e| {
            AttemptError::Fatal(SearchError::NavigationTimeout(format!(
                "query input click failed: {}",
                e
            )))
        })?;
        browser_manager::human_delay(150, 400).await;
        input.type_str(query).await.map_err(|e| {
            AttemptError::Fatal(SearchError::NavigationTimeout(format!(
                "query typing failed: {}",
                e
            )))
        })?;
        browser_manager::human_delay(200, 500).await;
        input.press_key("Enter").await.map_err(|e| {
            AttemptError::Fatal(SearchError::NavigationTimeout(format!(
                "query submit failed: {}",
                e
            )))
        })?;

        browser_manager::human_delay(1_000, 2_500).await;
        self.checkpoint(page).await?;

        self.await_result_container(page).await
    }

    /// Wait for any result container, re-checking the challenge state
    /// between polls. Exhausting every selector after all challenge
    /// recovery is fatal.
    async fn await_result_container(&self, page: &Page) -> Result<(), AttemptError> {
        let per_selector = Duration::from_millis(SELECTOR_WAIT_MS);
        for sel in RESULT_CONTAINER_SELECTORS {
            let start = Instant::now();
            while start.elapsed() < per_selector {
                if browser_manager::selector_present(page, sel).await {
                    debug!("search: result container found: {}", sel);
                    return Ok(());
                }
                self.checkpoint(page).await?;
                tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
        Err(AttemptError::Fatal(SearchError::ResultContainerNotFound))
    }

    /// Run attempts until success, escalating automated → assisted at most
    /// once. On escalation the owned browser is torn down and relaunched
    /// headed; an external handle is simply abandoned.
    async fn search_page(&mut self, query: &str) -> Result<Page, SearchError> {
        loop {
            match self.attempt(query).await {
                Ok(page) => return Ok(page),
                Err(AttemptError::Recoverable(inner)) => {
                    if self.controller.escalate() {
                        if let Some(handle) = self.owned.take() {
                            handle.close().await;
                        }
                        info!("search: restarting from navigation in assisted mode");
                        continue;
                    }
                    return Err(inner);
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
            }
        }
    }

    async fn search_results(&mut self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let page = self.search_page(query).await?;
        let cfg = ExtractorConfig::default();
        let results = extract::extract(&page, &cfg, self.opts.limit).await;
        info!("search: extracted {} results", results.len());
        let _ = page.close().await;
        Ok(results)
    }

    /// Finally-style teardown: best-effort state persistence (on success and
    /// failure alike, unless opted out), then release of the owned browser.
    async fn finish(&mut self) {
        if !self.opts.no_save_state {
            self.persist_state().await;
        } else {
            debug!("search: state persistence disabled for this call");
        }
        if let Some(handle) = self.owned.take() {
            handle.close().await;
        }
    }

    async fn persist_state(&self) {
        if let Some(handle) = self.owned.as_ref().or(self.external) {
            match session_store::capture(handle.browser()).await {
                Ok(cookies) if !cookies.is_empty() => {
                    if let Err(e) = session_store::save(&self.opts.state_file, &cookies) {
                        warn!(
                            "search: {}",
                            SearchError::StatePersistence(e.to_string())
                        );
                    }
                }
                Ok(_) => debug!("search: cookie jar empty, session not written"),
                Err(e) => warn!("search: cookie capture failed: {}", e),
            }
        }

        let fp_path = config::fingerprint_path(&self.opts.state_file);
        if let Err(e) = fingerprint::save_identity(&fp_path, &self.identity) {
            warn!("search: {}", SearchError::StatePersistence(e.to_string()));
        }
    }
}

fn pick_google_domain() -> String {
    use rand::seq::IndexedRandom;
    let mut rng = rand::rng();
    GOOGLE_DOMAINS
        .choose(&mut rng)
        .copied()
        .unwrap_or(GOOGLE_DOMAINS[0])
        .to_string()
}

// ── Public operations ────────────────────────────────────────────────────────

/// Run a search, raising on fatal pipeline errors.
///
/// `external` lends a caller-owned browser for the automated phase; the
/// pipeline never closes it, and abandons it if escalation becomes
/// necessary.
pub async fn try_search(
    query: &str,
    opts: &SearchOptions,
    external: Option<&BrowserHandle>,
) -> Result<SearchResponse, SearchError> {
    let mut pipeline = Pipeline::new(opts, external);
    let outcome = pipeline.search_results(query).await;
    pipeline.finish().await;
    outcome.map(|results| SearchResponse {
        query: query.to_string(),
        results,
    })
}

/// Run a search with a uniform success-shaped response: a fatal pipeline
/// error becomes a single error-describing record instead of an `Err`.
/// This is the surface consumed by tool-integration layers that must not
/// crash their host.
pub async fn run_search(
    query: &str,
    opts: &SearchOptions,
    external: Option<&BrowserHandle>,
) -> SearchResponse {
    match try_search(query, opts, external).await {
        Ok(resp) => resp,
        Err(e) => {
            error!("search: pipeline failed: {}", e);
            let encoded = utf8_percent_encode(query, NON_ALPHANUMERIC).to_string();
            SearchResponse {
                query: query.to_string(),
                results: vec![SearchResult {
                    title: "Search failed".to_string(),
                    link: format!("https://www.google.com/search?q={}", encoded),
                    snippet: format!(
                        "The search could not be completed: {}. Try again later or rerun with a fresh state file.",
                        e
                    ),
                }],
            }
        }
    }
}

/// Fetch the rendered results-page markup for `query`, stripped of script
/// and style elements. Unlike [`run_search`], fatal errors propagate.
///
/// With `save_to_file`, the sanitized HTML and a full-page screenshot are
/// written to `output_path` (or an auto-named file under the temp dir).
pub async fn fetch_result_page_markup(
    query: &str,
    opts: &SearchOptions,
    save_to_file: bool,
    output_path: Option<PathBuf>,
) -> Result<HtmlResponse, SearchError> {
    let mut pipeline = Pipeline::new(opts, None);

    let outcome = async {
        let page = pipeline.search_page(query).await?;

        let html = page.content().await.map_err(|e| {
            SearchError::NavigationTimeout(format!("content capture failed: {}", e))
        })?;
        let original_len = html.len();
        let sanitized = sanitize_html(&html);
        let url = challenge::current_url(&page).await;

        let (saved_path, screenshot_path) = if save_to_file {
            save_artifacts(&page, &sanitized, query, output_path).await
        } else {
            (None, None)
        };

        let _ = page.close().await;

        Ok(HtmlResponse {
            query: query.to_string(),
            html: sanitized,
            url,
            saved_path,
            screenshot_path,
            original_html_length: Some(original_len),
        })
    }
    .await;

    pipeline.finish().await;
    outcome
}

// ── Markup artifacts ─────────────────────────────────────────────────────────

static SCRIPT_RE: OnceLock<Regex> = OnceLock::new();
static STYLE_RE: OnceLock<Regex> = OnceLock::new();

/// Remove all script and style elements from a markup snapshot.
pub fn sanitize_html(html: &str) -> String {
    let script_re = SCRIPT_RE
        .get_or_init(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("valid regex"));
    let style_re = STYLE_RE
        .get_or_init(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style>").expect("valid regex"));
    let without_scripts = script_re.replace_all(html, "");
    style_re.replace_all(&without_scripts, "").into_owned()
}

/// Write the sanitized HTML and a full-page screenshot, returning the paths
/// that were actually produced. Both writes are best-effort.
async fn save_artifacts(
    page: &Page,
    html: &str,
    query: &str,
    output_path: Option<PathBuf>,
) -> (Option<String>, Option<String>) {
    let html_path = match output_path {
        Some(p) => p,
        None => {
            let dir = std::env::temp_dir().join("serp-phantom-html");
            dir.join(format!(
                "{}-{}.html",
                query_slug(query),
                chrono::Utc::now().timestamp_millis()
            ))
        }
    };

    let saved_path = match write_artifact(&html_path, html.as_bytes()) {
        Ok(()) => {
            info!("search: markup saved to {}", html_path.display());
            Some(html_path.display().to_string())
        }
        Err(e) => {
            warn!("search: markup save failed: {}", e);
            None
        }
    };

    let screenshot_path = match page
        .screenshot(
            ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(true)
                .build(),
        )
        .await
    {
        Ok(bytes) => {
            let path = html_path.with_extension("png");
            match write_artifact(&path, &bytes) {
                Ok(()) => {
                    info!("search: screenshot saved to {}", path.display());
                    Some(path.display().to_string())
                }
                Err(e) => {
                    warn!("search: screenshot save failed: {}", e);
                    None
                }
            }
        }
        Err(e) => {
            warn!("search: screenshot capture failed: {}", e);
            None
        }
    };

    (saved_path, screenshot_path)
}

fn write_artifact(path: &std::path::Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

fn query_slug(query: &str) -> String {
    let slug: String = query
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "query".to_string()
    } else {
        slug.chars().take(40).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_script_and_style() {
        let html = r#"<html><head><style>.a{color:red}</style><script src="x.js"></script></head><body><p>kept</p><script>alert(1)</script></body></html>"#;
        let out = sanitize_html(html);
        assert!(!out.contains("<script"));
        assert!(!out.contains("<style"));
        assert!(out.contains("<p>kept</p>"));
    }

    #[test]
    fn sanitize_handles_mixed_case_and_multiline() {
        let html = "<SCRIPT>\nvar a = 1;\n</SCRIPT><div>ok</div><Style>\nbody{}\n</Style>";
        let out = sanitize_html(html);
        assert_eq!(out, "<div>ok</div>");
    }

    #[test]
    fn sanitize_leaves_plain_markup_alone() {
        let html = "<div class='g'><h3>Title</h3><a href='https://x'>x</a></div>";
        assert_eq!(sanitize_html(html), html);
    }

    #[test]
    fn query_slug_is_filesystem_safe() {
        assert_eq!(query_slug("rust async traits"), "rust-async-traits");
        assert_eq!(query_slug("  ??? "), "query");
        assert!(query_slug(&"x".repeat(100)).len() <= 40);
    }

    #[test]
    fn picked_domain_is_from_candidate_list() {
        for _ in 0..20 {
            let d = pick_google_domain();
            assert!(GOOGLE_DOMAINS.contains(&d.as_str()));
        }
    }
}
