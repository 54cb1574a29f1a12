//! Browser runtime plumbing over `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable Chromium-family executable (env override → PATH scan →
//!   well-known OS paths).
//! * Launching headless (automated) or headed (assisted) browser instances
//!   with stealth flags.
//! * Applying a persisted identity profile to a page via CDP emulation
//!   overrides (timezone, locale, appearance media features).
//! * Selector waits and human-like pacing delays.
//!
//! Stealth model: process-level flags hide the automation banner and the
//! `navigator.webdriver` flag; a JS init script installed on every new
//! document covers the remaining DOM-visible markers. The user agent is a
//! fixed canonical desktop profile — identity consistency across runs beats
//! rotation here, since a shifting fingerprint is itself a signal.

use anyhow::{anyhow, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    MediaFeature, SetEmulatedMediaParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::config::{self, LAUNCH_TIMEOUT_MULTIPLIER};
use crate::core::SearchError;
use crate::features::fingerprint::Fingerprint;
use crate::features::mode::ExecutionMode;

/// Fixed desktop user agent matching the canonical device profile.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const VIEWPORT_WIDTH: u32 = 1920;
const VIEWPORT_HEIGHT: u32 = 1080;

/// Init script installed on every new document, covering the DOM-visible
/// automation markers the launch flags don't reach.
const STEALTH_INIT_SCRIPT: &str = r#"
(() => {
    try {
        Object.defineProperty(Navigator.prototype, 'webdriver', {
            get: () => undefined,
            configurable: true,
        });
    } catch (e) {}
    try { delete navigator.webdriver; } catch (e) {}
    try {
        Object.defineProperty(Navigator.prototype, 'plugins', {
            get: () => [1, 2, 3, 4, 5],
            configurable: true,
        });
    } catch (e) {}
    if (!window.chrome) { window.chrome = {}; }
    if (!window.chrome.runtime) {
        window.chrome.runtime = {
            connect: function() { return { onDisconnect: { addListener: function() {} } }; },
            sendMessage: function() {},
        };
    }
    delete window.__playwright;
    delete window.__puppeteer;
    delete window.callPhantom;
    delete window._phantom;
})();
"#;

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan — catches package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = config::chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Config builder ───────────────────────────────────────────────────────────

/// Build a `BrowserConfig` for the given execution mode.
///
/// Automated runs are headless; assisted runs get a visible window so a
/// person can clear a challenge. The launch timeout is a multiple of the
/// navigation timeout so slow cold starts are not mistaken for hangs.
fn build_config(
    exe: &str,
    mode: ExecutionMode,
    navigation_timeout: Duration,
) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: VIEWPORT_WIDTH,
            height: VIEWPORT_HEIGHT,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
        .launch_timeout(navigation_timeout * LAUNCH_TIMEOUT_MULTIPLIER)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        // Stealth: suppress the CDP automation fingerprint
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", USER_AGENT));

    if mode.is_assisted() {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| anyhow!("failed to build browser config: {}", e))
}

// ── Browser handle ───────────────────────────────────────────────────────────

/// An owned browser instance plus its CDP event loop.
///
/// Callers may also supply their own handle to the orchestrator; the
/// escalation protocol never closes an externally supplied one — closing a
/// shared browser would take down every call sharing it.
pub struct BrowserHandle {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
}

impl BrowserHandle {
    /// Launch a browser for `mode`, driving its CDP handler in the
    /// background.
    pub async fn launch(
        mode: ExecutionMode,
        navigation_timeout: Duration,
    ) -> Result<Self, SearchError> {
        let exe = find_chrome_executable().ok_or_else(|| {
            SearchError::LaunchFailure(
                "no Chromium-family browser found; install Chrome or Chromium, or set CHROME_EXECUTABLE".to_string(),
            )
        })?;

        info!("browser: launching {} instance ({})", mode.as_str(), exe);

        let cfg = build_config(&exe, mode, navigation_timeout)
            .map_err(|e| SearchError::LaunchFailure(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(cfg)
            .await
            .map_err(|e| SearchError::LaunchFailure(format!("{} ({})", e, exe)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser: CDP handler event error: {}", e);
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Open a blank page in a fresh context.
    pub async fn new_page(&self) -> Result<Page> {
        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("failed to open page: {}", e))
    }

    /// Close the browser process and stop the event loop.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("browser: close error (non-fatal): {}", e);
        }
        self.handler_task.abort();
        info!("browser: instance shut down");
    }
}

// ── Page preparation ─────────────────────────────────────────────────────────

/// Install the stealth init script so it runs before any page script on
/// every navigated document.
pub async fn install_stealth(page: &Page) {
    if let Err(e) = page
        .execute(AddScriptToEvaluateOnNewDocumentParams::new(
            STEALTH_INIT_SCRIPT,
        ))
        .await
    {
        warn!("browser: stealth init script install failed: {}", e);
    }
}

/// Apply the identity profile to a page via CDP emulation overrides:
/// timezone, locale, and the appearance media features (color scheme,
/// reduced motion, forced colors). Best-effort — a failed override is
/// logged, not fatal.
pub async fn apply_fingerprint(page: &Page, fp: &Fingerprint) {
    if let Err(e) = page
        .execute(SetTimezoneOverrideParams {
            timezone_id: fp.timezone_id.clone(),
        })
        .await
    {
        warn!("browser: timezone override failed: {}", e);
    }

    let locale_params = SetLocaleOverrideParams::builder()
        .locale(fp.locale.clone())
        .build();
    if let Err(e) = page.execute(locale_params).await {
        warn!("browser: locale override failed: {}", e);
    }

    let features = vec![
        MediaFeature::new("prefers-color-scheme", fp.color_scheme.as_str()),
        MediaFeature::new("prefers-reduced-motion", fp.reduced_motion.as_str()),
        MediaFeature::new("forced-colors", fp.forced_colors.as_str()),
    ];
    let media_params = SetEmulatedMediaParams::builder().features(features).build();
    if let Err(e) = page.execute(media_params).await {
        warn!("browser: emulated media override failed: {}", e);
    }

    debug!(
        "browser: fingerprint applied (locale={}, tz={}, scheme={})",
        fp.locale,
        fp.timezone_id,
        fp.color_scheme.as_str()
    );
}

// ── Navigation and waits ─────────────────────────────────────────────────────

/// Navigate with a bounded wait. Both a transport error and an elapsed
/// timeout surface as [`SearchError::NavigationTimeout`]; the orchestrator
/// may answer with a mode escalation instead of failing outright.
pub async fn navigate(page: &Page, url: &str, timeout: Duration) -> Result<(), SearchError> {
    match tokio::time::timeout(timeout, page.goto(url)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(SearchError::NavigationTimeout(format!("{}: {}", url, e))),
        Err(_) => Err(SearchError::NavigationTimeout(format!(
            "{} after {}ms",
            url,
            timeout.as_millis()
        ))),
    }
}

/// Whether `selector` currently matches anything in the page.
pub async fn selector_present(page: &Page, selector: &str) -> bool {
    // Serialize the selector as a JSON string literal so embedded quotes
    // survive the trip into the page.
    let js = format!(
        "!!document.querySelector({})",
        serde_json::to_string(selector).unwrap_or_default()
    );
    page.evaluate(js)
        .await
        .ok()
        .and_then(|v| v.into_value::<bool>().ok())
        .unwrap_or(false)
}

/// Locate the first element matching any of `selectors`, in list order.
pub async fn find_first_element(
    page: &Page,
    selectors: &[&'static str],
) -> Option<chromiumoxide::element::Element> {
    for sel in selectors {
        if let Ok(el) = page.find_element(*sel).await {
            debug!("browser: input selector matched: {}", sel);
            return Some(el);
        }
    }
    None
}

/// Human-like pacing delay with a randomized duration.
pub async fn human_delay(min_ms: u64, max_ms: u64) {
    use rand::prelude::*;
    let ms = {
        let mut rng = rand::rng();
        rng.random_range(min_ms..=max_ms)
    };
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
