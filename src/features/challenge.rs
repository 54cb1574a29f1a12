//! Challenge-page classification.
//!
//! Classifies a URL as a human-verification interstitial by scanning for a
//! fixed set of substring markers: the provider's verification path, CAPTCHA
//! endpoints, and the "unusual traffic" redirect. Pure functions over URL
//! strings; the pipeline consults them at three checkpoints (post-navigation,
//! post-submit, and while waiting for result containers).

use aho_corasick::AhoCorasick;
use chromiumoxide::Page;
use std::sync::OnceLock;

/// Substring markers identifying challenge interstitials.
const CHALLENGE_MARKERS: &[&str] = &[
    "google.com/sorry",
    "/sorry/index",
    "recaptcha",
    "captcha",
    "unusual_traffic",
    "unusualtraffic",
];

static CHALLENGE_MATCHER: OnceLock<AhoCorasick> = OnceLock::new();

fn challenge_matcher() -> &'static AhoCorasick {
    CHALLENGE_MATCHER.get_or_init(|| {
        AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(CHALLENGE_MARKERS)
            .expect("valid challenge markers")
    })
}

/// Whether a single URL carries a challenge marker.
pub fn is_challenge_url(url: &str) -> bool {
    !url.is_empty() && challenge_matcher().is_match(url)
}

/// Whether either the current page URL or the response URL carries a
/// challenge marker.
pub fn is_challenge(current_url: &str, response_url: &str) -> bool {
    is_challenge_url(current_url) || is_challenge_url(response_url)
}

/// The page's live location, after any client-side redirects.
pub async fn current_url(page: &Page) -> String {
    page.evaluate("location.href")
        .await
        .ok()
        .and_then(|v| v.into_value::<String>().ok())
        .unwrap_or_default()
}

/// Whether the page currently sits on a challenge interstitial.
pub async fn page_is_challenged(page: &Page) -> bool {
    let live = current_url(page).await;
    let reported = page
        .url()
        .await
        .ok()
        .flatten()
        .map(|u| u.to_string())
        .unwrap_or_default();
    is_challenge(&live, &reported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorry_path_is_a_challenge() {
        assert!(is_challenge_url(
            "https://www.google.com/sorry/index?continue=https://www.google.com/search"
        ));
        assert!(is_challenge_url("https://www.google.com/sorry"));
    }

    #[test]
    fn captcha_markers_are_challenges() {
        assert!(is_challenge_url("https://www.google.com/recaptcha/api2/anchor"));
        assert!(is_challenge_url("https://example.com/captcha?id=1"));
        assert!(is_challenge_url("https://www.google.com/search?q=x#unusual_traffic"));
    }

    #[test]
    fn ordinary_urls_are_clear() {
        assert!(!is_challenge_url("https://www.google.com/search?q=rust"));
        assert!(!is_challenge_url("https://www.google.com/"));
        assert!(!is_challenge_url(""));
    }

    #[test]
    fn either_url_triggers_classification() {
        assert!(is_challenge(
            "https://www.google.com/search?q=x",
            "https://www.google.com/sorry/index"
        ));
        assert!(is_challenge("https://www.google.com/sorry/index", ""));
        assert!(!is_challenge(
            "https://www.google.com/search?q=x",
            "https://www.google.com/search?q=x"
        ));
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert!(is_challenge_url("https://www.google.com/ReCaptcha/check"));
    }
}
