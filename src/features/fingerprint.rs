//! Persistent browser-identity ("fingerprint") management.
//!
//! An identity is generated once from host signals and then reused verbatim
//! on every later run against the same storage key — an identity that shifts
//! between requests is itself a detection signal. The stored file also pins
//! the regional search domain chosen on the first run.
//!
//! Corrupt or unreadable identity files are logged and discarded; generation
//! then proceeds as if nothing was stored. Never fatal.

use chrono::{Local, Timelike};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// The canonical device profile presented regardless of host platform.
/// A platform-specific profile is computed for logging only and then
/// overridden, so every run on every machine presents the same device.
pub const DEVICE_PROFILE: &str = "Desktop Chrome";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorScheme {
    #[serde(rename = "dark")]
    Dark,
    #[serde(rename = "light")]
    Light,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReducedMotion {
    #[serde(rename = "reduce")]
    Reduce,
    #[serde(rename = "no-preference")]
    NoPreference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForcedColors {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "none")]
    None,
}

impl ColorScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorScheme::Dark => "dark",
            ColorScheme::Light => "light",
        }
    }
}

impl ReducedMotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReducedMotion::Reduce => "reduce",
            ReducedMotion::NoPreference => "no-preference",
        }
    }
}

impl ForcedColors {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForcedColors::Active => "active",
            ForcedColors::None => "none",
        }
    }
}

/// The identity profile presented to the target site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub device_profile_name: String,
    pub locale: String,
    pub timezone_id: String,
    pub color_scheme: ColorScheme,
    pub reduced_motion: ReducedMotion,
    pub forced_colors: ForcedColors,
}

/// On-disk identity file: the fingerprint plus the pinned regional domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredIdentity {
    pub fingerprint: Fingerprint,
    pub google_domain: String,
}

// ── Generation ───────────────────────────────────────────────────────────────

/// UTC-offset-minute ranges → IANA timezone, ordered west to east.
/// Ranges are half-open `[start, end)` and mutually exclusive by
/// construction; the first matching range wins.
const TIMEZONE_BY_OFFSET: &[(i32, i32, &str)] = &[
    (-720, -570, "Pacific/Honolulu"),
    (-570, -480, "America/Anchorage"),
    (-480, -420, "America/Los_Angeles"),
    (-420, -360, "America/Denver"),
    (-360, -300, "America/Chicago"),
    (-300, -240, "America/New_York"),
    (-240, -180, "America/Halifax"),
    (-180, -120, "America/Sao_Paulo"),
    (-120, 0, "Atlantic/Azores"),
    (0, 60, "Europe/London"),
    (60, 120, "Europe/Berlin"),
    (120, 180, "Europe/Athens"),
    (180, 240, "Europe/Moscow"),
    (240, 300, "Asia/Dubai"),
    (300, 330, "Asia/Karachi"),
    (330, 390, "Asia/Kolkata"),
    (390, 480, "Asia/Bangkok"),
    (480, 540, "Asia/Shanghai"),
    (540, 600, "Asia/Tokyo"),
    (600, 660, "Australia/Sydney"),
    (660, 780, "Pacific/Auckland"),
];

/// Map a host UTC offset (minutes east of UTC) to a plausible timezone id.
pub fn timezone_for_offset(offset_minutes: i32) -> &'static str {
    for (start, end, tz) in TIMEZONE_BY_OFFSET {
        if offset_minutes >= *start && offset_minutes < *end {
            return tz;
        }
    }
    "America/New_York"
}

/// Infer a color-scheme preference from the local wall-clock hour:
/// evening and night hours ([19,24) ∪ [0,7)) read dark, daytime reads light.
pub fn color_scheme_for_hour(hour: u32) -> ColorScheme {
    if hour >= 19 || hour < 7 {
        ColorScheme::Dark
    } else {
        ColorScheme::Light
    }
}

/// System-level locale signal, normalized to BCP 47 (`en_US.UTF-8` → `en-US`).
fn host_locale() -> Option<String> {
    for key in ["LC_ALL", "LANG"] {
        if let Ok(raw) = std::env::var(key) {
            let raw = raw.trim();
            if raw.is_empty() || raw == "C" || raw == "POSIX" {
                continue;
            }
            let lang = raw.split('.').next().unwrap_or(raw).replace('_', "-");
            if !lang.is_empty() {
                return Some(lang);
            }
        }
    }
    None
}

/// Platform-specific profile name; computed for the log line only — the
/// canonical [`DEVICE_PROFILE`] is what gets used.
fn host_device_profile() -> &'static str {
    if cfg!(target_os = "macos") {
        "Desktop Chrome (macOS)"
    } else if cfg!(target_os = "windows") {
        "Desktop Chrome (Windows)"
    } else {
        "Desktop Chrome (Linux)"
    }
}

/// Derive a plausible identity profile from host signals.
///
/// Locale resolves hint → system locale → the hint's default; timezone comes
/// from the host UTC offset; appearance preferences default to the least
/// restrictive values except for the hour-inferred color scheme.
pub fn generate(locale_hint: Option<&str>) -> Fingerprint {
    let now = Local::now();
    let offset_minutes = now.offset().local_minus_utc() / 60;

    let locale = locale_hint
        .map(|s| s.to_string())
        .or_else(host_locale)
        .unwrap_or_else(|| crate::core::config::DEFAULT_LOCALE.to_string());

    debug!(
        "fingerprint: host profile {} (using {})",
        host_device_profile(),
        DEVICE_PROFILE
    );

    let fp = Fingerprint {
        device_profile_name: DEVICE_PROFILE.to_string(),
        locale,
        timezone_id: timezone_for_offset(offset_minutes).to_string(),
        color_scheme: color_scheme_for_hour(now.hour()),
        reduced_motion: ReducedMotion::NoPreference,
        forced_colors: ForcedColors::None,
    };
    info!(
        "fingerprint: generated identity (locale={}, tz={}, scheme={})",
        fp.locale,
        fp.timezone_id,
        fp.color_scheme.as_str()
    );
    fp
}

// ── Store ────────────────────────────────────────────────────────────────────

/// Load a stored identity. Absent file → `None`; corrupt file → warn + `None`
/// so the caller regenerates.
pub fn load_identity(path: &Path) -> Option<StoredIdentity> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("fingerprint: unreadable identity file {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<StoredIdentity>(&content) {
        Ok(identity) => {
            info!(
                "fingerprint: reusing stored identity (locale={}, tz={}, domain={})",
                identity.fingerprint.locale, identity.fingerprint.timezone_id, identity.google_domain
            );
            Some(identity)
        }
        Err(e) => {
            warn!(
                "fingerprint: corrupt identity file {} — discarding: {}",
                path.display(),
                e
            );
            None
        }
    }
}

/// Persist an identity, creating intermediate directories.
pub fn save_identity(path: &Path, identity: &StoredIdentity) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(identity)?;
    std::fs::write(path, json)?;
    debug!("fingerprint: identity saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn night_hours_prefer_dark() {
        assert_eq!(color_scheme_for_hour(2), ColorScheme::Dark);
        assert_eq!(color_scheme_for_hour(19), ColorScheme::Dark);
        assert_eq!(color_scheme_for_hour(23), ColorScheme::Dark);
        assert_eq!(color_scheme_for_hour(0), ColorScheme::Dark);
        assert_eq!(color_scheme_for_hour(6), ColorScheme::Dark);
    }

    #[test]
    fn day_hours_prefer_light() {
        assert_eq!(color_scheme_for_hour(7), ColorScheme::Light);
        assert_eq!(color_scheme_for_hour(14), ColorScheme::Light);
        assert_eq!(color_scheme_for_hour(18), ColorScheme::Light);
    }

    #[test]
    fn offset_ranges_are_contiguous_and_exclusive() {
        for pair in TIMEZONE_BY_OFFSET.windows(2) {
            assert!(pair[0].0 < pair[0].1, "range must be non-empty");
            assert_eq!(pair[0].1, pair[1].0, "ranges must tile without overlap");
        }
    }

    #[test]
    fn offset_lookup_first_match_wins() {
        assert_eq!(timezone_for_offset(-300), "America/New_York");
        assert_eq!(timezone_for_offset(-241), "America/New_York");
        assert_eq!(timezone_for_offset(0), "Europe/London");
        assert_eq!(timezone_for_offset(330), "Asia/Kolkata");
        assert_eq!(timezone_for_offset(540), "Asia/Tokyo");
        // Off-table offsets fall back rather than panic.
        assert_eq!(timezone_for_offset(900), "America/New_York");
    }

    #[test]
    fn generated_identity_uses_canonical_profile() {
        let fp = generate(Some("de-DE"));
        assert_eq!(fp.device_profile_name, DEVICE_PROFILE);
        assert_eq!(fp.locale, "de-DE");
        assert_eq!(fp.reduced_motion, ReducedMotion::NoPreference);
        assert_eq!(fp.forced_colors, ForcedColors::None);
    }

    #[test]
    fn identity_round_trips_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state-fingerprint.json");
        let identity = StoredIdentity {
            fingerprint: generate(Some("en-GB")),
            google_domain: "www.google.co.uk".to_string(),
        };
        save_identity(&path, &identity).unwrap();
        let loaded = load_identity(&path).expect("stored identity should load");
        assert_eq!(loaded, identity);
    }

    #[test]
    fn corrupt_identity_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state-fingerprint.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_identity(&path).is_none());
    }

    #[test]
    fn stored_identity_serializes_with_camel_case_keys() {
        let identity = StoredIdentity {
            fingerprint: generate(None),
            google_domain: "www.google.com".to_string(),
        };
        let json = serde_json::to_string(&identity).unwrap();
        assert!(json.contains("\"googleDomain\""));
        assert!(json.contains("\"deviceProfileName\""));
        assert!(json.contains("\"timezoneId\""));
    }
}
