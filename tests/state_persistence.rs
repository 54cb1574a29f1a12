/// Integration tests for the durable identity/session state layer —
/// exercised through the public library surface, no browser required.
use serp_phantom::config::fingerprint_path;
use serp_phantom::fingerprint::{self, StoredIdentity};
use serp_phantom::session_store;
use serde_json::json;

fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

#[test]
fn identity_is_reused_verbatim_across_runs() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("state.json");
    let fp_path = fingerprint_path(&state_file);

    // First run: nothing stored, identity is generated and persisted.
    assert!(fingerprint::load_identity(&fp_path).is_none());
    let identity = StoredIdentity {
        fingerprint: fingerprint::generate(Some("en-US")),
        google_domain: "www.google.com".to_string(),
    };
    fingerprint::save_identity(&fp_path, &identity).unwrap();

    // Two later runs must observe byte-identical locale/timezone/appearance.
    let second = fingerprint::load_identity(&fp_path).expect("second run loads identity");
    let third = fingerprint::load_identity(&fp_path).expect("third run loads identity");
    assert_eq!(second, identity);
    assert_eq!(third, identity);
    assert_eq!(second.fingerprint.locale, third.fingerprint.locale);
    assert_eq!(second.fingerprint.timezone_id, third.fingerprint.timezone_id);
    assert_eq!(second.google_domain, third.google_domain);
}

#[test]
fn identity_file_lives_next_to_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("profiles").join("state.json");
    let fp_path = fingerprint_path(&state_file);
    assert_eq!(fp_path.file_name().unwrap(), "state-fingerprint.json");
    assert_eq!(fp_path.parent(), state_file.parent());
}

#[test]
fn session_blob_round_trips_unchanged() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("state.json");

    let blob = vec![
        json!({
            "name": "NID",
            "value": "511=abcdef",
            "domain": ".google.com",
            "path": "/",
            "expires": 1_790_000_000.0,
            "httpOnly": true,
            "secure": true
        }),
        json!({
            "name": "AEC",
            "value": "AVYB7co",
            "domain": ".google.com",
            "path": "/",
            "expires": -1.0
        }),
    ];

    session_store::save(&state_file, &blob).unwrap();
    let loaded = session_store::load(&state_file).expect("saved session loads");
    // The blob is opaque: it must come back exactly as it went in.
    assert_eq!(loaded, blob);
}

#[test]
fn corrupt_state_degrades_to_fresh_session() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("state.json");
    let fp_path = fingerprint_path(&state_file);

    std::fs::write(&state_file, "{{{{ not json").unwrap();
    std::fs::write(&fp_path, "also not json").unwrap();

    // Neither corruption aborts; both read as absent.
    assert!(session_store::load(&state_file).is_none());
    assert!(fingerprint::load_identity(&fp_path).is_none());
}

#[test]
fn save_creates_intermediate_directories() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("a").join("b").join("state.json");

    session_store::save(&state_file, &[json!({"name": "x", "value": "y"})]).unwrap();
    assert!(session_store::exists(&state_file));

    let identity = StoredIdentity {
        fingerprint: fingerprint::generate(None),
        google_domain: "www.google.ca".to_string(),
    };
    let fp_path = fingerprint_path(&state_file);
    fingerprint::save_identity(&fp_path, &identity).unwrap();
    assert_eq!(fingerprint::load_identity(&fp_path), Some(identity));
}
