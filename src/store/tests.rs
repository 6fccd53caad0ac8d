//! Unit tests for the completion store.

use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::status::Status;
use crate::test_support::{LocalShellRunner, test_transport_config};
use crate::transport::SshTransport;

struct Harness {
    transport: SshTransport<LocalShellRunner>,
    state_dir: String,
    _dir: TempDir,
}

impl Harness {
    fn store(&self) -> CompletionStore<'_, SshTransport<LocalShellRunner>> {
        CompletionStore::new(&self.transport, self.state_dir.clone())
    }
}

#[fixture]
fn harness() -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let state_dir = format!("{}/.dropship_config", dir.path().display());
    let transport =
        SshTransport::connect(test_transport_config(), LocalShellRunner::new(), "localhost")
            .expect("local transport");
    Harness {
        transport,
        state_dir,
        _dir: dir,
    }
}

fn record(text: &str, stdout: &str) -> CompletionRecord {
    CompletionRecord {
        resolved_text: text.to_owned(),
        status: Status::Done,
        exit_code: 0,
        stdout: stdout.to_owned(),
        stderr: String::new(),
    }
}

#[rstest]
fn fingerprint_is_sha256_hex() {
    assert_eq!(
        fingerprint("hello world").as_str(),
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
    assert_eq!(fingerprint("a"), fingerprint("a"));
    assert_ne!(fingerprint("a"), fingerprint("a "));
}

#[rstest]
fn record_path_joins_key_and_type(harness: Harness) {
    let store = CompletionStore::new(&harness.transport, "/srv/state/");

    assert_eq!(store.record_path("Database", "db"), "/srv/state/db.Database");
    assert_eq!(harness.store().state_dir(), harness.state_dir);
}

#[rstest]
fn load_of_missing_record_is_absent(harness: Harness) {
    let store = harness.store();

    let loaded: Option<CompletionRecord> = store.load(COMMAND_RECORD_TYPE, "abc").expect("load");

    assert_eq!(loaded, None);
}

#[rstest]
fn save_then_load_returns_record(harness: Harness) {
    let store = harness.store();
    let key = fingerprint("echo hi");
    let saved = record("echo hi", "hi\n");

    store
        .save(COMMAND_RECORD_TYPE, key.as_str(), &saved)
        .expect("save");
    let loaded: Option<CompletionRecord> =
        store.load(COMMAND_RECORD_TYPE, key.as_str()).expect("load");

    assert_eq!(loaded, Some(saved));
}

#[rstest]
fn save_overwrites_existing_record(harness: Harness) {
    let store = harness.store();
    store
        .save(COMMAND_RECORD_TYPE, "k", &record("first", "1"))
        .expect("first save");
    store
        .save(COMMAND_RECORD_TYPE, "k", &record("second", "2"))
        .expect("second save");

    let loaded: Option<CompletionRecord> = store.load(COMMAND_RECORD_TYPE, "k").expect("load");

    assert_eq!(loaded.map(|r| r.resolved_text), Some(String::from("second")));
}

#[rstest]
#[case("echo hi", true)]
#[case("echo bye", false)]
fn load_checked_requires_matching_fields(
    harness: Harness,
    #[case] current_text: &str,
    #[case] expect_hit: bool,
) {
    let store = harness.store();
    store
        .save(COMMAND_RECORD_TYPE, "k", &record("echo hi", "hi\n"))
        .expect("save");

    let loaded: Option<CompletionRecord> = store
        .load_checked(
            COMMAND_RECORD_TYPE,
            "k",
            &[("resolved_text", json!(current_text))],
        )
        .expect("load");

    assert_eq!(loaded.is_some(), expect_hit);
}

#[rstest]
fn list_returns_sorted_keys_for_one_type(harness: Harness) {
    let store = harness.store();
    for key in ["beta", "alpha"] {
        store
            .save("Database", key, &json!({"name": key}))
            .expect("save database");
    }
    store
        .save("RedisCache", "redis", &json!({"name": "redis"}))
        .expect("save cache");

    assert_eq!(
        store.list("Database").expect("list"),
        vec![String::from("alpha"), String::from("beta")]
    );
    assert_eq!(store.list("WebApp").expect("list"), Vec::<String>::new());
}

#[rstest]
fn list_without_state_directory_is_empty(harness: Harness) {
    assert!(harness.store().list("Database").expect("list").is_empty());
}

#[rstest]
fn malformed_record_is_an_error(harness: Harness) {
    let store = harness.store();
    let channel = harness.transport.file_channel();
    channel.mkdir(&harness.state_dir).expect("mkdir");
    channel
        .write(&store.record_path(COMMAND_RECORD_TYPE, "bad"), "not json")
        .expect("write");

    let err = store
        .load::<CompletionRecord>(COMMAND_RECORD_TYPE, "bad")
        .expect_err("malformed");

    assert!(matches!(err, StoreError::Malformed { .. }), "got {err:?}");
}

#[rstest]
#[case("../etc")]
#[case("a b")]
#[case("")]
fn invalid_names_are_rejected(harness: Harness, #[case] key: &str) {
    let err = harness
        .store()
        .save("Database", key, &json!({}))
        .expect_err("invalid key");

    assert!(matches!(err, StoreError::InvalidName { .. }), "got {err:?}");
}
