//! Integration tests for basic CLI behavior.
//!
//! Nothing here touches the network: every command either only parses
//! arguments, reads config, or works on a saved session.

#![allow(deprecated)] // cargo_bin deprecation — replacement not yet stable

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

/// Helper: get a Command for the `kinocrawl` binary.
fn kinocrawl() -> Command {
    Command::cargo_bin("kinocrawl").expect("binary 'kinocrawl' should be built")
}

fn config_file(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(text.as_bytes()).expect("write config");
    file
}

const SMALL_CONFIG: &str = r#"
page_size = 2
default_providers = ["gidonline"]

[providers.gidonline]
base_url = "https://gid.test/"
search_url = "https://gid.test/"
embed_url = "https://player.test"
"#;

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_lists_subcommands() {
    kinocrawl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: kinocrawl"))
        .stdout(predicate::str::contains("providers"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("more"))
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("resolve"));
}

#[test]
fn version_flag_shows_semver() {
    kinocrawl()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^kinocrawl \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn missing_subcommand_fails() {
    kinocrawl()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn search_help_mentions_providers_flag() {
    kinocrawl()
        .args(["search", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--providers"))
        .stdout(predicate::str::contains("--page"));
}

// ─── Config ──────────────────────────────────────────────────────────────────

#[test]
fn providers_lists_configured_sites_and_extractors() {
    let config = config_file(SMALL_CONFIG);
    kinocrawl()
        .arg("--config")
        .arg(config.path())
        .arg("providers")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"gidonline\""))
        .stdout(predicate::str::contains("\"voidboost\""))
        .stdout(predicate::str::contains("\"ashdi\""))
        .stdout(predicate::str::contains("\"page_size\": 2"));
}

#[test]
fn invalid_config_is_reported() {
    let config = config_file("page_size = 0\n");
    kinocrawl()
        .arg("--config")
        .arg(config.path())
        .arg("providers")
        .assert()
        .failure()
        .stderr(predicate::str::contains("page_size must be positive"));
}

#[test]
fn unreadable_config_is_reported() {
    kinocrawl()
        .args(["--config", "/nonexistent/kinocrawl.toml", "providers"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

// ─── Offline commands ────────────────────────────────────────────────────────

#[test]
fn resolve_with_unknown_extractor_fails() {
    let config = config_file(SMALL_CONFIG);
    kinocrawl()
        .arg("--config")
        .arg(config.path())
        .args(["resolve", "nope", "token", "--param", "type=movie"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope"));
}

#[test]
fn malformed_param_is_rejected() {
    kinocrawl()
        .args(["resolve", "voidboost", "token", "--param", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected key=value"));
}

#[test]
fn more_advances_a_saved_session() {
    let config = config_file(SMALL_CONFIG);
    let results: Vec<serde_json::Value> = (0..3)
        .map(|i| {
            serde_json::json!({
                "id": format!("film-{i}"),
                "name": format!("Film {i}"),
                "image": "",
                "provider": "gidonline",
            })
        })
        .collect();
    let session = serde_json::json!({
        "id": "6f1c7c52-3e8e-4c57-9a59-1b2a3c4d5e6f",
        "query": "film",
        "providerResults": [results],
        "page": 1,
    });
    let session_file = config_file(&session.to_string());

    kinocrawl()
        .arg("--config")
        .arg(config.path())
        .arg("more")
        .arg(session_file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("film-2"))
        .stdout(predicate::str::contains("\"hasMore\": false"));

    let saved = std::fs::read_to_string(session_file.path()).unwrap();
    assert!(saved.contains("\"page\":2"));

    kinocrawl()
        .arg("--config")
        .arg(config.path())
        .arg("more")
        .arg(session_file.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("No more results"));
}
