//! CLI integration tests for the Quire command-line interface.
//!
//! These run offline: they cover argument parsing, config loading and the
//! commands that never touch the network.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

static RUN: AtomicUsize = AtomicUsize::new(0);

/// Get a command for the quire binary, isolated from the user's config dir
/// and from every other test run.
fn quire() -> Command {
    let run = RUN.fetch_add(1, Ordering::SeqCst);
    let config_dir =
        std::env::temp_dir().join(format!("quire-cli-tests-{}-{}", std::process::id(), run));
    let mut cmd = Command::cargo_bin("quire").unwrap();
    cmd.env("QUIRE_CONFIG_DIR", config_dir);
    cmd.env_remove("QUIRE_CONFIG");
    cmd.env_remove("QUIRE_COOKIE_FILE");
    cmd
}

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    quire()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("background-fetch"))
        .stdout(predicate::str::contains("clear-cookies"));
}

#[test]
fn test_version_displays() {
    quire()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("quire"));
}

#[test]
fn test_background_fetch_requires_urls() {
    quire().arg("background-fetch").assert().failure();
}

#[test]
fn test_background_fetch_rejects_bad_url() {
    quire()
        .args(["background-fetch", "not a url"])
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_status_with_defaults() {
    quire()
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"authenticated\": false"))
        .stdout(predicate::str::contains("\"max_concurrent_requests\": 16"))
        .stdout(predicate::str::contains("wikipedia.org"));
}

#[test]
fn test_status_reads_config_file() {
    let file = config_file(
        r#"
[site]
default_domain = "wikivoyage.org"

[network]
max_concurrent_requests = 4
"#,
    );

    quire()
        .arg("--config")
        .arg(file.path())
        .args(["status", "--json", "--detailed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wikivoyage.org"))
        .stdout(predicate::str::contains("\"max_concurrent_requests\": 4"))
        .stdout(predicate::str::contains("wikidata.org"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let file = config_file("[network]\nmax_concurrent_requests = 0\n");
    quire()
        .arg("--config")
        .arg(file.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}

#[test]
fn test_missing_explicit_config_is_rejected() {
    quire()
        .args(["--config", "/nonexistent/quire.toml", "status"])
        .assert()
        .failure();
}

#[test]
fn test_clear_cookies() {
    quire()
        .args(["clear-cookies", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"removed\":0"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Cookie Persistence Tests
// ─────────────────────────────────────────────────────────────────────────────

const LOGIN_COOKIES: &str = r#"[
  {"name":"centralauth_User","value":"Reader","domain":"wikipedia.org","path":"/",
   "expires":null,"secure":true,"http_only":true,"host_only":false},
  {"name":"centralauth_Token","value":"secret","domain":"wikipedia.org","path":"/",
   "expires":null,"secure":true,"http_only":true,"host_only":false}
]"#;

#[test]
fn test_status_reports_persisted_login() {
    let dir = tempfile::tempdir().unwrap();
    let cookies = dir.path().join("cookies.json");
    std::fs::write(&cookies, LOGIN_COOKIES).unwrap();

    quire()
        .arg("--cookie-file")
        .arg(&cookies)
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"authenticated\": true"))
        .stdout(predicate::str::contains("\"cookies\": 2"));
}

#[test]
fn test_clear_cookies_persists_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let cookies = dir.path().join("cookies.json");
    std::fs::write(&cookies, LOGIN_COOKIES).unwrap();

    quire()
        .arg("--cookie-file")
        .arg(&cookies)
        .args(["clear-cookies", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"removed\":2"));

    quire()
        .arg("--cookie-file")
        .arg(&cookies)
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"authenticated\": false"))
        .stdout(predicate::str::contains("\"cookies\": 0"));
}

#[test]
fn test_default_cookie_file_lives_in_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("cookies.json"), LOGIN_COOKIES).unwrap();

    Command::cargo_bin("quire")
        .unwrap()
        .env("QUIRE_CONFIG_DIR", dir.path())
        .env_remove("QUIRE_CONFIG")
        .env_remove("QUIRE_COOKIE_FILE")
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"authenticated\": true"));
}
