//! Smoke tests for option parsing and startup failure handling

use assert_cmd::Command;
use predicates::prelude::*;

fn dbweb() -> Command {
    let mut cmd = Command::cargo_bin("dbweb").unwrap();
    cmd.env_remove("DATABASE_URL")
        .env_remove("DBWEB_DATABASE_URL")
        .env_remove("DBWEB_SESSIONS")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_session_flags() {
    dbweb()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--sessions"))
        .stdout(predicate::str::contains("--idle-timeout"))
        .stdout(predicate::str::contains("--lock-session"))
        .stdout(predicate::str::contains("--open-retry"));
}

#[test]
fn test_version() {
    dbweb()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_explicit_url_refused_exits_non_zero() {
    dbweb()
        .args(["--url", "postgres://dbweb@127.0.0.1:1/dbweb", "--open-retry", "0"])
        .args(["--listen", "0"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to connect"));
}

#[test]
fn test_rejects_unknown_log_level() {
    dbweb()
        .args(["--log-level", "loud"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--log-level"));
}
