use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_flags() {
    cargo_bin_cmd!("mandi")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("base-url"))
        .stdout(predicate::str::contains("session-id"))
        .stdout(predicate::str::contains("device-id"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("mandi")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mandi"));
}

#[test]
fn test_rejects_invalid_base_url() {
    cargo_bin_cmd!("mandi")
        .args(["--base-url", "not a url", "hello"])
        .env("MANDI_HOME", env!("CARGO_TARGET_TMPDIR"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("base-url"));
}
