//! CLI integration tests for the Portcullis command-line interface.
//!
//! These tests never start a gateway: they cover help output, argument
//! parsing and the `check` command.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const VALID_CONFIG: &str = r#"
listen = "127.0.0.1:3000"
client_id = "gateway"
client_secret = "secret"
authorization_endpoint = "http://127.0.0.1:8081/realms/main/protocol/openid-connect/auth"
token_endpoint = "http://127.0.0.1:8081/realms/main/protocol/openid-connect/token"
encryption_key = "AgXa7xRcoClDEU0ZDSH4X0XhL5Qy2Z2j"

[[resources]]
uri = "/admin"
roles = ["admin"]

[[resources]]
uri = "/public"
white_listed = true
"#;

/// Get a command for the portcullis binary.
fn portcullis() -> Command {
    let mut cmd = Command::cargo_bin("portcullis").unwrap();
    cmd.env_remove("PORTCULLIS_CONFIG")
        .env_remove("PORTCULLIS_CLIENT_SECRET")
        .env_remove("PORTCULLIS_ENCRYPTION_KEY");
    cmd
}

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("portcullis.toml");
    fs::write(&path, contents).unwrap();
    path
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    portcullis()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("OIDC authenticating reverse proxy"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_version_displays() {
    portcullis()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("portcullis"));
}

#[test]
fn test_serve_help_lists_overrides() {
    portcullis()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--listen"))
        .stdout(predicate::str::contains("--upstream"));
}

#[test]
fn test_invalid_listen_rejected() {
    portcullis()
        .args(["serve", "--listen", "not-an-address"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_unknown_subcommand_rejected() {
    portcullis().arg("frobnicate").assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Check Command Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_check_valid_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, VALID_CONFIG);

    portcullis()
        .arg("--config")
        .arg(&path)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"))
        .stdout(predicate::str::contains("resources:  2"));
}

#[test]
fn test_check_verbose_lists_resources() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, VALID_CONFIG);

    portcullis()
        .arg("--config")
        .arg(&path)
        .args(["--verbose", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/admin (roles admin)"))
        .stdout(predicate::str::contains("/public (white-listed)"));
}

#[test]
fn test_check_config_from_env() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, VALID_CONFIG);

    portcullis()
        .env("PORTCULLIS_CONFIG", &path)
        .arg("check")
        .assert()
        .success();
}

#[test]
fn test_check_print_masks_secrets() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, VALID_CONFIG);

    portcullis()
        .arg("--config")
        .arg(&path)
        .args(["check", "--print"])
        .assert()
        .success()
        .stdout(predicate::str::contains("client_id = \"gateway\""))
        .stdout(predicate::str::contains("AgXa7xRcoClDEU0ZDSH4X0XhL5Qy2Z2j").not())
        .stdout(predicate::str::contains("secret\"").not());
}

#[test]
fn test_check_missing_file() {
    let dir = TempDir::new().unwrap();

    portcullis()
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn test_check_bad_encryption_key() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        &VALID_CONFIG.replace("AgXa7xRcoClDEU0ZDSH4X0XhL5Qy2Z2j", "too-short"),
    );

    portcullis()
        .arg("--config")
        .arg(&path)
        .arg("check")
        .assert()
        .failure();
}

#[test]
fn test_check_env_overrides_encryption_key() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        &VALID_CONFIG.replace("AgXa7xRcoClDEU0ZDSH4X0XhL5Qy2Z2j", "too-short"),
    );

    portcullis()
        .env("PORTCULLIS_ENCRYPTION_KEY", "0123456789abcdef0123456789abcdef")
        .arg("--config")
        .arg(&path)
        .arg("check")
        .assert()
        .success();
}
