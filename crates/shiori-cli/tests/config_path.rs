use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn test_config_path_command() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("shiori")
        .env("SHIORI_HOME", dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_creates_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");

    assert!(!config_path.exists());

    cargo_bin_cmd!("shiori")
        .env("SHIORI_HOME", dir.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config at"));

    let contents = fs::read_to_string(&config_path).unwrap();
    assert!(contents.contains("api_base_url ="));
    assert!(contents.contains("[session]"));
}

#[test]
fn test_config_init_fails_if_exists() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("config.toml"), "# existing config").unwrap();

    cargo_bin_cmd!("shiori")
        .env("SHIORI_HOME", dir.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_set_base_url_updates_file() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("shiori")
        .env("SHIORI_HOME", dir.path())
        .args(["config", "set-base-url", "https://api.shiori.example/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://api.shiori.example"));

    let contents = fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(contents.contains("api_base_url = \"https://api.shiori.example\""));
}

#[test]
fn test_config_set_base_url_rejects_invalid() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("shiori")
        .env("SHIORI_HOME", dir.path())
        .args(["config", "set-base-url", "not a url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid API base URL"));
}
