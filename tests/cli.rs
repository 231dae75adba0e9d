use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tubeflac(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tubeflac").unwrap();
    cmd.arg("--config")
        .arg(config_dir.path().join("config.yaml"))
        .env_remove("TUBEFLAC_CONFIG")
        .env("RUST_LOG", "tubeflac=warn");
    cmd
}

#[test]
fn download_rejects_unsupported_url() {
    let dir = TempDir::new().unwrap();

    tubeflac(&dir)
        .args(["download", "https://not-the-site.example/x", "--quiet", "--output-dir"])
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported URL: https://not-the-site.example/x"));
}

#[test]
fn playlist_url_needs_confirmation_without_terminal() {
    let dir = TempDir::new().unwrap();

    tubeflac(&dir)
        .args(["download", "https://www.youtube.com/watch?list=PL123&v=abc", "--quiet"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("use --yes to skip it"));
}

#[test]
fn first_run_writes_default_config() {
    let dir = TempDir::new().unwrap();

    tubeflac(&dir)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Credential Source: chrome"))
        .stdout(predicate::str::contains("Fallback Credential Source: safari"));

    let written = std::fs::read_to_string(dir.path().join("config.yaml")).unwrap();
    assert!(written.contains("audio_format: flac"));
}

#[test]
fn sites_lists_configured_hosts() {
    let dir = TempDir::new().unwrap();

    tubeflac(&dir)
        .arg("sites")
        .assert()
        .success()
        .stdout(predicate::str::contains("youtube.com"))
        .stdout(predicate::str::contains("youtu.be"));
}

#[test]
fn malformed_config_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.yaml"), "sites: 42").unwrap();

    tubeflac(&dir)
        .arg("sites")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}
