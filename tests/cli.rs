use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn repoqa() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_repoqa"));
    cmd.env_remove("REPOQA_CONFIG").env("RUST_LOG", "error");
    cmd
}

#[test]
fn help_lists_commands() {
    let output = repoqa().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["ingest", "ask", "verify"] {
        assert!(stdout.contains(command), "missing {command} in:\n{stdout}");
    }
}

#[test]
fn ask_without_question_is_a_usage_error() {
    let output = repoqa().arg("ask").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn invalid_config_fails_before_connecting() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[index]\nmax_lines = 10\noverlap_lines = 10\n").unwrap();

    let output = repoqa()
        .arg("--config")
        .arg(&config)
        .args(["ingest", "--root"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("overlap_lines"), "{stderr}");
}

#[test]
fn ingest_refuses_in_memory_records() {
    let dir = TempDir::new().unwrap();
    let output = repoqa()
        .env("REPOQA_SQLITE_PATH", ":memory:")
        .args(["ingest", "--root"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sqlite_path"), "{stderr}");
}

#[test]
fn malformed_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("broken.toml");
    fs::write(&config, "[index\n").unwrap();

    let output = repoqa()
        .arg("--config")
        .arg(&config)
        .arg("verify")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load config"));
}
