//! CLI smoke tests: verify basic binary behavior.

use std::io::Write;
use std::process::{Command, Stdio};

fn cli_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_elchymin"))
}

#[test]
fn test_help_flag() {
    let output = cli_bin().arg("--help").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"), "Expected usage info in --help output");
    assert!(stdout.contains("--json-logs"));
}

#[test]
fn test_version_flag() {
    let output = cli_bin().arg("--version").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("elchymin_cli"), "Expected crate name in --version output");
}

#[test]
fn test_session_persists_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = cli_bin()
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("--state-dir")
        .arg(dir.path())
        .env("ELCHYMIN_BASE_INTERVAL_SECS", "3600")
        .env("ELCHYMIN_MIN_INTERVAL_SECS", "3600")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to run");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"hello, I missed you\n/status\nquit\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Elchymin:"), "{}", stdout);
    assert!(stdout.contains("\"memory_count\": 1"), "{}", stdout);
    assert!(dir.path().join("elchymin_soul.json").exists());
}
