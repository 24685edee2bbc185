//! Black-box checks of the hermsh binary surface.

use std::io::Write;
use std::process::{Command, Stdio};

#[test]
fn test_version_flag() {
    let out = Command::new(env!("CARGO_BIN_EXE_hermsh"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("hermsh"));
}

#[test]
fn test_help_mentions_control_commands() {
    let out = Command::new(env!("CARGO_BIN_EXE_hermsh"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(out.status.success());
    let help = String::from_utf8_lossy(&out.stdout);
    assert!(help.contains("hrmh"));
    assert!(help.contains("--config"));
}

/// Piped-stdin session: banner, `exit`, status 0. Children and sockets are
/// confined to a scratch HOME and runtime dir.
#[test]
fn test_exit_builtin_ends_session_cleanly() {
    let home = tempfile::tempdir().unwrap();
    let runtime = home.path().join("runtime");

    let mut child = Command::new(env!("CARGO_BIN_EXE_hermsh"))
        .env("HOME", home.path())
        .env("HERMSH_RUNTIME_DIR", &runtime)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(b"exit\n")
        .unwrap();
    let out = child.wait_with_output().unwrap();

    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("hermsh"));
    assert!(stdout.contains("goodbye"));
}
