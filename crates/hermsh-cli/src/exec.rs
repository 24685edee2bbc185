//! Command execution on behalf of the user.
//!
//! Three modes: with the real terminal (interactive programs and the
//! degraded path), and captured into a temp file for the failure-context
//! flow. Execution is always delegated to the system shell — hermsh is not
//! a POSIX shell.

use std::io;
use std::process::Command;

use tempfile::NamedTempFile;
use tracing::debug;

/// Run a line with the shell, inheriting the terminal. Used for
/// interactive programs: the child owns the terminal until it exits.
pub fn run_tty(line: &str) -> io::Result<i32> {
    debug!(line, "running with terminal");
    let status = Command::new("bash").arg("-c").arg(line).status()?;
    Ok(status.code().unwrap_or(-1))
}

/// Run a line directly, inheriting the terminal. Semantically the degraded
/// path when the probe cannot answer; identical plumbing to [`run_tty`].
pub fn run_direct(line: &str) -> io::Result<i32> {
    debug!(line, "running directly (degraded path)");
    let status = Command::new("bash").arg("-c").arg(line).status()?;
    Ok(status.code().unwrap_or(-1))
}

/// Write a failing command's captured streams into a temp file for the
/// failure-context query. The file lives as long as the returned handle —
/// the caller keeps it until the backend has answered.
pub fn write_capture(stdout: &str, stderr: &str) -> io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("hermsh-out-")
        .tempfile()?;
    use std::io::Write;
    file.write_all(stdout.as_bytes())?;
    file.write_all(stderr.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_capture_holds_both_streams() {
        let file = write_capture("out line\n", "err line\n").unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("out line"));
        assert!(content.contains("err line"));
        // Temp paths must be colon-free: the wire format splits on ':'.
        assert!(!file.path().display().to_string().contains(':'));
    }

    #[test]
    fn test_run_tty_exit_code() {
        assert_eq!(run_tty("exit 7").unwrap(), 7);
    }

    #[test]
    fn test_run_direct_success() {
        assert_eq!(run_direct("true").unwrap(), 0);
    }
}
