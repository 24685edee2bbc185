//! Append-only audit log of policy decisions.
//!
//! Every block the middleware issues is recorded with a timestamp, the
//! direction it was caught in, the reason, and a sanitized excerpt of the
//! offending input. The log is diagnostic: writes are best-effort and
//! never gate the relay path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

/// Longest input excerpt kept in a log line.
const EXCERPT_MAX: usize = 120;

/// Which side of the proxy a block happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Front end → backend (command policy).
    Request,
    /// Backend → front end (response policy).
    Reply,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::Request => "request",
            Direction::Reply => "reply",
        }
    }
}

/// Handle on the append-only audit file.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one block. Failures to write are logged and swallowed.
    pub fn record_block(&self, direction: Direction, reason: &str, input: &str) {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let line = format!(
            "{ts} {} blocked={reason} input={}\n",
            direction.as_str(),
            excerpt(input)
        );
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "audit write failed");
        }
    }
}

/// Single-line, bounded excerpt of arbitrary input.
fn excerpt(input: &str) -> String {
    let flat: String = input
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(EXCERPT_MAX)
        .collect();
    flat
}
