//! Rolling diagnostic counters.
//!
//! The middleware is stateless per request; these counters exist only for
//! diagnostics and the front end's prompt glyph. They are summarized into
//! the security status file after every request.

use std::path::Path;

/// Per-process relay counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub requests: u64,
    pub blocked_commands: u64,
    pub blocked_replies: u64,
    pub upstream_failures: u64,
}

impl Stats {
    pub fn blocked_total(&self) -> u64 {
        self.blocked_commands + self.blocked_replies
    }

    /// One-line summary for the status file.
    pub fn summary(&self) -> String {
        format!(
            "requests={} blocked={} upstream_failures={}",
            self.requests,
            self.blocked_total(),
            self.upstream_failures
        )
    }

    /// Best-effort write of the summary; display only, never load-bearing.
    pub fn write_status(&self, path: &Path) {
        let _ = std::fs::write(path, self.summary());
    }
}
