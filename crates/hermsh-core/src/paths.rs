//! Per-user filesystem rendezvous.
//!
//! Every socket and status file lives under a single runtime directory,
//! `~/.hermsh/` by default. Each endpoint is created by its owning process
//! and removed on that process's clean shutdown. The `HERMSH_RUNTIME_DIR`
//! environment variable overrides the directory so tests and supervised
//! children can share an isolated location.

use std::io;
use std::path::{Path, PathBuf};

/// Environment variable overriding the runtime directory.
pub const RUNTIME_DIR_ENV: &str = "HERMSH_RUNTIME_DIR";

/// The set of rendezvous endpoints for one user session.
#[derive(Debug, Clone)]
pub struct Rendezvous {
    base: PathBuf,
}

impl Rendezvous {
    /// Resolve the runtime directory: `$HERMSH_RUNTIME_DIR` if set,
    /// otherwise `~/.hermsh`.
    pub fn resolve() -> io::Result<Self> {
        if let Ok(dir) = std::env::var(RUNTIME_DIR_ENV) {
            if !dir.is_empty() {
                return Ok(Self { base: PathBuf::from(dir) });
            }
        }
        let home = dirs::home_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "home directory not found"))?;
        Ok(Self {
            base: home.join(".hermsh"),
        })
    }

    /// Use an explicit base directory (tests).
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The runtime directory itself.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Create the runtime directory if it does not exist.
    pub fn ensure_dir(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.base)
    }

    /// The middleware's listening socket — what the front end believes is
    /// the backend.
    pub fn middleware_sock(&self) -> PathBuf {
        self.base.join("middleware.sock")
    }

    /// The real backend endpoint, dialed only by the middleware.
    pub fn backend_sock(&self) -> PathBuf {
        self.base.join("backend.sock")
    }

    /// The probe's listening socket.
    pub fn probe_sock(&self) -> PathBuf {
        self.base.join("probe.sock")
    }

    /// Security status file written by the middleware, read by the prompt
    /// renderer. Display only.
    pub fn sec_status(&self) -> PathBuf {
        self.base.join("sec-status")
    }

    /// Append-only audit log of middleware policy decisions.
    pub fn audit_log(&self) -> PathBuf {
        self.base.join("audit.log")
    }
}

/// The user-level configuration file, `~/.hermshrc`.
pub fn config_file() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".hermshrc"))
}

/// The command history file, `~/.hermsh_history`.
pub fn history_file() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".hermsh_history"))
}
