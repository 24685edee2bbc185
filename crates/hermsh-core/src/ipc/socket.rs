//! Socket binding with stale-file cleanup and unlink-on-shutdown.

use std::path::{Path, PathBuf};

use tokio::net::UnixListener;
use tracing::info;

/// Removes the socket file when dropped, so a clean shutdown leaves no
/// stale rendezvous behind.
#[derive(Debug)]
pub struct SocketGuard {
    path: PathBuf,
}

impl SocketGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Bind a Unix listener at `path`.
///
/// Removes any stale socket file and creates the parent directory first.
pub fn bind_socket(path: &Path) -> std::io::Result<(UnixListener, SocketGuard)> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(path)?;
    info!(path = %path.display(), "listening");
    Ok((
        listener,
        SocketGuard {
            path: path.to_path_buf(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_creates_parent_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("test.sock");

        {
            let (_listener, _guard) = bind_socket(&path).unwrap();
            assert!(path.exists());
        }
        // Guard dropped — socket removed
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");

        let (listener, guard) = bind_socket(&path).unwrap();
        drop(listener);
        drop(guard);

        // A stale file left behind by a crash must not prevent rebinding.
        std::fs::write(&path, b"").unwrap();
        let (_listener, _guard) = bind_socket(&path).unwrap();
        assert!(path.exists());
    }
}
