//! Isolated runtime directories for socket tests.
//!
//! Unix socket paths have a hard length limit, so fixtures keep them short
//! and unique per test process.

use std::path::PathBuf;

use tempfile::TempDir;

/// A temporary runtime directory holding test sockets; removed on drop.
pub struct TestRuntimeDir {
    dir: TempDir,
}

impl TestRuntimeDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::Builder::new()
                .prefix("hermsh-test-")
                .tempdir()
                .expect("create test runtime dir"),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// A socket path inside the directory.
    pub fn sock(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

impl Default for TestRuntimeDir {
    fn default() -> Self {
        Self::new()
    }
}
