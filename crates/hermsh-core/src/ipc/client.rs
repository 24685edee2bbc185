//! Async line-framed client for a Unix socket peer.
//!
//! Wraps connect, one-message roundtrip, and explicit disconnect. Holds at
//! most one connection; reconnection policy (backoff, retry budgets) stays
//! with the caller, which knows what a failure should mean.

use std::path::PathBuf;

use tokio::io::BufReader;
use tokio::net::{
    unix::{OwnedReadHalf, OwnedWriteHalf},
    UnixStream,
};
use tracing::debug;

use super::framing::{read_frame_async, write_frame_async, FrameError};

/// A client end of a line-framed socket connection.
pub struct LineClient {
    socket_path: PathBuf,
    conn: Option<(BufReader<OwnedReadHalf>, OwnedWriteHalf)>,
}

impl LineClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            conn: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Connect if not already connected.
    pub async fn connect(&mut self) -> Result<(), FrameError> {
        if self.conn.is_some() {
            return Ok(());
        }
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (read_half, write_half) = stream.into_split();
        self.conn = Some((BufReader::new(read_half), write_half));
        debug!(path = %self.socket_path.display(), "connected");
        Ok(())
    }

    /// Drop the connection; the next [`connect`](Self::connect) redials.
    pub fn disconnect(&mut self) {
        self.conn = None;
    }

    /// Send one message and wait for the complete reply. Any error leaves
    /// the client disconnected — a half-finished exchange cannot be
    /// resynchronized.
    pub async fn roundtrip(&mut self, msg: &str) -> Result<String, FrameError> {
        self.connect().await?;
        let result = match self.conn.as_mut() {
            Some((reader, writer)) => {
                write_frame_async(writer, msg).await?;
                match read_frame_async(reader).await? {
                    Some(reply) => Ok(reply),
                    None => Err(FrameError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "peer closed the connection",
                    ))),
                }
            }
            None => Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "not connected",
            ))),
        };
        if result.is_err() {
            self.conn = None;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::bind_socket;

    #[tokio::test]
    async fn test_roundtrip_against_echo_server() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("echo.sock");
        let (listener, _guard) = bind_socket(&sock).unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            while let Some(msg) = read_frame_async(&mut reader).await.unwrap() {
                write_frame_async(&mut write_half, &format!("echo:{msg}"))
                    .await
                    .unwrap();
            }
        });

        let mut client = LineClient::new(&sock);
        assert!(!client.is_connected());
        assert_eq!(client.roundtrip("hello").await.unwrap(), "echo:hello");
        assert!(client.is_connected());
        assert_eq!(client.roundtrip("again").await.unwrap(), "echo:again");
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces() {
        let mut client = LineClient::new("/hermsh/no/such.sock");
        assert!(client.roundtrip("x").await.is_err());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_error_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("close.sock");
        let (listener, _guard) = bind_socket(&sock).unwrap();

        // Server that hangs up without replying.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut client = LineClient::new(&sock);
        assert!(client.roundtrip("x").await.is_err());
        assert!(!client.is_connected());
    }
}
