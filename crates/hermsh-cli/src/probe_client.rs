//! Synchronous client for the probe socket.
//!
//! The front end blocks on the probe — probing is part of the sequential
//! classification pipeline. A read deadline slightly above the probe's own
//! internal timeout keeps a wedged probe from wedging the shell; one
//! reconnect-and-retry on failure, then the caller degrades.

use std::io::BufReader;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use hermsh_core::ipc::framing::{read_frame, write_frame};
use hermsh_core::protocol::parse_verdict;
use hermsh_core::Verdict;

/// Client-side deadline: the probe answers within its own 5 s budget, so
/// anything beyond this means the probe process itself is stuck.
const READ_DEADLINE: Duration = Duration::from_secs(8);

pub struct ProbeClient {
    socket_path: PathBuf,
    conn: Option<Conn>,
}

struct Conn {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl ProbeClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            conn: None,
        }
    }

    /// Probe one line, with a single retry before the caller degrades.
    ///
    /// The retry covers both transients: a dead connection from a
    /// restarted probe process, and an unavailable verdict from a probe
    /// whose inner shell died mid-call — the probe respawns that shell on
    /// the next request, so asking again is exactly what heals it.
    pub fn probe(&mut self, line: &str) -> Verdict {
        for attempt in 0..2 {
            match self.try_probe(line) {
                Ok(Verdict::Unavailable) => {
                    debug!(attempt, "probe reported unavailable");
                }
                Ok(verdict) => return verdict,
                Err(e) => {
                    debug!(attempt, error = %e, "probe attempt failed");
                    self.conn = None;
                }
            }
        }
        warn!("probe unavailable");
        Verdict::Unavailable
    }

    fn try_probe(&mut self, line: &str) -> std::io::Result<Verdict> {
        if self.conn.is_none() {
            let stream = UnixStream::connect(&self.socket_path)?;
            stream.set_read_timeout(Some(READ_DEADLINE))?;
            let reader = BufReader::new(stream.try_clone()?);
            self.conn = Some(Conn {
                reader,
                writer: stream,
            });
        }
        let Some(conn) = self.conn.as_mut() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "probe not connected",
            ));
        };

        write_frame(&mut conn.writer, line).map_err(io_from_frame)?;
        let reply = read_frame(&mut conn.reader)
            .map_err(io_from_frame)?
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "probe closed connection")
            })?;
        parse_verdict(&reply)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }
}

fn io_from_frame(e: hermsh_core::ipc::FrameError) -> std::io::Error {
    match e {
        hermsh_core::ipc::FrameError::Io(io) => io,
        other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermsh_core::protocol::encode_verdict;
    use hermsh_test_utils::runtime_dir::TestRuntimeDir;

    #[test]
    fn test_unavailable_when_no_socket() {
        let mut client = ProbeClient::new(PathBuf::from("/hermsh/no/such/probe.sock"));
        assert_eq!(client.probe("echo hi"), Verdict::Unavailable);
    }

    #[test]
    fn test_unavailable_verdict_retried_once() {
        let dir = TestRuntimeDir::new();
        let sock = dir.sock("probe.sock");
        let listener = std::os::unix::net::UnixListener::bind(&sock).unwrap();

        // Stub probe whose inner shell "died" on the first request: the
        // first probe answers unavailable, the retry succeeds.
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;

            let first = read_frame(&mut reader).unwrap().unwrap();
            assert_eq!(first, "echo hi");
            write_frame(&mut writer, &encode_verdict(&Verdict::Unavailable)).unwrap();

            let second = read_frame(&mut reader).unwrap().unwrap();
            assert_eq!(second, "echo hi");
            let ok = Verdict::Ok {
                exit_code: 0,
                stdout: "hi\n".to_string(),
                stderr: String::new(),
            };
            write_frame(&mut writer, &encode_verdict(&ok)).unwrap();
        });

        let mut client = ProbeClient::new(sock);
        match client.probe("echo hi") {
            Verdict::Ok {
                exit_code, stdout, ..
            } => {
                assert_eq!(exit_code, 0);
                assert_eq!(stdout, "hi\n");
            }
            other => panic!("unexpected verdict: {other:?}"),
        }

        drop(client);
        handle.join().unwrap();
    }
}
