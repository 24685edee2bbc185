//! Synchronous client for the middleware socket.
//!
//! From the front end's point of view this *is* the backend: the
//! middleware is transparent. Long AI calls show a progress dot every
//! five seconds; past the overall cap the connection is dropped, which
//! also cancels the in-flight call server-side. A ^C while waiting does
//! the same.

use std::io::{BufReader, Write};
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, warn};

use hermsh_core::ipc::framing::{read_frame, write_frame};
use hermsh_core::protocol::{Reply, Request};

/// Interval between progress dots while an AI call runs.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);
/// Overall cap on one request; past it the connection is dropped.
const OVERALL_DEADLINE: Duration = Duration::from_secs(300);
/// Backstop on a single blocking read once data has started flowing.
const READ_BACKSTOP: Duration = Duration::from_secs(30);

/// Errors surfaced to the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("AI offline (middleware unreachable)")]
    Unavailable,

    #[error("AI response deadline exceeded")]
    Timeout,

    #[error("interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct BackendClient {
    socket_path: PathBuf,
    conn: Option<Conn>,
    interrupt: Arc<AtomicBool>,
}

struct Conn {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl BackendClient {
    /// `interrupt` is the SIGINT flag; when it flips mid-wait the request
    /// is abandoned and the connection dropped.
    pub fn new(socket_path: PathBuf, interrupt: Arc<AtomicBool>) -> Self {
        Self {
            socket_path,
            conn: None,
            interrupt,
        }
    }

    /// Send one request and wait for its reply, FIFO, one in flight.
    pub fn request(&mut self, request: &Request) -> Result<Reply, BackendError> {
        let encoded = request.encode();
        // One reconnect attempt: the middleware may have restarted since
        // the last prompt.
        for attempt in 0..2 {
            if let Err(e) = self.ensure_connected() {
                debug!(attempt, error = %e, "middleware connect failed");
                continue;
            }
            let Some(conn) = self.conn.as_mut() else {
                continue;
            };
            match send_and_wait(conn, &self.interrupt, &encoded) {
                Ok(reply) => return Ok(Reply::parse(&reply)),
                Err(BackendError::Io(e)) => {
                    debug!(attempt, error = %e, "middleware request failed");
                    self.conn = None;
                }
                Err(other) => {
                    // Dropping the connection is what cancels the in-flight
                    // call upstream.
                    self.conn = None;
                    return Err(other);
                }
            }
        }
        warn!("middleware unreachable");
        Err(BackendError::Unavailable)
    }

    fn ensure_connected(&mut self) -> std::io::Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let stream = UnixStream::connect(&self.socket_path)?;
        stream.set_read_timeout(Some(READ_BACKSTOP))?;
        let reader = BufReader::new(stream.try_clone()?);
        self.conn = Some(Conn {
            reader,
            writer: stream,
        });
        Ok(())
    }
}

fn send_and_wait(
    conn: &mut Conn,
    interrupt: &AtomicBool,
    encoded: &str,
) -> Result<String, BackendError> {
    write_frame(&mut conn.writer, encoded).map_err(io_from_frame)?;

    let started = Instant::now();
    let mut dots = 0u32;
    let finish_dots = |dots: u32| {
        if dots > 0 {
            println!();
        }
    };

    loop {
        // Anything already buffered belongs to our reply.
        if !conn.reader.buffer().is_empty() {
            finish_dots(dots);
            return read_one(&mut conn.reader);
        }
        if started.elapsed() >= OVERALL_DEADLINE {
            finish_dots(dots);
            return Err(BackendError::Timeout);
        }
        if interrupt.swap(false, Ordering::SeqCst) {
            finish_dots(dots);
            return Err(BackendError::Interrupted);
        }

        let fd = conn.writer.as_fd();
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(PROGRESS_INTERVAL.as_millis() as u16)) {
            Ok(0) => {
                dots += 1;
                print!(".");
                let _ = std::io::stdout().flush();
            }
            Ok(_) => {
                finish_dots(dots);
                return read_one(&mut conn.reader);
            }
            Err(nix::errno::Errno::EINTR) => {}
            Err(e) => {
                return Err(BackendError::Io(std::io::Error::other(e)));
            }
        }
    }
}

fn read_one(reader: &mut BufReader<UnixStream>) -> Result<String, BackendError> {
    read_frame(reader).map_err(io_from_frame)?.ok_or_else(|| {
        BackendError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "middleware closed the connection",
        ))
    })
}

fn io_from_frame(e: hermsh_core::ipc::FrameError) -> BackendError {
    match e {
        hermsh_core::ipc::FrameError::Io(io) => BackendError::Io(io),
        other => BackendError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            other.to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_when_no_socket() {
        let interrupt = Arc::new(AtomicBool::new(false));
        let mut client =
            BackendClient::new(PathBuf::from("/hermsh/no/such/middleware.sock"), interrupt);
        assert!(matches!(
            client.request(&Request::Status),
            Err(BackendError::Unavailable)
        ));
    }

    #[test]
    fn test_roundtrip_with_stub_middleware() {
        use hermsh_test_utils::runtime_dir::TestRuntimeDir;

        let dir = TestRuntimeDir::new();
        let sock = dir.sock("middleware.sock");
        let listener = std::os::unix::net::UnixListener::bind(&sock).unwrap();

        // Stub middleware: answer OK to everything on one connection.
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            while let Ok(Some(_msg)) = read_frame(&mut reader) {
                write_frame(&mut writer, "OK").unwrap();
            }
        });

        let interrupt = Arc::new(AtomicBool::new(false));
        let mut client = BackendClient::new(sock, interrupt);
        let reply = client.request(&Request::Cwd("/tmp".to_string())).unwrap();
        assert_eq!(reply, Reply::Ok);

        drop(client);
        handle.join().unwrap();
    }
}
