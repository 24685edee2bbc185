//! Line-framed IPC over Unix domain sockets.
//!
//! Every hermsh socket carries one message per newline; a message that
//! itself contains newlines is preceded by a `LEN:<bytes>` declaration so
//! the receiver knows exactly how much to read. The [`framing`] module
//! implements both sides of that contract for synchronous (front end) and
//! asynchronous (daemon) peers; [`socket`] handles binding, stale-socket
//! cleanup, and unlink-on-shutdown.

pub mod client;
pub mod framing;
pub mod socket;

pub use client::LineClient;
pub use framing::{FrameError, MAX_FRAME_BYTES};
pub use socket::{bind_socket, SocketGuard};
