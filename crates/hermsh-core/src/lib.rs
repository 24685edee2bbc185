#![deny(unsafe_code)]

//! hermsh core runtime.
//!
//! Shared plumbing for the four hermsh processes: the wire protocol and
//! framing used on every socket, the per-user rendezvous paths, the probe
//! engine that pre-executes candidate commands, and the LLM provider layer
//! the backend dispatches through.

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Line-framed IPC over Unix domain sockets.
pub mod ipc;
/// LLM provider trait and implementations.
pub mod llm;
/// Per-user rendezvous paths under `~/.hermsh/`.
pub mod paths;
/// Command pre-execution engine and its verdicts.
pub mod probe;
/// Request/reply wire grammar shared by all processes.
pub mod protocol;

use std::future::Future;
use std::pin::Pin;

/// Boxed future used for object-safe async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use probe::{ShellProbe, Verdict};
pub use protocol::{Reply, Request};
