#![deny(unsafe_code)]

//! hermsh probe process.
//!
//! Hosts the [`ShellProbe`] engine behind a line-framed Unix socket. The
//! front end sends one raw command line per request and receives the
//! encoded verdict. One request in flight at a time.
//!
//! The probe never owns the terminal and never changes the front end's
//! working directory; `cd` lines sent here only move the *probe shell's*
//! directory to mirror the front end.

use anyhow::Result;
use tokio::io::BufReader;
use tokio::net::UnixStream;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use hermsh_core::ipc::framing::{read_frame_async, write_frame_async};
use hermsh_core::paths::Rendezvous;
use hermsh_core::probe::{ProbeConfig, ShellProbe};
use hermsh_core::protocol::encode_verdict;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let rendezvous = Rendezvous::resolve()?;
    rendezvous.ensure_dir()?;
    let socket_path = rendezvous.probe_sock();

    let (listener, _guard) = hermsh_core::ipc::bind_socket(&socket_path)?;
    info!(version = %hermsh_core::build_info::version_string(), "probe started");

    let mut probe = ShellProbe::new(ProbeConfig::default());
    probe.ensure_started().await;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                debug!("front end connected");
                if let Err(e) = serve_client(stream, &mut probe).await {
                    warn!(error = %e, "client connection ended with error");
                }
                debug!("front end disconnected");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
            _ = sigterm() => {
                info!("SIGTERM received, shutting down");
                break;
            }
        }
    }

    probe.recycle().await;
    Ok(())
}

/// Serve one front-end connection until it closes.
async fn serve_client(stream: UnixStream, probe: &mut ShellProbe) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    while let Some(line) = read_frame_async(&mut reader).await? {
        if line.is_empty() {
            continue;
        }
        let verdict = probe.probe(&line).await;
        debug!(line = %line, verdict = ?summary(&verdict), "probed");
        write_frame_async(&mut write_half, &encode_verdict(&verdict)).await?;
    }
    Ok(())
}

fn summary(verdict: &hermsh_core::Verdict) -> &'static str {
    match verdict {
        hermsh_core::Verdict::Ok { .. } => "ok",
        hermsh_core::Verdict::Interactive => "interactive",
        hermsh_core::Verdict::Timeout => "timeout",
        hermsh_core::Verdict::Unavailable => "unavailable",
    }
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(_) => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermsh_core::protocol::parse_verdict;
    use hermsh_core::Verdict;

    #[tokio::test]
    async fn test_serve_client_roundtrip() {
        hermsh_test_utils::tracing_setup::init_test_tracing();
        let (client, server) = UnixStream::pair().unwrap();

        let handle = tokio::spawn(async move {
            let mut probe = ShellProbe::new(ProbeConfig::default());
            serve_client(server, &mut probe).await.unwrap();
            probe.recycle().await;
        });

        let (read_half, mut write_half) = client.into_split();
        let mut reader = BufReader::new(read_half);

        write_frame_async(&mut write_half, "echo ping").await.unwrap();
        let reply = read_frame_async(&mut reader).await.unwrap().unwrap();
        match parse_verdict(&reply).unwrap() {
            Verdict::Ok {
                exit_code, stdout, ..
            } => {
                assert_eq!(exit_code, 0);
                assert_eq!(stdout, "ping\n");
            }
            other => panic!("unexpected verdict: {other:?}"),
        }

        drop(write_half);
        drop(reader);
        handle.await.unwrap();
    }
}
