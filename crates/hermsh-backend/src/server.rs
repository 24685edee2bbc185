//! Backend socket server.
//!
//! Serves the middleware over `backend.sock`: one client, strict FIFO, one
//! request in flight. A client disconnect while a provider call is running
//! cancels the call — the connection task select-races the handler against
//! reader EOF.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, info, warn};

use hermsh_config::{Config, Provider};
use hermsh_core::ipc::framing::{read_frame_async, write_frame_async, FrameError};
use hermsh_core::ipc::bind_socket;
use hermsh_core::paths::Rendezvous;
use hermsh_core::protocol::{Reply, Request};

use crate::session::{parse_ai_text, AiSession, AiStatus, FailureContext};

/// Largest slice of a captured-output file forwarded as failure context.
const MAX_CONTEXT_BYTES: usize = 8 * 1024;

type SharedSession = Arc<Mutex<AiSession>>;

pub struct Backend {
    config: Config,
    rendezvous: Rendezvous,
}

impl Backend {
    pub fn new(config: Config, rendezvous: Rendezvous) -> Self {
        Self { config, rendezvous }
    }

    /// Run until interrupted. Accepts one connection at a time — the
    /// middleware is the only legitimate client.
    pub async fn run(self) -> Result<()> {
        let session: SharedSession = Arc::new(Mutex::new(AiSession::new(&self.config)));

        // Provider initialization happens off the accept path so STATUS
        // polls can answer AI_LOADING immediately.
        {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                if let Ok(mut guard) = session.lock() {
                    guard.initialize();
                }
            });
        }

        let (listener, _guard) = bind_socket(&self.rendezvous.backend_sock())?;

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    debug!("middleware connected");
                    if let Err(e) = serve_connection(stream, Arc::clone(&session)).await {
                        warn!(error = %e, "connection ended with error");
                    }
                    debug!("middleware disconnected");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, backend shutting down");
                    break;
                }
                _ = sigterm() => {
                    info!("SIGTERM received, backend shutting down");
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Serve one connection until the peer closes it.
async fn serve_connection(stream: UnixStream, session: SharedSession) -> Result<(), FrameError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let Some(msg) = read_frame_async(&mut reader).await? else {
            break;
        };

        // The protocol is one request in flight: while the handler runs the
        // only thing the peer can legitimately do is hang up. Racing the
        // handler against buffer refill turns that hang-up into
        // cancellation of the in-flight provider call.
        let reply = tokio::select! {
            reply = handle_request(&session, &msg) => Some(reply),
            refill = reader.fill_buf() => {
                match refill {
                    Ok(buf) if buf.is_empty() => {
                        debug!("client disconnected mid-request, cancelling");
                        None
                    }
                    // A pipelined byte is a protocol violation; finish the
                    // current request anyway and let the loop pick it up.
                    _ => Some(handle_request(&session, &msg).await),
                }
            }
        };
        let Some(reply) = reply else { break };

        write_frame_async(&mut write_half, &reply.encode()).await?;
    }
    Ok(())
}

/// Dispatch one request to a reply. Malformed requests get a diagnostic
/// reply rather than a dropped connection.
async fn handle_request(session: &SharedSession, msg: &str) -> Reply {
    let request = match Request::parse(msg) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "malformed request");
            return Reply::Edit(format!("backend error: {e}"));
        }
    };

    match request {
        Request::Status => {
            let status = session
                .lock()
                .map(|guard| guard.status())
                .unwrap_or(AiStatus::Failed);
            match status {
                AiStatus::Loading => Reply::AiLoading,
                AiStatus::Ready => Reply::AiReady,
                AiStatus::Failed => Reply::AiFailed,
            }
        }
        Request::Cwd(path) => {
            if let Ok(mut guard) = session.lock() {
                guard.set_cwd(path);
            }
            Reply::Ok
        }
        Request::Verbose(level) => {
            debug!(level, "verbosity updated");
            Reply::Ok
        }
        Request::AiProvider(id) => match id.parse::<Provider>() {
            Ok(kind) => {
                if let Ok(mut guard) = session.lock() {
                    guard.select_provider(kind);
                }
                Reply::Ok
            }
            Err(_) => Reply::Edit(format!("unknown AI provider: {id}")),
        },
        Request::Query(line) => translate(session, &line, None).await,
        Request::BashFailed {
            exit_code,
            line,
            output_path,
        } => {
            let output = read_capped(&output_path).await;
            translate(session, &line, Some(FailureContext { exit_code, output })).await
        }
    }
}

/// Run one query through the provider, degrading to a diagnostic `edit:`
/// on any provider failure.
async fn translate(session: &SharedSession, line: &str, failure: Option<FailureContext>) -> Reply {
    let prepared = {
        let Ok(guard) = session.lock() else {
            return Reply::Edit("backend error: session lock poisoned".to_string());
        };
        match guard.provider() {
            Some(provider) => Some((provider, guard.build_request(line, failure.as_ref()))),
            None => return guard.not_ready_reply(),
        }
    };
    let Some((provider, request)) = prepared else {
        return Reply::Edit("backend error: no provider".to_string());
    };

    match provider.complete(&request).await {
        Ok(response) => {
            debug!(model = %response.model, "provider replied");
            if let Ok(mut guard) = session.lock() {
                guard.record_exchange(line, &response.text);
            }
            parse_ai_text(&response.text)
        }
        Err(e) => Reply::Edit(format!("AI request failed: {e}")),
    }
}

/// Read a captured-output file, keeping only the trailing bytes that fit
/// the context budget. A missing file yields empty context, not an error —
/// the command line alone is still useful to the model.
async fn read_capped(path: &str) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let start = bytes.len().saturating_sub(MAX_CONTEXT_BYTES);
            String::from_utf8_lossy(&bytes[start..]).into_owned()
        }
        Err(e) => {
            warn!(path, error = %e, "could not read captured output");
            String::new()
        }
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
    use hermsh_test_utils::config::TestConfigBuilder;

    fn loading_session() -> SharedSession {
        let config = TestConfigBuilder::new().build();
        Arc::new(Mutex::new(AiSession::new(&config)))
    }

    fn failed_session() -> SharedSession {
        std::env::remove_var("ANTHROPIC_API_KEY");
        let session = loading_session();
        session.lock().unwrap().initialize();
        session
    }

    #[tokio::test]
    async fn test_status_reflects_lifecycle() {
        let session = loading_session();
        assert_eq!(handle_request(&session, "STATUS").await, Reply::AiLoading);

        std::env::remove_var("ANTHROPIC_API_KEY");
        session.lock().unwrap().initialize();
        assert_eq!(handle_request(&session, "STATUS").await, Reply::AiFailed);
    }

    #[tokio::test]
    async fn test_cwd_update_is_idempotent() {
        let session = loading_session();
        assert_eq!(handle_request(&session, "CWD:/srv/app").await, Reply::Ok);
        assert_eq!(handle_request(&session, "CWD:/srv/app").await, Reply::Ok);
        assert_eq!(session.lock().unwrap().cwd(), Some("/srv/app"));
    }

    #[tokio::test]
    async fn test_malformed_request_gets_diagnostic() {
        let session = loading_session();
        match handle_request(&session, "FROBNICATE").await {
            Reply::Edit(text) => assert!(text.contains("backend error")),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected() {
        let session = loading_session();
        match handle_request(&session, "AI_PROVIDER:clippy").await {
            Reply::Edit(text) => assert!(text.contains("unknown AI provider")),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_provider_switch_acknowledged() {
        let session = loading_session();
        assert_eq!(handle_request(&session, "AI_PROVIDER:openai").await, Reply::Ok);
        assert_eq!(
            session.lock().unwrap().provider_kind(),
            Provider::OpenAi
        );
    }

    #[tokio::test]
    async fn test_query_without_provider_degrades() {
        let session = failed_session();
        match handle_request(&session, "QUERY:please list the pods").await {
            Reply::Edit(text) => assert!(text.contains("AI is unavailable")),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bash_failed_reads_context_file() {
        let session = failed_session();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captured");
        tokio::fs::write(&path, b"command not found\n").await.unwrap();

        // With a failed session we still exercise parsing and file access.
        let msg = format!("BASH_FAILED:127:kubctl get pods:{}", path.display());
        match handle_request(&session, &msg).await {
            Reply::Edit(text) => assert!(text.contains("AI is unavailable")),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_capped_tails_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big");
        let content = "x".repeat(MAX_CONTEXT_BYTES * 2);
        tokio::fs::write(&path, &content).await.unwrap();

        let out = read_capped(path.to_str().unwrap()).await;
        assert_eq!(out.len(), MAX_CONTEXT_BYTES);
    }

    #[tokio::test]
    async fn test_read_capped_missing_file_is_empty() {
        assert_eq!(read_capped("/hermsh/no/such/file").await, "");
    }

    #[tokio::test]
    async fn test_serve_connection_over_socketpair() {
        let session = loading_session();
        let (client, server) = UnixStream::pair().unwrap();

        let handle = tokio::spawn(serve_connection(server, session));

        let (read_half, mut write_half) = client.into_split();
        let mut reader = BufReader::new(read_half);

        write_frame_async(&mut write_half, "STATUS").await.unwrap();
        let reply = read_frame_async(&mut reader).await.unwrap().unwrap();
        assert_eq!(Reply::parse(&reply), Reply::AiLoading);

        write_frame_async(&mut write_half, "CWD:/tmp").await.unwrap();
        let reply = read_frame_async(&mut reader).await.unwrap().unwrap();
        assert_eq!(Reply::parse(&reply), Reply::Ok);

        drop(write_half);
        drop(reader);
        handle.await.unwrap().unwrap();
    }
}
