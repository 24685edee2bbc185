#![deny(unsafe_code)]

//! hermsh backend process.
//!
//! Owns the AI-provider session and serves the middleware's requests over
//! `backend.sock`. Single-threaded and cooperative: the only suspension
//! points are socket I/O and provider calls. The backend never executes
//! shell commands — it only suggests them.

mod server;
mod session;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hermsh_config::Config;
use hermsh_core::paths::{self, Rendezvous};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = paths::config_file()
        .map(|path| {
            Config::load(&path).unwrap_or_else(|e| {
                eprintln!("hermsh-backend: ignoring bad config: {e}");
                Config::default()
            })
        })
        .unwrap_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.tracing_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    let rendezvous = Rendezvous::resolve()?;
    rendezvous.ensure_dir()?;

    info!(
        version = %hermsh_core::build_info::version_string(),
        provider = %config.provider,
        "backend starting"
    );

    server::Backend::new(config, rendezvous).run().await
}
