#![deny(unsafe_code)]

//! hermsh middleware process.
//!
//! A transparent security proxy: the front end connects to
//! `middleware.sock` believing it is the backend, while the middleware
//! holds the only connection to the real `backend.sock`. Every message is
//! inspected in both directions; everything else is relayed verbatim, in
//! order, one request at a time.

mod audit;
mod proxy;
mod stats;

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
                eprintln!("hermsh-middleware: ignoring bad config: {e}");
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
        "middleware starting"
    );

    proxy::Middleware::new(config, rendezvous).run().await
}
