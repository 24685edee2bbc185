#![deny(unsafe_code)]

//! hermsh — AI-aware interactive shell.
//!
//! The front end owns the terminal. It spawns and supervises three
//! children — probe, backend, middleware — classifies every input line,
//! and orchestrates the probe → middleware → backend pipeline. Losing any
//! child degrades a feature; it never takes the shell down.

mod backend_client;
mod builtins;
mod classify;
mod control;
mod exec;
mod probe_client;
mod prompt;
mod repl;
mod supervisor;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hermsh_config::Config;
use hermsh_core::paths::{self, Rendezvous, RUNTIME_DIR_ENV};

/// hermsh — an AI-aware shell.
#[derive(Parser)]
#[command(
    name = "hermsh",
    version,
    about = "hermsh — AI-aware interactive shell",
    long_about = "An interactive shell that pre-tests commands in a probe, \
        mediates AI queries through a security middleware, and turns natural \
        language into runnable commands.\n\n\
        Type 'hrmh' at the prompt for control commands."
)]
struct Cli {
    /// Path to the configuration file (KEY=VALUE lines).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug). Overrides the config file.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(paths::config_file)
        .unwrap_or_else(|| PathBuf::from(".hermshrc"));
    let mut config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("hermsh: ignoring bad config {}: {e}", config_path.display());
            Config::default()
        }
    };
    if cli.verbose > 0 {
        config.verbose = cli.verbose.min(2);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.tracing_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    // A ^C aimed at a foreground child must not take the shell down: the
    // handler only records the interrupt. Children started by the
    // supervisor never see it at all (own process group); children run
    // with the terminal get the default disposition back across exec.
    let interrupt = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupt))
        .context("failed to install SIGINT handler")?;

    let rendezvous = Rendezvous::resolve().context("failed to resolve runtime directory")?;
    rendezvous
        .ensure_dir()
        .context("failed to create runtime directory")?;
    // Children inherit the same rendezvous, pinned, even when it came from
    // a default this process computed.
    std::env::set_var(RUNTIME_DIR_ENV, rendezvous.base());

    println!(
        "hermsh {} — AI-aware shell",
        hermsh_core::build_info::version_string()
    );
    println!("type 'hrmh' for control commands");

    repl::Repl::new(config, config_path, rendezvous, interrupt)
        .context("failed to initialize the shell")?
        .run()
}
