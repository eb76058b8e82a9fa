//! cli
//!
//! Command-line host adapter for repolink.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install logging
//! - Delegate to command handlers, which print the JSON reply
//!
//! # Architecture
//!
//! The CLI layer is thin. It plays the host's role over stdio: replies go
//! to stdout as one JSON line, progress goes to stderr through
//! [`StdioChannel`]. Each one-shot invocation is one request, so its
//! session is unkeyed and closed before exit. `serve` keeps one registry
//! for the whole process, which is what makes `#<key>` references useful.

pub mod args;
pub mod commands;

pub use args::Cli;

use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;
use crate::host::{HostChannel, StdioChannel};
use crate::session::SessionRegistry;
use crate::vcs::Git2Engine;

/// Everything a command handler needs.
pub struct Context {
    /// Session registry over the production engine
    pub registry: SessionRegistry,
    /// Channel progress lines go through
    pub channel: Box<dyn HostChannel>,
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`. Returns whether the
/// request succeeded.
pub fn run() -> Result<bool> {
    let cli = Cli::parse_args();
    init_tracing(cli.debug);

    let config = match &cli.config {
        Some(path) if !path.exists() => bail!("config file '{}' does not exist", path.display()),
        Some(path) => Config::load_from(Some(path), None),
        None => Config::load(None),
    }
    .context("failed to load configuration")?;

    let ctx = Context {
        registry: SessionRegistry::new(Arc::new(Git2Engine), config),
        channel: Box::new(StdioChannel),
    };

    commands::dispatch(cli.command, &ctx)
}

/// Log to stderr. `RUST_LOG` wins over `--debug`.
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
