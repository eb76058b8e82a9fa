//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Resolves the repository reference into a session
//! 2. Runs one library operation on it
//! 3. Returns the [`Reply`] the host receives
//!
//! A failed operation is still a successful command: the failure travels
//! in the reply. Only problems talking to the host (e.g. stdout closed)
//! surface as `Err`.
//!
//! `serve` runs the same handlers in a loop over stdin so keys registered
//! by one request are visible to the next.

mod inspect;
mod serve;
mod transfer;

pub use inspect::{properties, status};
pub use serve::{handle, serve, Request, Target};
pub use transfer::{fetch, push};

use std::io::{self, Write};

use anyhow::{Context as _, Result};

use super::args::Command;
use super::Context;
use crate::host::Reply;

/// Dispatch a parsed command and print its reply.
///
/// Returns whether the request succeeded. `serve` succeeds once its input
/// is exhausted, whatever the individual replies said.
pub fn dispatch(command: Command, ctx: &Context) -> Result<bool> {
    let reply = match command {
        Command::Properties { repo } => inspect::properties(ctx, &repo),
        Command::Status { repo } => inspect::status(ctx, &repo),
        Command::Fetch {
            repo,
            remote,
            key_file,
            prune,
        } => transfer::fetch(ctx, &repo, &remote, key_file, prune),
        Command::Push {
            repo,
            branches,
            remote,
            key_file,
        } => transfer::push(ctx, &repo, &remote, key_file, branches),
        Command::Serve => {
            serve::serve(ctx, io::stdin().lock(), io::stdout().lock())?;
            return Ok(true);
        }
    };
    emit(&mut io::stdout().lock(), &reply)?;
    Ok(reply.is_ok())
}

/// Write `reply` as one JSON line.
fn emit(output: &mut impl Write, reply: &Reply) -> Result<()> {
    let line = reply.to_json().context("failed to encode reply")?;
    writeln!(output, "{line}").context("failed to write reply")?;
    output.flush().context("failed to write reply")
}
