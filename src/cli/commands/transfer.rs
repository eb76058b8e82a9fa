//! Network commands: fetch and push.

use std::path::PathBuf;

use crate::cli::Context;
use crate::core::types::SessionRef;
use crate::host::Reply;
use crate::serialize::Tree;
use crate::transfer::{self, FetchRequest, ProgressReporter, PushRequest};

/// Fetch from `remote`.
pub fn fetch(
    ctx: &Context,
    repo: &SessionRef,
    remote: &str,
    key_file: Option<PathBuf>,
    prune: bool,
) -> Reply {
    let mut session = ctx.registry.acquire(repo);
    if !session.is_valid() {
        return Reply::failed(session.last_error());
    }

    let mut request = FetchRequest::new(remote);
    request.key_file = key_file;
    // --prune only ever turns pruning on; otherwise the config decides.
    if prune {
        request.prune = Some(true);
    }

    let reporter = ProgressReporter::new(ctx.channel.as_ref());
    let reply = match transfer::fetch(&mut session, &request, &reporter) {
        Ok(()) => Reply::Ok(Tree::Null),
        Err(_) => Reply::failed(session.last_error()),
    };
    ctx.registry.close(session);
    reply
}

/// Push `branches` to `remote`.
pub fn push(
    ctx: &Context,
    repo: &SessionRef,
    remote: &str,
    key_file: Option<PathBuf>,
    branches: Vec<String>,
) -> Reply {
    let mut session = ctx.registry.acquire(repo);
    if !session.is_valid() {
        return Reply::failed(session.last_error());
    }

    let request = PushRequest {
        remote: remote.to_string(),
        key_file,
        refspecs: branches,
    };

    let reporter = ProgressReporter::new(ctx.channel.as_ref());
    let reply = match transfer::push(&mut session, &request, &reporter) {
        Ok(()) => Reply::Ok(Tree::Null),
        Err(_) => Reply::failed(session.last_error()),
    };
    ctx.registry.close(session);
    reply
}
