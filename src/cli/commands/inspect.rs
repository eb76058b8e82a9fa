//! Read-only commands: properties and status.

use crate::cli::Context;
use crate::core::types::SessionRef;
use crate::host::Reply;
use crate::serialize::{self, Tree};
use crate::session::RepositorySession;

/// Serialize repository properties.
pub fn properties(ctx: &Context, repo: &SessionRef) -> Reply {
    render(ctx, repo, serialize::write_properties)
}

/// Serialize repository status.
pub fn status(ctx: &Context, repo: &SessionRef) -> Reply {
    render(ctx, repo, serialize::write_status)
}

fn render<F>(ctx: &Context, repo: &SessionRef, write: F) -> Reply
where
    F: FnOnce(&mut RepositorySession) -> Result<Tree, serialize::Failed>,
{
    let mut session = ctx.registry.acquire(repo);
    if !session.is_valid() {
        // Keep the acquire error; the serializer would replace it with a
        // bare BadRepo.
        return Reply::failed(session.last_error());
    }
    let reply = match write(&mut session) {
        Ok(tree) => Reply::Ok(tree),
        Err(_) => Reply::failed(session.last_error()),
    };
    ctx.registry.close(session);
    reply
}
