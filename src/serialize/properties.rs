//! serialize::properties
//!
//! Repository properties tree.
//!
//! ```text
//! ShallowQ, BareQ, DetachedHeadQ     bool
//! GitDirectory                       string
//! WorkingDirectory, Namespace        string or null
//! State                              string
//! Conflicts                          [path]
//! Remotes                            {name: {FetchURL, PushURL, FetchRefSpecs, PushRefSpecs}}
//! LocalBranches, RemoteBranches      [name]
//! ```

use std::path::Path;

use tracing::warn;

use super::tree::{Failed, Tree};
use crate::session::{ErrorKind, OperationError, RepositorySession};
use crate::vcs::{BranchKind, EngineError, Repo};

/// Build the properties tree for `session`.
///
/// An invalid session or a failed enumeration yields [`Failed`], never a
/// partial tree; the cause is recorded as the session's last error. A
/// remote that is listed but cannot be loaded is left out.
pub fn write_properties(session: &mut RepositorySession) -> Result<Tree, Failed> {
    session.clear_error();
    let Some(repo) = session.repo().cloned() else {
        session.record_error(OperationError::new(ErrorKind::BadRepo));
        return Err(Failed);
    };

    build(repo.as_ref()).map_err(|e| {
        session.record_error(OperationError::from_engine(ErrorKind::BadRepo, &e));
        Failed
    })
}

fn build(repo: &dyn Repo) -> Result<Tree, EngineError> {
    let layout = repo.layout()?;

    Ok(Tree::Assoc(vec![
        ("ShallowQ".into(), layout.shallow.into()),
        ("BareQ".into(), layout.bare.into()),
        ("DetachedHeadQ".into(), layout.head_detached.into()),
        ("GitDirectory".into(), path_tree(&layout.git_dir)),
        (
            "WorkingDirectory".into(),
            layout.work_dir.as_deref().map_or(Tree::Null, path_tree),
        ),
        ("Namespace".into(), layout.namespace.into()),
        ("State".into(), layout.state.name().into()),
        ("Conflicts".into(), Tree::strings(repo.conflicts()?)),
        ("Remotes".into(), remotes(repo)?),
        (
            "LocalBranches".into(),
            Tree::strings(repo.branches(BranchKind::Local)?),
        ),
        (
            "RemoteBranches".into(),
            Tree::strings(repo.branches(BranchKind::Remote)?),
        ),
    ]))
}

fn remotes(repo: &dyn Repo) -> Result<Tree, EngineError> {
    let mut entries = Vec::new();
    for name in repo.remote_names()? {
        let details = match repo.remote_details(&name) {
            Ok(details) => details,
            Err(e) => {
                warn!(remote = %name, error = %e, "skipping remote");
                continue;
            }
        };

        let push_url = details.push_url.clone().or_else(|| details.url.clone());
        entries.push((
            name,
            Tree::Assoc(vec![
                ("FetchURL".into(), details.url.into()),
                ("PushURL".into(), push_url.into()),
                ("FetchRefSpecs".into(), Tree::strings(details.fetch_refspecs)),
                ("PushRefSpecs".into(), Tree::strings(details.push_refspecs)),
            ]),
        ));
    }
    Ok(Tree::Assoc(entries))
}

fn path_tree(path: &Path) -> Tree {
    Tree::String(path.to_string_lossy().into_owned())
}
