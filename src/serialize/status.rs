//! serialize::status
//!
//! Working tree and index status, grouped by category.
//!
//! Every category is always present, in a fixed order, so hosts can index
//! the association without checking for missing keys. A path appears under
//! each category that applies to it.

use super::tree::{Failed, Tree};
use crate::session::{ErrorKind, OperationError, RepositorySession};
use crate::vcs::StatusCategory;

/// Build the status tree for `session`.
///
/// Status flags come from the session's configuration (untracked files
/// included, untracked directories recursed and HEAD-to-index renames
/// detected, unless configured otherwise).
pub fn write_status(session: &mut RepositorySession) -> Result<Tree, Failed> {
    session.clear_error();
    let Some(repo) = session.repo().cloned() else {
        session.record_error(OperationError::new(ErrorKind::BadRepo));
        return Err(Failed);
    };

    let options = session.config().status_options();
    let entries = match repo.statuses(&options) {
        Ok(entries) => entries,
        Err(e) => {
            session.record_error(OperationError::from_engine(ErrorKind::BadRepo, &e));
            return Err(Failed);
        }
    };

    let groups = StatusCategory::ALL
        .iter()
        .map(|category| {
            let paths = entries
                .iter()
                .filter(|entry| entry.categories.contains(category))
                .map(|entry| entry.path.clone());
            (category.name().to_string(), Tree::strings(paths))
        })
        .collect();

    Ok(Tree::Assoc(groups))
}
