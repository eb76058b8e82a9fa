//! serialize
//!
//! Walks a session's repository state and emits [`Tree`]s for the host.
//!
//! - [`write_properties`]: layout flags, conflicts, remotes, branches
//! - [`write_status`]: changed paths grouped by status category
//!
//! Both return [`Failed`] instead of a partial tree when the session is
//! invalid or the engine cannot enumerate something.

mod properties;
mod status;
mod tree;

pub use properties::write_properties;
pub use status::write_status;
pub use tree::{Failed, Tree};
