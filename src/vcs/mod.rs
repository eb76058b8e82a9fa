//! vcs
//!
//! Abstraction over the version-control engine.
//!
//! # Architecture
//!
//! The engine performs object storage, pack negotiation, transport and ref
//! updates. This crate never reimplements any of that; it drives the engine
//! through the traits re-exported here.
//!
//! # Modules
//!
//! - `traits`: Engine capability traits and the data they exchange
//! - `libgit`: Production engine backed by libgit2
//! - [`mock`]: In-memory engine for deterministic testing
//!
//! # Example
//!
//! ```no_run
//! use repolink::vcs::{Engine, Git2Engine};
//! use std::path::Path;
//!
//! let repo = Git2Engine.open(Path::new("/path/to/repo")).unwrap();
//! for name in repo.remote_names().unwrap() {
//!     println!("{name}");
//! }
//! ```

mod libgit;
pub mod mock;
mod traits;

pub use libgit::{Git2Engine, Git2Remote, Git2Repo};
pub use traits::*;
