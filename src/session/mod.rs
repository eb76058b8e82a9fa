//! session
//!
//! Repository sessions and the registry that hands them out.
//!
//! # Architecture
//!
//! - [`SessionRegistry`] resolves host references (paths or keys) into
//!   sessions and owns the key → repository map
//! - [`RepositorySession`] is one caller's handle: the shared repository,
//!   a single-slot [`RemoteCache`] and the last error
//! - [`CredentialResolver`] answers the engine's credential callback
//! - [`ErrorKind`] / [`OperationError`] are the outcomes reported to the host
//!
//! # Example
//!
//! ```
//! use repolink::core::config::Config;
//! use repolink::session::SessionRegistry;
//! use repolink::vcs::mock::{MockEngine, MockRepo};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let engine = MockEngine::new().with_repo("/work/demo", MockRepo::new());
//! let registry = SessionRegistry::new(Arc::new(engine), Config::default());
//!
//! let mut session = registry.open(Path::new("/work/demo")).unwrap();
//! let key = registry.register(&mut session).unwrap();
//!
//! let again = registry.lookup(key).unwrap();
//! assert!(again.shares_repository_with(&session));
//! ```

mod credentials;
mod error;
mod handle;
mod registry;
mod remote_cache;

pub use credentials::CredentialResolver;
pub use error::{ErrorKind, OperationError};
pub use handle::RepositorySession;
pub use registry::{RegistryError, SessionRegistry};
pub use remote_cache::RemoteCache;
