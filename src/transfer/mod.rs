//! transfer
//!
//! Fetch and push orchestration over a session's cached remote.
//!
//! Both operations are linear stage sequences with no retries. They clear
//! the session's last error at entry and record the failure, if any, before
//! returning. Engine progress is forwarded synchronously through a
//! [`ProgressSink`](crate::vcs::ProgressSink), normally a
//! [`ProgressReporter`] over the host channel.
//!
//! # Example
//!
//! ```
//! use repolink::core::config::Config;
//! use repolink::host::MemoryChannel;
//! use repolink::session::SessionRegistry;
//! use repolink::transfer::{fetch, FetchRequest, ProgressReporter};
//! use repolink::vcs::mock::{MockEngine, MockRepo};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let engine = MockEngine::new()
//!     .with_repo("/work/demo", MockRepo::new().remote("origin", "https://example.com/demo.git"));
//! let registry = SessionRegistry::new(Arc::new(engine), Config::default());
//! let mut session = registry.open(Path::new("/work/demo")).unwrap();
//!
//! let channel = MemoryChannel::new();
//! fetch(&mut session, &FetchRequest::new("origin"), &ProgressReporter::new(&channel)).unwrap();
//! assert!(!channel.lines().is_empty());
//! ```

mod fetch;
mod progress;
mod push;

pub use fetch::{fetch, FetchRequest};
pub use progress::{format_progress, ProgressReporter};
pub use push::{push, PushRequest};
