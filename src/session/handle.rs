//! session::handle
//!
//! A logical handle to an open repository.
//!
//! # Ownership
//!
//! An unkeyed session owns its repository resource; closing it releases
//! the resource. A keyed session shares the resource with its registry
//! entry, which keeps it alive until the key is released and every session
//! holding it is closed.
//!
//! A session without a repository is *invalid*: every operation on it
//! reports [`ErrorKind::BadRepo`] (or the serializer's failure sentinel)
//! without touching the engine.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::error::{ErrorKind, OperationError};
use super::remote_cache::RemoteCache;
use crate::core::config::Config;
use crate::core::types::SessionKey;
use crate::vcs::{Identity, Remote, Repo};

/// One open repository plus per-session cached state.
#[derive(Debug)]
pub struct RepositorySession {
    pub(super) key: Option<SessionKey>,
    repo: Option<Arc<dyn Repo>>,
    remote_cache: RemoteCache,
    last_error: Option<OperationError>,
    config: Config,
}

impl RepositorySession {
    /// An unkeyed session over `repo`.
    pub(crate) fn new(repo: Arc<dyn Repo>, config: Config) -> Self {
        Self {
            key: None,
            repo: Some(repo),
            remote_cache: RemoteCache::new(),
            last_error: None,
            config,
        }
    }

    /// A session with no repository. Every operation on it fails.
    pub fn invalid(config: Config) -> Self {
        Self {
            key: None,
            repo: None,
            remote_cache: RemoteCache::new(),
            last_error: None,
            config,
        }
    }

    /// Whether the session holds an open repository.
    pub fn is_valid(&self) -> bool {
        self.repo.is_some()
    }

    /// The registry key, if the session is registry-owned.
    pub fn key(&self) -> Option<SessionKey> {
        self.key
    }

    /// The underlying repository resource.
    pub fn repo(&self) -> Option<&Arc<dyn Repo>> {
        self.repo.as_ref()
    }

    /// Effective configuration for this session's repository.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The committer identity, generated afresh from the repository's
    /// configuration on every call.
    ///
    /// Returns `None` for an invalid session or when no identity is
    /// configured.
    pub fn committer(&self) -> Option<Identity> {
        let repo = self.repo.as_ref()?;
        match repo.default_identity() {
            Ok(identity) => Some(identity),
            Err(e) => {
                debug!(error = %e, "no committer identity");
                None
            }
        }
    }

    /// Whether both sessions reference the same underlying repository
    /// resource.
    pub fn shares_repository_with(&self, other: &RepositorySession) -> bool {
        match (&self.repo, &other.repo) {
            (Some(a), Some(b)) => std::ptr::eq(
                Arc::as_ptr(a) as *const (),
                Arc::as_ptr(b) as *const (),
            ),
            _ => false,
        }
    }

    /// The error recorded by the last operation, if it failed.
    pub fn last_error(&self) -> Option<&OperationError> {
        self.last_error.as_ref()
    }

    /// Clear the recorded error. Every public operation calls this first.
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Record `err` as the last error.
    pub fn record_error(&mut self, err: OperationError) {
        debug!(kind = %err.kind, diagnostic = ?err.diagnostic, "operation failed");
        self.last_error = Some(err);
    }

    /// Record the error of a finished operation and pass the result on.
    pub(crate) fn settle<T>(&mut self, result: Result<T, OperationError>) -> Result<T, OperationError> {
        if let Err(err) = &result {
            self.record_error(err.clone());
        }
        result
    }

    /// The session's remote cache.
    pub fn remote_cache(&self) -> &RemoteCache {
        &self.remote_cache
    }

    /// Resolve a remote through the session's cache.
    pub(crate) fn resolve_remote(
        &mut self,
        name: &str,
        key_file: Option<&Path>,
    ) -> Result<&mut dyn Remote, OperationError> {
        let repo = self
            .repo
            .as_deref()
            .ok_or_else(|| OperationError::new(ErrorKind::BadRepo))?;
        let suffix = self.config.public_key_suffix();
        self.remote_cache.resolve(repo, name, key_file, &suffix)
    }
}

impl Drop for RepositorySession {
    fn drop(&mut self) {
        // The cached remote goes before the repository it was loaded from.
        self.remote_cache.clear();
        if let Some(repo) = self.repo.take() {
            debug!(key = ?self.key, owners = Arc::strong_count(&repo), "closing session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::mock::{MockEngine, MockRepo};
    use crate::vcs::Engine;

    fn open(engine: &MockEngine) -> RepositorySession {
        let repo = engine.open(Path::new("/r")).unwrap();
        RepositorySession::new(repo, Config::default())
    }

    #[test]
    fn invalid_session_has_no_committer() {
        let session = RepositorySession::invalid(Config::default());
        assert!(!session.is_valid());
        assert!(session.committer().is_none());
    }

    #[test]
    fn committer_is_recomputed() {
        let engine = MockEngine::new().with_repo("/r", MockRepo::new());
        let session = open(&engine);

        let first = session.committer().unwrap();
        let second = session.committer().unwrap();
        assert_eq!(first, second);

        engine.set_identity(
            Path::new("/r"),
            Some(Identity {
                name: "Changed".to_string(),
                email: "changed@example.com".to_string(),
                when: 5,
            }),
        );
        assert_eq!(session.committer().unwrap().name, "Changed");

        let calls = engine
            .operations()
            .iter()
            .filter(|op| matches!(op, crate::vcs::mock::MockOperation::DefaultIdentity))
            .count();
        assert_eq!(calls, 3);
    }

    #[test]
    fn separately_opened_sessions_do_not_share() {
        let engine = MockEngine::new().with_repo("/r", MockRepo::new());
        let a = open(&engine);
        let b = open(&engine);
        assert!(!a.shares_repository_with(&b));
        assert!(a.shares_repository_with(&a));
    }

    #[test]
    fn settle_records_only_failures() {
        let mut session = RepositorySession::invalid(Config::default());

        let _ = session.settle::<()>(Err(OperationError::new(ErrorKind::BadRepo)));
        assert_eq!(session.last_error().map(|e| e.kind), Some(ErrorKind::BadRepo));

        session.clear_error();
        let _ = session.settle(Ok(()));
        assert!(session.last_error().is_none());
    }

    #[test]
    fn resolve_remote_on_invalid_session() {
        let mut session = RepositorySession::invalid(Config::default());
        let err = session.resolve_remote("origin", None).err().unwrap();
        assert_eq!(err.kind, ErrorKind::BadRepo);
    }
}
