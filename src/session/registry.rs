//! session::registry
//!
//! Process-wide keyed store of open repositories.
//!
//! # Keys
//!
//! Keys are opaque integers handed to the host. A key maps to the shared
//! repository resource, not to a particular session: looking a key up
//! yields a fresh session over the same resource. Removing a key never
//! releases the resource itself; sessions still holding it keep it alive.
//!
//! # Locking
//!
//! All registry state sits behind a single mutex. The lock is held only
//! for map access, never across engine calls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, warn};

use super::error::{ErrorKind, OperationError};
use super::handle::RepositorySession;
use crate::core::config::{Config, ConfigError};
use crate::core::types::{SessionKey, SessionRef};
use crate::vcs::{Engine, EngineError, Repo};

/// Errors from registry operations.
///
/// Every variant is reported to the host as [`ErrorKind::BadRepo`].
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cannot open repository at '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: EngineError,
    },

    #[error("unknown session key {0}")]
    UnknownKey(SessionKey),

    #[error("session already has key {0}")]
    AlreadyKeyed(SessionKey),

    #[error("session key {0} is mapped to another repository")]
    KeyInUse(SessionKey),

    #[error("session has no key")]
    NotKeyed,

    #[error("session has no open repository")]
    InvalidSession,

    #[error("repository configuration: {0}")]
    Config(#[from] ConfigError),
}

impl RegistryError {
    /// The operation error reported to the host.
    pub fn to_operation_error(&self) -> OperationError {
        let diagnostic = match self {
            RegistryError::Open { source, .. } => source.diagnostic().to_string(),
            other => other.to_string(),
        };
        OperationError::with_diagnostic(ErrorKind::BadRepo, diagnostic)
    }
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<SessionKey, Arc<dyn Repo>>,
    next_key: u64,
}

/// Keyed store of open repositories.
pub struct SessionRegistry {
    engine: Arc<dyn Engine>,
    config: Config,
    inner: Mutex<RegistryInner>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}

impl SessionRegistry {
    /// Create an empty registry over `engine`.
    ///
    /// `config` is the global configuration; each opened repository
    /// overlays its own repo-scope file on top of it.
    pub fn new(engine: Arc<dyn Engine>, config: Config) -> Self {
        Self {
            engine,
            config,
            inner: Mutex::new(RegistryInner {
                entries: HashMap::new(),
                next_key: 1,
            }),
        }
    }

    /// The global configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open the repository at `path` as an unkeyed session.
    pub fn open(&self, path: &Path) -> Result<RepositorySession, RegistryError> {
        let repo = self.engine.open(path).map_err(|source| RegistryError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let config = self.config.with_repo(&repo.git_dir())?;
        debug!(path = %path.display(), "opened session");
        Ok(RepositorySession::new(repo, config))
    }

    /// A keyed session over the resource registered under `key`.
    pub fn lookup(&self, key: SessionKey) -> Result<RepositorySession, RegistryError> {
        let repo = self
            .lock()
            .entries
            .get(&key)
            .cloned()
            .ok_or(RegistryError::UnknownKey(key))?;
        let config = self.config.with_repo(&repo.git_dir())?;

        let mut session = RepositorySession::new(repo, config);
        session.key = Some(key);
        Ok(session)
    }

    /// Register `session`'s resource under `key`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidSession`] if the session has no repository
    /// - [`RegistryError::AlreadyKeyed`] if the session already has a key
    /// - [`RegistryError::KeyInUse`] if `key` maps to a different resource
    pub fn assign_key(
        &self,
        session: &mut RepositorySession,
        key: SessionKey,
    ) -> Result<(), RegistryError> {
        let repo = Self::keyable(session)?;
        Self::insert(&mut self.lock(), key, repo)?;

        session.key = Some(key);
        debug!(%key, "assigned session key");
        Ok(())
    }

    /// Register `session` under the next free key and return it.
    ///
    /// Picking the key and installing the mapping happen under one lock.
    pub fn register(&self, session: &mut RepositorySession) -> Result<SessionKey, RegistryError> {
        let repo = Self::keyable(session)?;
        let key = {
            let mut inner = self.lock();
            let mut candidate = inner.next_key;
            while inner.entries.contains_key(&SessionKey::new(candidate)) {
                candidate += 1;
            }
            let key = SessionKey::new(candidate);
            Self::insert(&mut inner, key, repo)?;
            key
        };

        session.key = Some(key);
        debug!(%key, "registered session");
        Ok(key)
    }

    /// The resource of a session that may take a key.
    fn keyable(session: &RepositorySession) -> Result<Arc<dyn Repo>, RegistryError> {
        let repo = session.repo().cloned().ok_or(RegistryError::InvalidSession)?;
        match session.key() {
            Some(existing) => Err(RegistryError::AlreadyKeyed(existing)),
            None => Ok(repo),
        }
    }

    /// Install `key -> repo` on an already locked registry.
    fn insert(
        inner: &mut MutexGuard<'_, RegistryInner>,
        key: SessionKey,
        repo: Arc<dyn Repo>,
    ) -> Result<(), RegistryError> {
        if inner.entries.contains_key(&key) {
            return Err(RegistryError::KeyInUse(key));
        }
        inner.entries.insert(key, repo);
        inner.next_key = inner.next_key.max(key.get().saturating_add(1));
        Ok(())
    }

    /// Remove `session`'s key mapping without releasing the resource.
    ///
    /// The session becomes unkeyed and now owns its resource.
    pub fn release_key(&self, session: &mut RepositorySession) -> Result<SessionKey, RegistryError> {
        let key = session.key().ok_or(RegistryError::NotKeyed)?;
        if self.lock().entries.remove(&key).is_none() {
            warn!(%key, "released key was not registered");
        }
        session.key = None;
        debug!(%key, "released session key");
        Ok(key)
    }

    /// Remove the mapping for `key` without releasing the resource.
    ///
    /// For hosts that hold only the integer handle. Sessions already looked
    /// up under `key` keep the resource alive and keep reporting the key.
    pub fn release(&self, key: SessionKey) -> Result<(), RegistryError> {
        if self.lock().entries.remove(&key).is_none() {
            return Err(RegistryError::UnknownKey(key));
        }
        debug!(%key, "released key");
        Ok(())
    }

    /// Resolve a host reference into a session.
    ///
    /// Never fails: an unknown key or unopenable path yields an invalid
    /// session whose last error says why.
    pub fn acquire(&self, reference: &SessionRef) -> RepositorySession {
        let result = match reference {
            SessionRef::Path(path) => self.open(path),
            SessionRef::Key(key) => self.lookup(*key),
        };
        match result {
            Ok(session) => session,
            Err(e) => {
                debug!(error = %e, "handing out invalid session");
                let mut session = RepositorySession::invalid(self.config.clone());
                session.record_error(e.to_operation_error());
                session
            }
        }
    }

    /// Close a session, releasing its cached remote and, if it is the last
    /// owner, the repository resource.
    pub fn close(&self, session: RepositorySession) {
        debug!(key = ?session.key(), "close requested");
        drop(session);
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: SessionKey) -> bool {
        self.lock().entries.contains_key(&key)
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no keys are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::mock::{MockEngine, MockOperation, MockRepo};

    fn registry() -> (MockEngine, SessionRegistry) {
        let engine = MockEngine::new()
            .with_repo("/a", MockRepo::new())
            .with_repo("/b", MockRepo::new());
        let registry = SessionRegistry::new(Arc::new(engine.clone()), Config::default());
        (engine, registry)
    }

    mod open_and_lookup {
        use super::*;

        #[test]
        fn open_unknown_path_is_bad_repo() {
            let (_, registry) = registry();
            let err = registry.open(Path::new("/missing")).unwrap_err();
            assert!(matches!(err, RegistryError::Open { .. }));
            assert_eq!(err.to_operation_error().kind, ErrorKind::BadRepo);
        }

        #[test]
        fn lookup_shares_the_resource() {
            let (_, registry) = registry();
            let mut session = registry.open(Path::new("/a")).unwrap();
            registry.assign_key(&mut session, SessionKey::new(7)).unwrap();

            let found = registry.lookup(SessionKey::new(7)).unwrap();
            assert!(found.shares_repository_with(&session));
            assert_eq!(found.key(), Some(SessionKey::new(7)));
        }

        #[test]
        fn lookup_unknown_key() {
            let (_, registry) = registry();
            assert!(matches!(
                registry.lookup(SessionKey::new(3)),
                Err(RegistryError::UnknownKey(_))
            ));
        }
    }

    mod keys {
        use super::*;

        #[test]
        fn rekeying_is_rejected() {
            let (_, registry) = registry();
            let mut session = registry.open(Path::new("/a")).unwrap();
            registry.assign_key(&mut session, SessionKey::new(1)).unwrap();

            let err = registry
                .assign_key(&mut session, SessionKey::new(2))
                .unwrap_err();
            assert!(matches!(err, RegistryError::AlreadyKeyed(k) if k.get() == 1));
            assert!(!registry.contains(SessionKey::new(2)));
        }

        #[test]
        fn key_in_use_is_rejected() {
            let (_, registry) = registry();
            let mut a = registry.open(Path::new("/a")).unwrap();
            let mut b = registry.open(Path::new("/b")).unwrap();
            registry.assign_key(&mut a, SessionKey::new(1)).unwrap();

            assert!(matches!(
                registry.assign_key(&mut b, SessionKey::new(1)),
                Err(RegistryError::KeyInUse(_))
            ));
            assert_eq!(b.key(), None);
        }

        #[test]
        fn invalid_session_cannot_be_keyed() {
            let (_, registry) = registry();
            let mut session = RepositorySession::invalid(Config::default());
            assert!(matches!(
                registry.assign_key(&mut session, SessionKey::new(1)),
                Err(RegistryError::InvalidSession)
            ));
        }

        #[test]
        fn register_allocates_increasing_keys() {
            let (_, registry) = registry();
            let mut a = registry.open(Path::new("/a")).unwrap();
            let mut b = registry.open(Path::new("/b")).unwrap();

            let ka = registry.register(&mut a).unwrap();
            let kb = registry.register(&mut b).unwrap();

            assert!(kb.get() > ka.get());
            assert_eq!(registry.len(), 2);
        }

        #[test]
        fn register_skips_explicit_keys() {
            let (_, registry) = registry();
            let mut a = registry.open(Path::new("/a")).unwrap();
            let mut b = registry.open(Path::new("/b")).unwrap();
            registry.assign_key(&mut a, SessionKey::new(1)).unwrap();

            let kb = registry.register(&mut b).unwrap();
            assert_eq!(kb.get(), 2);
        }

        #[test]
        fn release_keeps_resource_alive() {
            let (_, registry) = registry();
            let mut session = registry.open(Path::new("/a")).unwrap();
            let key = registry.register(&mut session).unwrap();
            let looked_up = registry.lookup(key).unwrap();

            let released = registry.release_key(&mut session).unwrap();

            assert_eq!(released, key);
            assert_eq!(session.key(), None);
            assert!(!registry.contains(key));
            assert!(registry.is_empty());
            assert!(session.is_valid());
            assert!(session.shares_repository_with(&looked_up));
        }

        #[test]
        fn release_unkeyed_session() {
            let (_, registry) = registry();
            let mut session = registry.open(Path::new("/a")).unwrap();
            assert!(matches!(
                registry.release_key(&mut session),
                Err(RegistryError::NotKeyed)
            ));
        }

        #[test]
        fn release_by_key_alone() {
            let (_, registry) = registry();
            let mut session = registry.open(Path::new("/a")).unwrap();
            let key = registry.register(&mut session).unwrap();
            let looked_up = registry.lookup(key).unwrap();

            registry.release(key).unwrap();

            assert!(!registry.contains(key));
            assert!(looked_up.is_valid());
            assert!(looked_up.shares_repository_with(&session));
            assert!(matches!(
                registry.release(key),
                Err(RegistryError::UnknownKey(k)) if k == key
            ));
        }

        #[test]
        fn concurrent_register_never_collides() {
            let (_, registry) = registry();
            let registry = Arc::new(registry);

            for _ in 0..50 {
                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        let registry = Arc::clone(&registry);
                        std::thread::spawn(move || {
                            let mut session = registry.open(Path::new("/a")).unwrap();
                            registry.register(&mut session).map(|_| ())
                        })
                    })
                    .collect();

                for handle in handles {
                    assert!(handle.join().unwrap().is_ok());
                }
            }
            assert_eq!(registry.len(), 400);
        }
    }

    mod acquire {
        use super::*;

        #[test]
        fn by_path_and_by_key() {
            let (_, registry) = registry();
            let by_path = registry.acquire(&SessionRef::Path(PathBuf::from("/a")));
            assert!(by_path.is_valid());
            assert_eq!(by_path.key(), None);

            let mut keyed = registry.open(Path::new("/b")).unwrap();
            let key = registry.register(&mut keyed).unwrap();
            let by_key = registry.acquire(&SessionRef::Key(key));
            assert!(by_key.shares_repository_with(&keyed));
        }

        #[test]
        fn unknown_reference_yields_invalid_session() {
            let (engine, registry) = registry();
            engine.clear_operations();

            let session = registry.acquire(&SessionRef::Key(SessionKey::new(99)));

            assert!(!session.is_valid());
            assert_eq!(session.last_error().map(|e| e.kind), Some(ErrorKind::BadRepo));
            assert!(engine.operations().is_empty());
        }

        #[test]
        fn close_keyed_session_keeps_entry() {
            let (engine, registry) = registry();
            let mut session = registry.open(Path::new("/a")).unwrap();
            let key = registry.register(&mut session).unwrap();

            registry.close(session);

            assert!(registry.contains(key));
            assert!(registry.lookup(key).unwrap().is_valid());
            assert!(engine
                .operations()
                .iter()
                .all(|op| !matches!(op, MockOperation::ReleaseRemote { .. })));
        }
    }
}
