//! session::remote_cache
//!
//! Single-slot cache of a loaded remote per session.
//!
//! The cached remote is reused only while both the remote name and the key
//! file path match exactly. Any mismatch releases the old remote before the
//! new one is loaded, so a session never holds more than one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::credentials::CredentialResolver;
use super::error::{ErrorKind, OperationError};
use crate::vcs::{Remote, Repo};

struct CacheEntry {
    name: String,
    key_file: Option<PathBuf>,
    remote: Box<dyn Remote>,
}

/// A session's cached remote.
#[derive(Default)]
pub struct RemoteCache {
    entry: Option<CacheEntry>,
}

impl std::fmt::Debug for RemoteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCache")
            .field("name", &self.cached_name())
            .field("key_file", &self.cached_key_file())
            .finish()
    }
}

impl RemoteCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the remote for `(name, key_file)`, loading it on a miss.
    ///
    /// On a miss the previous remote is released, the named remote is
    /// loaded from `repo`, and a [`CredentialResolver`] for `key_file` is
    /// installed on it. Any failure leaves the cache empty and reports
    /// [`ErrorKind::BadRemote`].
    pub fn resolve(
        &mut self,
        repo: &dyn Repo,
        name: &str,
        key_file: Option<&Path>,
        public_key_suffix: &str,
    ) -> Result<&mut dyn Remote, OperationError> {
        let hit = matches!(
            &self.entry,
            Some(entry) if entry.name == name && entry.key_file.as_deref() == key_file
        );

        if !hit {
            if let Some(old) = self.entry.take() {
                debug!(remote = %old.name, "releasing cached remote");
            }

            let mut remote = repo
                .load_remote(name)
                .map_err(|e| OperationError::from_engine(ErrorKind::BadRemote, &e))?;

            let resolver = CredentialResolver::new(key_file.map(Path::to_path_buf), public_key_suffix);
            remote
                .install_credentials(Arc::new(resolver))
                .map_err(|e| OperationError::from_engine(ErrorKind::BadRemote, &e))?;

            debug!(remote = name, key_file = ?key_file, "cached remote");
            self.entry = Some(CacheEntry {
                name: name.to_string(),
                key_file: key_file.map(Path::to_path_buf),
                remote,
            });
        }

        match self.entry.as_mut() {
            Some(entry) => Ok(entry.remote.as_mut()),
            None => Err(OperationError::new(ErrorKind::BadRemote)),
        }
    }

    /// Name of the cached remote.
    pub fn cached_name(&self) -> Option<&str> {
        self.entry.as_ref().map(|e| e.name.as_str())
    }

    /// Key file the cached remote was prepared with.
    pub fn cached_key_file(&self) -> Option<&Path> {
        self.entry.as_ref().and_then(|e| e.key_file.as_deref())
    }

    /// Whether a remote is cached.
    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    /// Release the cached remote.
    pub fn clear(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::mock::{FailOn, MockEngine, MockOperation, MockRepo};
    use crate::vcs::{Engine, EngineError};

    fn setup() -> (MockEngine, Arc<dyn Repo>) {
        let engine = MockEngine::new().with_repo(
            "/r",
            MockRepo::new()
                .remote("origin", "https://example.com/r.git")
                .remote("upstream", "https://example.com/u.git"),
        );
        let repo = engine.open(Path::new("/r")).unwrap();
        (engine, repo)
    }

    fn loads(engine: &MockEngine) -> usize {
        engine
            .operations()
            .iter()
            .filter(|op| matches!(op, MockOperation::LoadRemote { .. }))
            .count()
    }

    mod hits {
        use super::*;

        #[test]
        fn same_name_and_key_reuses_remote() {
            let (engine, repo) = setup();
            let mut cache = RemoteCache::new();
            let key = Path::new("/keys/id");

            let first = cache.resolve(repo.as_ref(), "origin", Some(key), ".pub").unwrap() as *const dyn Remote as *const ();
            let second = cache.resolve(repo.as_ref(), "origin", Some(key), ".pub").unwrap() as *const dyn Remote as *const ();

            assert_eq!(first, second);
            assert_eq!(loads(&engine), 1);
        }

        #[test]
        fn no_key_twice_is_a_hit() {
            let (engine, repo) = setup();
            let mut cache = RemoteCache::new();

            cache.resolve(repo.as_ref(), "origin", None, ".pub").unwrap();
            cache.resolve(repo.as_ref(), "origin", None, ".pub").unwrap();

            assert_eq!(loads(&engine), 1);
            assert_eq!(cache.cached_name(), Some("origin"));
            assert_eq!(cache.cached_key_file(), None);
        }
    }

    mod misses {
        use super::*;

        #[test]
        fn different_name_releases_and_reloads() {
            let (engine, repo) = setup();
            let mut cache = RemoteCache::new();

            cache.resolve(repo.as_ref(), "origin", None, ".pub").unwrap();
            cache.resolve(repo.as_ref(), "upstream", None, ".pub").unwrap();

            let ops = engine.operations();
            let release = ops
                .iter()
                .position(|op| *op == MockOperation::ReleaseRemote { remote: "origin".to_string() })
                .unwrap();
            let load = ops
                .iter()
                .position(|op| *op == MockOperation::LoadRemote { name: "upstream".to_string() })
                .unwrap();
            assert!(release < load);
            assert_eq!(cache.cached_name(), Some("upstream"));
        }

        #[test]
        fn different_key_file_reloads() {
            let (engine, repo) = setup();
            let mut cache = RemoteCache::new();

            cache.resolve(repo.as_ref(), "origin", None, ".pub").unwrap();
            cache
                .resolve(repo.as_ref(), "origin", Some(Path::new("/keys/id")), ".pub")
                .unwrap();

            assert_eq!(loads(&engine), 2);
            assert_eq!(cache.cached_key_file(), Some(Path::new("/keys/id")));
        }

        #[test]
        fn unknown_remote_is_bad_remote_and_empties_cache() {
            let (_engine, repo) = setup();
            let mut cache = RemoteCache::new();
            cache.resolve(repo.as_ref(), "origin", None, ".pub").unwrap();

            let err = cache
                .resolve(repo.as_ref(), "missing", None, ".pub")
                .err().unwrap();

            assert_eq!(err.kind, ErrorKind::BadRemote);
            assert!(cache.is_empty());
        }

        #[test]
        fn credential_install_failure_releases_remote() {
            let engine = MockEngine::new()
                .with_repo("/r", MockRepo::new().remote("origin", "https://example.com/r.git"))
                .fail_on(FailOn::InstallCredentials(EngineError::internal("callbacks busy")));
            let repo = engine.open(Path::new("/r")).unwrap();
            let mut cache = RemoteCache::new();

            let err = cache.resolve(repo.as_ref(), "origin", None, ".pub").err().unwrap();

            assert_eq!(err.kind, ErrorKind::BadRemote);
            assert_eq!(err.diagnostic.as_deref(), Some("callbacks busy"));
            assert!(cache.is_empty());
            assert!(engine
                .operations()
                .contains(&MockOperation::ReleaseRemote { remote: "origin".to_string() }));
        }
    }
}
