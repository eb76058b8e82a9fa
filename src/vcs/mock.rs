//! vcs::mock
//!
//! Mock engine implementation for deterministic testing.
//!
//! # Design
//!
//! The mock engine stores repositories in memory, keyed by the path they
//! are opened from. Every engine call and every resource release is
//! appended to an operation log so tests can check call order and that
//! connections, push-sets and remotes were released on every path.
//!
//! # Example
//!
//! ```
//! use repolink::vcs::mock::{MockEngine, MockOperation, MockRepo};
//! use repolink::vcs::{Connection, Direction, Engine, NoProgress, Remote, Repo};
//! use std::path::Path;
//!
//! let engine = MockEngine::new()
//!     .with_repo("/work/demo", MockRepo::new().remote("origin", "https://example.com/demo.git"));
//!
//! let repo = engine.open(Path::new("/work/demo")).unwrap();
//! let mut remote = repo.load_remote("origin").unwrap();
//! {
//!     let mut connection = remote.connect(Direction::Fetch).unwrap();
//!     connection.download(&NoProgress).unwrap();
//! }
//!
//! assert!(engine
//!     .operations()
//!     .contains(&MockOperation::Disconnect { remote: "origin".to_string() }));
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{
    AllowedMechanisms, BranchKind, Connection, Credential, CredentialSource, Direction, Engine,
    EngineError, Identity, PackStage, ProgressEvent, ProgressSink, PushSet, RefUpdateStatus,
    Remote, RemoteDetails, Repo, RepoLayout, RepoState, StatusCategory, StatusEntry,
    StatusOptions,
};
use crate::core::types::RefSpec;

/// Mock engine for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping. Clones share state,
/// so a test can keep one handle for inspection after giving another to the
/// code under test.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    inner: Arc<Mutex<MockInner>>,
}

#[derive(Debug, Default)]
struct MockInner {
    /// Repositories by open path.
    repos: HashMap<PathBuf, MockRepo>,
    /// Operation to fail on (for testing error paths).
    fail_on: Option<FailOn>,
    /// Recorded operations for verification.
    operations: Vec<MockOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail `Engine::open`.
    Open(EngineError),
    /// Fail `Repo::default_identity`.
    DefaultIdentity(EngineError),
    /// Fail every repository enumeration (layout, remotes, branches,
    /// statuses, conflicts).
    Enumerate(EngineError),
    /// Fail `Repo::load_remote`.
    LoadRemote(EngineError),
    /// Fail `Remote::install_credentials`.
    InstallCredentials(EngineError),
    /// Fail `Remote::connect`.
    Connect(EngineError),
    /// Fail `Connection::download`.
    Download(EngineError),
    /// Fail `Connection::update_tips`.
    UpdateTips(EngineError),
    /// Fail `Connection::new_push`.
    NewPush(EngineError),
    /// Fail `PushSet::add_refspec`.
    AddRefspec(EngineError),
    /// Fail `PushSet::finish`.
    Finish(EngineError),
    /// Let `PushSet::finish` succeed but report that the remote failed to
    /// unpack.
    UnpackRejected,
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    Open {
        path: PathBuf,
    },
    DefaultIdentity,
    LoadRemote {
        name: String,
    },
    InstallCredentials {
        remote: String,
    },
    Connect {
        remote: String,
        direction: Direction,
    },
    ResolvedCredential {
        remote: String,
        credential: Credential,
    },
    Download {
        remote: String,
    },
    UpdateTips {
        remote: String,
        committer: Option<String>,
        message: String,
        prune: bool,
    },
    NewPush {
        remote: String,
    },
    AddRefspec {
        remote: String,
        refspec: String,
    },
    Finish {
        remote: String,
    },
    ReleasePushSet {
        remote: String,
    },
    Disconnect {
        remote: String,
    },
    ReleaseRemote {
        remote: String,
    },
}

/// In-memory repository contents.
#[derive(Debug, Clone)]
pub struct MockRepo {
    layout: RepoLayout,
    identity: Option<Identity>,
    conflicts: Vec<String>,
    remotes: Vec<(String, MockRemote)>,
    local_branches: Vec<String>,
    remote_branches: Vec<String>,
    statuses: Vec<StatusEntry>,
}

impl Default for MockRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRepo {
    /// A clean, non-bare repository with no remotes and an identity of
    /// `Mock User <mock@example.com>`.
    pub fn new() -> Self {
        Self {
            layout: RepoLayout {
                shallow: false,
                bare: false,
                head_detached: false,
                git_dir: PathBuf::from(".git"),
                work_dir: Some(PathBuf::from(".")),
                namespace: None,
                state: RepoState::Clean,
            },
            identity: Some(Identity {
                name: "Mock User".to_string(),
                email: "mock@example.com".to_string(),
                when: 0,
            }),
            conflicts: Vec::new(),
            remotes: Vec::new(),
            local_branches: Vec::new(),
            remote_branches: Vec::new(),
            statuses: Vec::new(),
        }
    }

    /// Replace the layout flags and paths.
    pub fn layout(mut self, layout: RepoLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the in-progress operation state.
    pub fn state(mut self, state: RepoState) -> Self {
        self.layout.state = state;
        self
    }

    /// Set the configured identity. `None` means no identity is configured.
    pub fn identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }

    /// Add a remote with a fetch URL and default settings.
    pub fn remote(self, name: &str, url: &str) -> Self {
        self.remote_with(name, MockRemote::new(url))
    }

    /// Add a fully configured remote.
    pub fn remote_with(mut self, name: &str, remote: MockRemote) -> Self {
        self.remotes.push((name.to_string(), remote));
        self
    }

    /// Add a local branch.
    pub fn local_branch(mut self, name: &str) -> Self {
        self.local_branches.push(name.to_string());
        self
    }

    /// Add a remote-tracking branch.
    pub fn remote_branch(mut self, name: &str) -> Self {
        self.remote_branches.push(name.to_string());
        self
    }

    /// Add a path with unresolved conflicts.
    pub fn conflict(mut self, path: &str) -> Self {
        self.conflicts.push(path.to_string());
        self
    }

    /// Add a changed path.
    pub fn status(mut self, path: &str, categories: &[StatusCategory]) -> Self {
        self.statuses.push(StatusEntry {
            path: path.to_string(),
            categories: categories.to_vec(),
        });
        self
    }

    fn find_remote(&self, name: &str) -> Option<&MockRemote> {
        self.remotes.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }
}

/// In-memory remote configuration and behavior.
#[derive(Debug, Clone)]
pub struct MockRemote {
    details: RemoteDetails,
    allowed: AllowedMechanisms,
    objects: usize,
    rejections: Vec<(String, String)>,
}

impl MockRemote {
    /// A remote that needs no authentication and sends three objects.
    pub fn new(url: &str) -> Self {
        Self {
            details: RemoteDetails {
                url: Some(url.to_string()),
                push_url: None,
                fetch_refspecs: Vec::new(),
                push_refspecs: Vec::new(),
            },
            allowed: AllowedMechanisms::default(),
            objects: 3,
            rejections: Vec::new(),
        }
    }

    /// Set a distinct push URL.
    pub fn push_url(mut self, url: &str) -> Self {
        self.details.push_url = Some(url.to_string());
        self
    }

    /// Add a fetch refspec.
    pub fn fetch_refspec(mut self, spec: &str) -> Self {
        self.details.fetch_refspecs.push(spec.to_string());
        self
    }

    /// Add a push refspec.
    pub fn push_refspec(mut self, spec: &str) -> Self {
        self.details.push_refspecs.push(spec.to_string());
        self
    }

    /// Require a credential during the handshake.
    pub fn require_auth(mut self, allowed: AllowedMechanisms) -> Self {
        self.allowed = allowed;
        self
    }

    /// Number of objects a download reports.
    pub fn objects(mut self, objects: usize) -> Self {
        self.objects = objects;
        self
    }

    /// Reject pushes to `refname` with `message`.
    pub fn reject(mut self, refname: &str, message: &str) -> Self {
        self.rejections
            .push((refname.to_string(), message.to_string()));
        self
    }

    fn needs_auth(&self) -> bool {
        let a = self.allowed;
        a.default || a.key_pair || a.plaintext || a.interactive
    }
}

/// Lock the shared state. A panicking test thread must not hide the log
/// from the assertions that follow.
fn lock(inner: &Mutex<MockInner>) -> MutexGuard<'_, MockInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockEngine {
    /// Create an engine with no repositories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a repository reachable at `path`.
    pub fn with_repo(self, path: impl Into<PathBuf>, repo: MockRepo) -> Self {
        lock(&self.inner).repos.insert(path.into(), repo);
        self
    }

    /// Configure the mock to fail on a specific operation.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        lock(&self.inner).fail_on = Some(fail_on);
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        lock(&self.inner).fail_on = None;
    }

    /// Change the configured identity of an already added repository.
    pub fn set_identity(&self, path: &Path, identity: Option<Identity>) {
        if let Some(repo) = lock(&self.inner).repos.get_mut(path) {
            repo.identity = identity;
        }
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        lock(&self.inner).operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        lock(&self.inner).operations.clear();
    }
}

/// Record an operation.
fn record(inner: &Mutex<MockInner>, op: MockOperation) {
    lock(inner).operations.push(op);
}

/// Return the configured error if `op` should fail.
fn check_fail(inner: &Mutex<MockInner>, op: &str) -> Result<(), EngineError> {
    let inner = lock(inner);
    match (&inner.fail_on, op) {
        (Some(FailOn::Open(e)), "open")
        | (Some(FailOn::DefaultIdentity(e)), "default_identity")
        | (Some(FailOn::Enumerate(e)), "enumerate")
        | (Some(FailOn::LoadRemote(e)), "load_remote")
        | (Some(FailOn::InstallCredentials(e)), "install_credentials")
        | (Some(FailOn::Connect(e)), "connect")
        | (Some(FailOn::Download(e)), "download")
        | (Some(FailOn::UpdateTips(e)), "update_tips")
        | (Some(FailOn::NewPush(e)), "new_push")
        | (Some(FailOn::AddRefspec(e)), "add_refspec")
        | (Some(FailOn::Finish(e)), "finish") => Err(e.clone()),
        _ => Ok(()),
    }
}

impl Engine for MockEngine {
    fn open(&self, path: &Path) -> Result<Arc<dyn Repo>, EngineError> {
        record(
            &self.inner,
            MockOperation::Open {
                path: path.to_path_buf(),
            },
        );
        check_fail(&self.inner, "open")?;

        if !lock(&self.inner).repos.contains_key(path) {
            return Err(EngineError::NotARepo {
                path: path.to_path_buf(),
                message: format!("could not find repository at '{}'", path.display()),
            });
        }

        Ok(Arc::new(MockRepoHandle {
            inner: Arc::clone(&self.inner),
            path: path.to_path_buf(),
        }))
    }
}

/// An opened mock repository.
#[derive(Debug)]
struct MockRepoHandle {
    inner: Arc<Mutex<MockInner>>,
    path: PathBuf,
}

impl MockRepoHandle {
    fn read<T>(&self, f: impl FnOnce(&MockRepo) -> T) -> Result<T, EngineError> {
        let inner = lock(&self.inner);
        inner
            .repos
            .get(&self.path)
            .map(f)
            .ok_or_else(|| EngineError::internal("repository was removed"))
    }

    fn enumerate<T>(&self, f: impl FnOnce(&MockRepo) -> T) -> Result<T, EngineError> {
        check_fail(&self.inner, "enumerate")?;
        self.read(f)
    }
}

impl Repo for MockRepoHandle {
    fn git_dir(&self) -> PathBuf {
        self.read(|r| self.path.join(&r.layout.git_dir))
            .unwrap_or_else(|_| self.path.join(".git"))
    }

    fn default_identity(&self) -> Result<Identity, EngineError> {
        record(&self.inner, MockOperation::DefaultIdentity);
        check_fail(&self.inner, "default_identity")?;
        self.read(|r| r.identity.clone())?
            .ok_or_else(|| EngineError::NotFound {
                message: "config value 'user.name' was not found".to_string(),
            })
    }

    fn layout(&self) -> Result<RepoLayout, EngineError> {
        self.enumerate(|r| {
            let mut layout = r.layout.clone();
            layout.git_dir = self.path.join(&r.layout.git_dir);
            layout.work_dir = r.layout.work_dir.as_ref().map(|w| self.path.join(w));
            layout
        })
    }

    fn conflicts(&self) -> Result<Vec<String>, EngineError> {
        self.enumerate(|r| r.conflicts.clone())
    }

    fn remote_names(&self) -> Result<Vec<String>, EngineError> {
        self.enumerate(|r| r.remotes.iter().map(|(n, _)| n.clone()).collect())
    }

    fn remote_details(&self, name: &str) -> Result<RemoteDetails, EngineError> {
        self.read(|r| r.find_remote(name).map(|remote| remote.details.clone()))?
            .ok_or_else(|| EngineError::NotFound {
                message: format!("remote '{}' does not exist", name),
            })
    }

    fn branches(&self, kind: BranchKind) -> Result<Vec<String>, EngineError> {
        self.enumerate(|r| match kind {
            BranchKind::Local => r.local_branches.clone(),
            BranchKind::Remote => r.remote_branches.clone(),
        })
    }

    fn statuses(&self, options: &StatusOptions) -> Result<Vec<StatusEntry>, EngineError> {
        let include_untracked = options.include_untracked;
        self.enumerate(|r| {
            r.statuses
                .iter()
                .filter_map(|entry| {
                    let categories: Vec<_> = entry
                        .categories
                        .iter()
                        .copied()
                        .filter(|c| include_untracked || *c != StatusCategory::Untracked)
                        .collect();
                    (!categories.is_empty()).then(|| StatusEntry {
                        path: entry.path.clone(),
                        categories,
                    })
                })
                .collect()
        })
    }

    fn load_remote(&self, name: &str) -> Result<Box<dyn Remote>, EngineError> {
        record(
            &self.inner,
            MockOperation::LoadRemote {
                name: name.to_string(),
            },
        );
        check_fail(&self.inner, "load_remote")?;

        let remote = self
            .read(|r| r.find_remote(name).cloned())?
            .ok_or_else(|| EngineError::NotFound {
                message: format!("remote '{}' does not exist", name),
            })?;

        Ok(Box::new(MockRemoteHandle {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
            remote,
            credentials: None,
        }))
    }
}

/// A loaded mock remote.
struct MockRemoteHandle {
    inner: Arc<Mutex<MockInner>>,
    name: String,
    remote: MockRemote,
    credentials: Option<Arc<dyn CredentialSource>>,
}

impl Remote for MockRemoteHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn install_credentials(&mut self, source: Arc<dyn CredentialSource>) -> Result<(), EngineError> {
        record(
            &self.inner,
            MockOperation::InstallCredentials {
                remote: self.name.clone(),
            },
        );
        check_fail(&self.inner, "install_credentials")?;
        self.credentials = Some(source);
        Ok(())
    }

    fn connect(&mut self, direction: Direction) -> Result<Box<dyn Connection + '_>, EngineError> {
        record(
            &self.inner,
            MockOperation::Connect {
                remote: self.name.clone(),
                direction,
            },
        );
        check_fail(&self.inner, "connect")?;

        if self.remote.needs_auth() {
            let source = self.credentials.as_ref().ok_or_else(|| EngineError::Auth {
                message: "no credential resolver installed".to_string(),
            })?;
            let credential = source
                .resolve(self.remote.allowed, None)
                .map_err(|e| EngineError::Auth {
                    message: e.to_string(),
                })?;
            record(
                &self.inner,
                MockOperation::ResolvedCredential {
                    remote: self.name.clone(),
                    credential,
                },
            );
        }

        Ok(Box::new(MockConnection { remote: self }))
    }
}

impl Drop for MockRemoteHandle {
    fn drop(&mut self) {
        record(
            &self.inner,
            MockOperation::ReleaseRemote {
                remote: self.name.clone(),
            },
        );
    }
}

struct MockConnection<'a> {
    remote: &'a MockRemoteHandle,
}

impl Connection for MockConnection<'_> {
    fn download(&mut self, progress: &dyn ProgressSink) -> Result<(), EngineError> {
        let remote = self.remote;
        record(
            &remote.inner,
            MockOperation::Download {
                remote: remote.name.clone(),
            },
        );
        check_fail(&remote.inner, "download")?;

        let total = remote.remote.objects;
        for received in 1..=total {
            progress.report(ProgressEvent::Transfer {
                received_objects: received,
                total_objects: total,
                received_bytes: received * 100,
            });
        }
        Ok(())
    }

    fn update_tips(
        &mut self,
        committer: Option<&Identity>,
        message: &str,
        prune: bool,
    ) -> Result<(), EngineError> {
        let remote = self.remote;
        record(
            &remote.inner,
            MockOperation::UpdateTips {
                remote: remote.name.clone(),
                committer: committer.map(|c| c.email.clone()),
                message: message.to_string(),
                prune,
            },
        );
        check_fail(&remote.inner, "update_tips")
    }

    fn new_push(&mut self) -> Result<Box<dyn PushSet + '_>, EngineError> {
        let remote = self.remote;
        record(
            &remote.inner,
            MockOperation::NewPush {
                remote: remote.name.clone(),
            },
        );
        check_fail(&remote.inner, "new_push")?;

        Ok(Box::new(MockPushSet {
            remote,
            refspecs: Vec::new(),
            unpack_ok: true,
            statuses: Vec::new(),
        }))
    }
}

impl Drop for MockConnection<'_> {
    fn drop(&mut self) {
        record(
            &self.remote.inner,
            MockOperation::Disconnect {
                remote: self.remote.name.clone(),
            },
        );
    }
}

struct MockPushSet<'a> {
    remote: &'a MockRemoteHandle,
    refspecs: Vec<RefSpec>,
    unpack_ok: bool,
    statuses: Vec<RefUpdateStatus>,
}

impl PushSet for MockPushSet<'_> {
    fn add_refspec(&mut self, refspec: &RefSpec) -> Result<(), EngineError> {
        record(
            &self.remote.inner,
            MockOperation::AddRefspec {
                remote: self.remote.name.clone(),
                refspec: refspec.to_string(),
            },
        );
        check_fail(&self.remote.inner, "add_refspec")?;
        self.refspecs.push(refspec.clone());
        Ok(())
    }

    fn finish(&mut self, progress: &dyn ProgressSink) -> Result<(), EngineError> {
        record(
            &self.remote.inner,
            MockOperation::Finish {
                remote: self.remote.name.clone(),
            },
        );
        check_fail(&self.remote.inner, "finish")?;

        let total = self.refspecs.len();
        for stage in [PackStage::AddingObjects, PackStage::Deltafication] {
            for current in 1..=total {
                progress.report(ProgressEvent::PackBuilding {
                    stage,
                    current,
                    total,
                });
            }
        }

        if matches!(lock(&self.remote.inner).fail_on, Some(FailOn::UnpackRejected)) {
            self.unpack_ok = false;
            return Ok(());
        }

        let rejections = &self.remote.remote.rejections;
        self.statuses = self
            .refspecs
            .iter()
            .map(|spec| {
                let refname = spec.destination().to_string();
                let rejection = rejections
                    .iter()
                    .find(|(r, _)| *r == refname)
                    .map(|(_, message)| message.clone());
                RefUpdateStatus { refname, rejection }
            })
            .collect();
        Ok(())
    }

    fn unpack_ok(&self) -> bool {
        self.unpack_ok
    }

    fn ref_statuses(&self) -> Vec<RefUpdateStatus> {
        self.statuses.clone()
    }
}

impl Drop for MockPushSet<'_> {
    fn drop(&mut self) {
        record(
            &self.remote.inner,
            MockOperation::ReleasePushSet {
                remote: self.remote.name.clone(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::NoProgress;

    fn engine() -> MockEngine {
        MockEngine::new().with_repo(
            "/work/demo",
            MockRepo::new()
                .remote_with(
                    "origin",
                    MockRemote::new("https://example.com/demo.git").reject("refs/heads/locked", "protected"),
                )
                .local_branch("main"),
        )
    }

    #[test]
    fn open_unknown_path_fails() {
        let result = engine().open(Path::new("/work/other"));
        assert!(matches!(result, Err(EngineError::NotARepo { .. })));
    }

    #[test]
    fn releases_are_recorded_in_order() {
        let engine = engine();
        let repo = engine.open(Path::new("/work/demo")).unwrap();
        {
            let mut remote = repo.load_remote("origin").unwrap();
            let mut connection = remote.connect(Direction::Push).unwrap();
            let mut push = connection.new_push().unwrap();
            push.add_refspec(&RefSpec::parse("main").unwrap()).unwrap();
            push.finish(&NoProgress).unwrap();
        }

        let ops = engine.operations();
        let tail: Vec<_> = ops.iter().rev().take(3).cloned().collect();
        assert_eq!(
            tail,
            vec![
                MockOperation::ReleaseRemote {
                    remote: "origin".to_string()
                },
                MockOperation::Disconnect {
                    remote: "origin".to_string()
                },
                MockOperation::ReleasePushSet {
                    remote: "origin".to_string()
                },
            ]
        );
    }

    #[test]
    fn rejections_follow_refspec_order() {
        let engine = engine();
        let repo = engine.open(Path::new("/work/demo")).unwrap();
        let mut remote = repo.load_remote("origin").unwrap();
        let mut connection = remote.connect(Direction::Push).unwrap();
        let mut push = connection.new_push().unwrap();
        push.add_refspec(&RefSpec::parse("main").unwrap()).unwrap();
        push.add_refspec(&RefSpec::parse("locked").unwrap()).unwrap();
        push.finish(&NoProgress).unwrap();

        let statuses = push.ref_statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].rejection, None);
        assert_eq!(statuses[1].rejection.as_deref(), Some("protected"));
    }

    #[test]
    fn fail_on_connect() {
        let engine = engine().fail_on(FailOn::Connect(EngineError::Network {
            message: "unreachable".to_string(),
        }));
        let repo = engine.open(Path::new("/work/demo")).unwrap();
        let mut remote = repo.load_remote("origin").unwrap();
        assert!(matches!(
            remote.connect(Direction::Fetch),
            Err(EngineError::Network { .. })
        ));
    }

    #[test]
    fn auth_without_resolver_fails() {
        let engine = MockEngine::new().with_repo(
            "/r",
            MockRepo::new().remote_with(
                "origin",
                MockRemote::new("ssh://git@example.com/r.git").require_auth(AllowedMechanisms {
                    key_pair: true,
                    ..Default::default()
                }),
            ),
        );
        let repo = engine.open(Path::new("/r")).unwrap();
        let mut remote = repo.load_remote("origin").unwrap();
        assert!(matches!(
            remote.connect(Direction::Fetch),
            Err(EngineError::Auth { .. })
        ));
    }

    #[test]
    fn identity_can_change() {
        let engine = engine();
        let repo = engine.open(Path::new("/work/demo")).unwrap();
        assert_eq!(repo.default_identity().unwrap().name, "Mock User");

        engine.set_identity(
            Path::new("/work/demo"),
            Some(Identity {
                name: "Other".to_string(),
                email: "other@example.com".to_string(),
                when: 1,
            }),
        );
        assert_eq!(repo.default_identity().unwrap().name, "Other");

        engine.set_identity(Path::new("/work/demo"), None);
        assert!(repo.default_identity().is_err());
    }
}
