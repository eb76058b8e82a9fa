//! vcs::traits
//!
//! Capability traits for the version-control engine.
//!
//! # Design
//!
//! The engine owns the object model, transport and ref storage. The rest of
//! the crate only sees these traits and the plain data types below, so the
//! session layer can be driven by [`Git2Engine`](super::Git2Engine) in
//! production and [`MockEngine`](super::mock::MockEngine) in tests.
//!
//! Scoped engine resources are modeled as owned objects whose `Drop`
//! releases them:
//!
//! - a [`Remote`] is released when dropped
//! - a [`Connection`] disconnects when dropped
//! - a [`PushSet`] is freed when dropped
//!
//! All calls are synchronous and block the caller, including network I/O.
//! Progress and credential callbacks run inline on the calling thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::core::types::RefSpec;

/// Errors from engine operations.
///
/// The message carried by each variant is the engine's own diagnostic and
/// is what gets surfaced to the host.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The path does not hold a repository the engine can open.
    #[error("not a repository: {path}: {message}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
        /// Engine diagnostic
        message: String,
    },

    /// A named object (remote, ref, config entry) does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Engine diagnostic
        message: String,
    },

    /// Authentication failed or no credential could be produced.
    #[error("authentication failed: {message}")]
    Auth {
        /// Engine diagnostic
        message: String,
    },

    /// Transport-level failure.
    #[error("network error: {message}")]
    Network {
        /// Engine diagnostic
        message: String,
    },

    /// The remote refused an update.
    #[error("rejected: {message}")]
    Rejected {
        /// Engine diagnostic
        message: String,
    },

    /// Any other engine failure.
    #[error("engine error: {message}")]
    Internal {
        /// Engine diagnostic
        message: String,
    },
}

impl EngineError {
    /// The engine's diagnostic text, without the category prefix.
    pub fn diagnostic(&self) -> &str {
        match self {
            EngineError::NotARepo { message, .. }
            | EngineError::NotFound { message }
            | EngineError::Auth { message }
            | EngineError::Network { message }
            | EngineError::Rejected { message }
            | EngineError::Internal { message } => message,
        }
    }

    /// Shorthand for an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal {
            message: message.into(),
        }
    }
}

/// Errors from credential resolution.
///
/// Never contains secret material.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// The remote offered a mechanism this resolver recognizes but does not
    /// implement.
    #[error("{0} authentication is not implemented")]
    Unimplemented(&'static str),

    /// None of the offered mechanisms can be satisfied.
    #[error("no usable authentication mechanism offered by the remote")]
    NoUsableMechanism,
}

/// Transfer direction for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Download objects and refs.
    Fetch,
    /// Upload objects and update remote refs.
    Push,
}

/// Authentication mechanisms a remote permits during a handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllowedMechanisms {
    /// Default/system credentials (OS-level cached credentials).
    pub default: bool,
    /// Public/private key pair from files.
    pub key_pair: bool,
    /// Plaintext username and password.
    pub plaintext: bool,
    /// Interactive challenge-response.
    pub interactive: bool,
}

/// A credential chosen for a handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Let the engine use default/system credentials.
    Default,
    /// Key-pair authentication from files.
    KeyPair {
        /// User name to authenticate as
        username: String,
        /// Public key file
        public_key: PathBuf,
        /// Private key file
        private_key: PathBuf,
        /// Passphrase for the private key (empty when unencrypted)
        passphrase: String,
    },
}

/// Chooses a credential for a remote handshake.
///
/// Installed on a [`Remote`] and invoked by the engine mid-handshake.
pub trait CredentialSource: Send + Sync {
    /// Pick a credential from the mechanisms the remote permits.
    ///
    /// `username` is the user name embedded in the remote URL, if any.
    fn resolve(
        &self,
        allowed: AllowedMechanisms,
        username: Option<&str>,
    ) -> Result<Credential, CredentialError>;
}

/// Pack-building phases reported while constructing a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackStage {
    /// Collecting the objects to send.
    AddingObjects,
    /// Computing deltas.
    Deltafication,
}

impl std::fmt::Display for PackStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackStage::AddingObjects => write!(f, "adding objects"),
            PackStage::Deltafication => write!(f, "deltafication"),
        }
    }
}

/// A progress notification raised by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Object download progress.
    Transfer {
        /// Objects received so far
        received_objects: usize,
        /// Objects the remote will send
        total_objects: usize,
        /// Bytes received so far
        received_bytes: usize,
    },
    /// Pack construction progress during a push.
    PackBuilding {
        /// Current phase
        stage: PackStage,
        /// Items processed in this phase
        current: usize,
        /// Items in this phase
        total: usize,
    },
}

/// Receives engine progress while an operation runs.
///
/// `report` is called inline from the engine and may block; the engine
/// does not continue until it returns.
pub trait ProgressSink {
    /// Deliver one event. Returns whether the receiver acknowledged it.
    fn report(&self, event: ProgressEvent) -> bool;
}

/// A sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: ProgressEvent) -> bool {
        true
    }
}

/// A committer identity generated from repository configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Configured user name
    pub name: String,
    /// Configured user email
    pub email: String,
    /// Seconds since the Unix epoch when the identity was generated
    pub when: i64,
}

/// In-progress operation state of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    /// No operation in progress.
    Clean,
    /// Merge in progress.
    Merge,
    /// Revert in progress.
    Revert,
    /// Multi-commit revert in progress.
    RevertSequence,
    /// Cherry-pick in progress.
    CherryPick,
    /// Multi-commit cherry-pick in progress.
    CherryPickSequence,
    /// Bisect in progress.
    Bisect,
    /// Rebase in progress.
    Rebase,
    /// Interactive rebase in progress.
    RebaseInteractive,
    /// Merge-based rebase in progress.
    RebaseMerge,
    /// `git am` in progress.
    ApplyMailbox,
    /// `git am` or rebase in progress.
    ApplyMailboxOrRebase,
}

impl RepoState {
    /// Stable name used in serialized output.
    pub fn name(&self) -> &'static str {
        match self {
            RepoState::Clean => "Clean",
            RepoState::Merge => "Merge",
            RepoState::Revert => "Revert",
            RepoState::RevertSequence => "RevertSequence",
            RepoState::CherryPick => "CherryPick",
            RepoState::CherryPickSequence => "CherryPickSequence",
            RepoState::Bisect => "Bisect",
            RepoState::Rebase => "Rebase",
            RepoState::RebaseInteractive => "RebaseInteractive",
            RepoState::RebaseMerge => "RebaseMerge",
            RepoState::ApplyMailbox => "ApplyMailbox",
            RepoState::ApplyMailboxOrRebase => "ApplyMailboxOrRebase",
        }
    }
}

impl std::fmt::Display for RepoState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Top-level repository facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLayout {
    /// Shallow clone
    pub shallow: bool,
    /// No working directory
    pub bare: bool,
    /// HEAD points directly at a commit
    pub head_detached: bool,
    /// Path to the git directory
    pub git_dir: PathBuf,
    /// Path to the working directory (`None` when bare)
    pub work_dir: Option<PathBuf>,
    /// Active ref namespace
    pub namespace: Option<String>,
    /// In-progress operation
    pub state: RepoState,
}

/// Which branches to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    /// `refs/heads/*`
    Local,
    /// `refs/remotes/*`
    Remote,
}

/// Configuration of one remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDetails {
    /// Fetch URL
    pub url: Option<String>,
    /// Distinct push URL, if configured
    pub push_url: Option<String>,
    /// Fetch refspecs in configuration order
    pub fetch_refspecs: Vec<String>,
    /// Push refspecs in configuration order
    pub push_refspecs: Vec<String>,
}

/// Flags for status computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusOptions {
    /// Report untracked files
    pub include_untracked: bool,
    /// Descend into untracked directories
    pub recurse_untracked_dirs: bool,
    /// Detect renames between HEAD and the index
    pub renames_head_to_index: bool,
}

impl Default for StatusOptions {
    fn default() -> Self {
        Self {
            include_untracked: true,
            recurse_untracked_dirs: true,
            renames_head_to_index: true,
        }
    }
}

/// Change classification for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCategory {
    /// New in the working tree
    Untracked,
    /// Modified in the working tree
    Modified,
    /// Deleted from the working tree
    Deleted,
    /// Type changed in the working tree
    TypeChange,
    /// Added to the index
    IndexNew,
    /// Modified in the index
    IndexModified,
    /// Deleted from the index
    IndexDeleted,
    /// Type changed in the index
    IndexTypeChange,
    /// Renamed in the index
    IndexRenamed,
}

impl StatusCategory {
    /// All categories in serialization order.
    pub const ALL: [StatusCategory; 9] = [
        StatusCategory::Untracked,
        StatusCategory::Modified,
        StatusCategory::Deleted,
        StatusCategory::TypeChange,
        StatusCategory::IndexNew,
        StatusCategory::IndexModified,
        StatusCategory::IndexDeleted,
        StatusCategory::IndexTypeChange,
        StatusCategory::IndexRenamed,
    ];

    /// Stable name used in serialized output.
    pub fn name(&self) -> &'static str {
        match self {
            StatusCategory::Untracked => "Untracked",
            StatusCategory::Modified => "Modified",
            StatusCategory::Deleted => "Deleted",
            StatusCategory::TypeChange => "TypeChange",
            StatusCategory::IndexNew => "IndexNew",
            StatusCategory::IndexModified => "IndexModified",
            StatusCategory::IndexDeleted => "IndexDeleted",
            StatusCategory::IndexTypeChange => "IndexTypeChange",
            StatusCategory::IndexRenamed => "IndexRenamed",
        }
    }
}

/// Status of one path. A path can fall in several categories at once
/// (e.g. staged and then modified again).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Repository-relative path
    pub path: String,
    /// Categories that apply
    pub categories: Vec<StatusCategory>,
}

/// The remote's verdict on one pushed ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdateStatus {
    /// Remote ref name
    pub refname: String,
    /// Rejection message, `None` when the update was accepted
    pub rejection: Option<String>,
}

/// Opens repositories.
pub trait Engine: Send + Sync {
    /// Open the repository at `path`.
    fn open(&self, path: &Path) -> Result<Arc<dyn Repo>, EngineError>;
}

/// An open repository resource.
///
/// Shared between the registry and sessions; released when the last
/// owner drops it.
pub trait Repo: Send + Sync + std::fmt::Debug {
    /// Path to the git directory.
    fn git_dir(&self) -> PathBuf;

    /// Generate a signature from the configured default identity.
    ///
    /// Called afresh for every use; implementations must not cache.
    fn default_identity(&self) -> Result<Identity, EngineError>;

    /// Top-level flags and paths.
    fn layout(&self) -> Result<RepoLayout, EngineError>;

    /// Paths with unresolved three-way conflicts in the index.
    fn conflicts(&self) -> Result<Vec<String>, EngineError>;

    /// Names of configured remotes.
    fn remote_names(&self) -> Result<Vec<String>, EngineError>;

    /// URLs and refspecs of a configured remote.
    fn remote_details(&self, name: &str) -> Result<RemoteDetails, EngineError>;

    /// Branch names of one kind.
    fn branches(&self, kind: BranchKind) -> Result<Vec<String>, EngineError>;

    /// Status of every changed path.
    fn statuses(&self, options: &StatusOptions) -> Result<Vec<StatusEntry>, EngineError>;

    /// Load a remote by name.
    fn load_remote(&self, name: &str) -> Result<Box<dyn Remote>, EngineError>;
}

/// A loaded remote. Released on drop.
pub trait Remote: Send {
    /// The remote's name.
    fn name(&self) -> &str;

    /// Install the handshake credential callback.
    fn install_credentials(&mut self, source: Arc<dyn CredentialSource>) -> Result<(), EngineError>;

    /// Connect and run the handshake. The returned connection disconnects
    /// when dropped.
    fn connect(&mut self, direction: Direction) -> Result<Box<dyn Connection + '_>, EngineError>;
}

/// A live connection to a remote. Disconnects on drop.
pub trait Connection {
    /// Download the objects the fetch refspecs need.
    fn download(&mut self, progress: &dyn ProgressSink) -> Result<(), EngineError>;

    /// Update local refs from the downloaded tips, optionally pruning
    /// remote-tracking refs that no longer exist on the remote.
    fn update_tips(
        &mut self,
        committer: Option<&Identity>,
        message: &str,
        prune: bool,
    ) -> Result<(), EngineError>;

    /// Start building a push. The push-set is freed when dropped.
    fn new_push(&mut self) -> Result<Box<dyn PushSet + '_>, EngineError>;
}

/// A push being assembled and sent. Freed on drop.
pub trait PushSet {
    /// Add a refspec to push.
    fn add_refspec(&mut self, refspec: &RefSpec) -> Result<(), EngineError>;

    /// Build the pack and send it.
    fn finish(&mut self, progress: &dyn ProgressSink) -> Result<(), EngineError>;

    /// Whether the remote acknowledged unpacking what was sent.
    fn unpack_ok(&self) -> bool;

    /// Per-ref results in the order the remote reported them.
    fn ref_statuses(&self) -> Vec<RefUpdateStatus>;
}
