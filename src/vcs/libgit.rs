//! vcs::libgit
//!
//! Engine implementation using git2.
//!
//! This module is the **only** place that imports `git2`. Everything above
//! it talks to the [`Engine`], [`Repo`], [`Remote`], [`Connection`] and
//! [`PushSet`] traits.
//!
//! # Resource Mapping
//!
//! | Trait object | git2 resource | Released by |
//! |---|---|---|
//! | [`Git2Repo`] | `git2::Repository` behind a mutex | last `Arc` drop |
//! | [`Git2Remote`] | its own `git2::Repository` handle | drop |
//! | `Git2Connection` | one `git2::Remote` kept across stages | drop (disconnects) |
//! | `Git2PushSet` | the collected refspecs and push results | drop |
//!
//! A remote keeps its own repository handle so it can live in a session's
//! cache independently of the shared resource. git2 scopes a live
//! transport to a borrow of `git2::Remote`, so the connect stage runs the
//! handshake (credentials included) and the download/push stages
//! re-establish the transport on the same `git2::Remote` object with the
//! same credential callback. Tips are updated from what that object
//! downloaded. A credential refusal while re-establishing surfaces as
//! [`EngineError::Auth`], which callers treat as a connection failure.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use super::traits::{
    AllowedMechanisms, BranchKind, Connection, Credential, CredentialSource, Direction, Engine,
    EngineError, Identity, PackStage, ProgressEvent, ProgressSink, PushSet, RefUpdateStatus,
    Remote, RemoteDetails, Repo, RepoLayout, RepoState, StatusCategory, StatusEntry,
    StatusOptions,
};
use crate::core::types::RefSpec;

/// Credential callback invocations allowed per engine call before the
/// handshake is failed. libgit2 keeps asking while the remote rejects.
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// Message libgit2 reports when the remote could not unpack a push.
const UNPACK_FAILED_MESSAGE: &str = "unpacking the sent packfile failed";

impl EngineError {
    /// Create an EngineError from a git2::Error.
    ///
    /// The engine's message is kept verbatim so it can be surfaced as the
    /// diagnostic; `context` only goes to the log.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        debug!(context, code = ?err.code(), class = ?err.class(), "git2 error");
        let message = err.message().to_string();
        match err.code() {
            git2::ErrorCode::NotFound => return EngineError::NotFound { message },
            git2::ErrorCode::Auth | git2::ErrorCode::Certificate => {
                return EngineError::Auth { message }
            }
            git2::ErrorCode::NotFastForward => return EngineError::Rejected { message },
            _ => {}
        }
        match err.class() {
            git2::ErrorClass::Net
            | git2::ErrorClass::Ssh
            | git2::ErrorClass::Http
            | git2::ErrorClass::Ssl => EngineError::Network { message },
            git2::ErrorClass::Callback => EngineError::Auth { message },
            _ => EngineError::Internal { message },
        }
    }
}

/// Production engine backed by libgit2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Git2Engine;

impl Engine for Git2Engine {
    fn open(&self, path: &Path) -> Result<Arc<dyn Repo>, EngineError> {
        let repo = git2::Repository::open(path).map_err(|e| EngineError::NotARepo {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })?;
        debug!(git_dir = %repo.path().display(), "opened repository");
        Ok(Arc::new(Git2Repo {
            repo: Mutex::new(repo),
        }))
    }
}

/// An open libgit2 repository.
pub struct Git2Repo {
    /// git2 handles are `Send` but not `Sync`; the mutex makes the shared
    /// resource usable from any thread holding the `Arc`.
    repo: Mutex<git2::Repository>,
}

impl std::fmt::Debug for Git2Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git2Repo")
            .field("path", &self.lock().path())
            .finish()
    }
}

impl Git2Repo {
    /// Lock the repository, recovering from a poisoned mutex: git2 handles
    /// hold no invariants a panic elsewhere could break.
    fn lock(&self) -> MutexGuard<'_, git2::Repository> {
        self.repo.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Repo for Git2Repo {
    fn git_dir(&self) -> PathBuf {
        self.lock().path().to_path_buf()
    }

    fn default_identity(&self) -> Result<Identity, EngineError> {
        let repo = self.lock();
        let signature = repo
            .signature()
            .map_err(|e| EngineError::from_git2(e, "default signature"))?;

        Ok(Identity {
            name: signature.name().unwrap_or_default().to_string(),
            email: signature.email().unwrap_or_default().to_string(),
            when: signature.when().seconds(),
        })
    }

    fn layout(&self) -> Result<RepoLayout, EngineError> {
        let repo = self.lock();
        let head_detached = repo
            .head_detached()
            .map_err(|e| EngineError::from_git2(e, "HEAD"))?;

        Ok(RepoLayout {
            shallow: repo.is_shallow(),
            bare: repo.is_bare(),
            head_detached,
            git_dir: repo.path().to_path_buf(),
            work_dir: repo.workdir().map(Path::to_path_buf),
            namespace: repo.namespace().map(String::from),
            state: map_state(repo.state()),
        })
    }

    fn conflicts(&self) -> Result<Vec<String>, EngineError> {
        let repo = self.lock();
        let index = repo
            .index()
            .map_err(|e| EngineError::from_git2(e, "index"))?;
        let conflicts = index
            .conflicts()
            .map_err(|e| EngineError::from_git2(e, "index conflicts"))?;

        let mut paths = Vec::new();
        for conflict in conflicts {
            let conflict = conflict.map_err(|e| EngineError::from_git2(e, "index conflicts"))?;
            // Any side carries the path; the ancestor is absent for add/add.
            if let Some(entry) = conflict.ancestor.or(conflict.our).or(conflict.their) {
                paths.push(String::from_utf8_lossy(&entry.path).into_owned());
            }
        }
        Ok(paths)
    }

    fn remote_names(&self) -> Result<Vec<String>, EngineError> {
        let repo = self.lock();
        let remotes = repo
            .remotes()
            .map_err(|e| EngineError::from_git2(e, "remote list"))?;
        Ok(remotes.iter().flatten().map(String::from).collect())
    }

    fn remote_details(&self, name: &str) -> Result<RemoteDetails, EngineError> {
        let repo = self.lock();
        let remote = repo
            .find_remote(name)
            .map_err(|e| EngineError::from_git2(e, name))?;

        let fetch_refspecs = remote
            .fetch_refspecs()
            .map(|specs| specs.iter().flatten().map(String::from).collect())
            .unwrap_or_default();
        let push_refspecs = remote
            .push_refspecs()
            .map(|specs| specs.iter().flatten().map(String::from).collect())
            .unwrap_or_default();

        Ok(RemoteDetails {
            url: remote.url().map(String::from),
            push_url: remote.pushurl().map(String::from),
            fetch_refspecs,
            push_refspecs,
        })
    }

    fn branches(&self, kind: BranchKind) -> Result<Vec<String>, EngineError> {
        let repo = self.lock();
        let branch_type = match kind {
            BranchKind::Local => git2::BranchType::Local,
            BranchKind::Remote => git2::BranchType::Remote,
        };
        let branches = repo
            .branches(Some(branch_type))
            .map_err(|e| EngineError::from_git2(e, "branch iterator"))?;

        let mut names = Vec::new();
        for branch in branches {
            let (branch, _) = branch.map_err(|e| EngineError::from_git2(e, "branch iterator"))?;
            // Skip names that are not valid UTF-8
            if let Some(name) = branch.name().ok().flatten() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn statuses(&self, options: &StatusOptions) -> Result<Vec<StatusEntry>, EngineError> {
        let repo = self.lock();
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(options.include_untracked)
            .recurse_untracked_dirs(options.recurse_untracked_dirs)
            .renames_head_to_index(options.renames_head_to_index)
            .include_ignored(false);

        let statuses = repo
            .statuses(Some(&mut opts))
            .map_err(|e| EngineError::from_git2(e, "status list"))?;

        let mut entries = Vec::new();
        for entry in statuses.iter() {
            let Some(path) = entry.path() else {
                continue;
            };
            let categories = map_status(entry.status());
            if !categories.is_empty() {
                entries.push(StatusEntry {
                    path: path.to_string(),
                    categories,
                });
            }
        }
        Ok(entries)
    }

    fn load_remote(&self, name: &str) -> Result<Box<dyn Remote>, EngineError> {
        let repo = self.lock();
        repo.find_remote(name)
            .map_err(|e| EngineError::from_git2(e, name))?;

        let own = git2::Repository::open(repo.path())
            .map_err(|e| EngineError::from_git2(e, "reopen for remote"))?;
        debug!(remote = name, "loaded remote");

        Ok(Box::new(Git2Remote {
            repo: own,
            name: name.to_string(),
            credentials: None,
        }))
    }
}

/// A remote loaded from a [`Git2Repo`].
pub struct Git2Remote {
    /// Repository handle owned by this remote
    repo: git2::Repository,
    /// Remote name
    name: String,
    /// Installed credential callback
    credentials: Option<Arc<dyn CredentialSource>>,
}

impl std::fmt::Debug for Git2Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git2Remote")
            .field("name", &self.name)
            .field("credentials", &self.credentials.is_some())
            .finish()
    }
}

impl Remote for Git2Remote {
    fn name(&self) -> &str {
        &self.name
    }

    fn install_credentials(&mut self, source: Arc<dyn CredentialSource>) -> Result<(), EngineError> {
        self.credentials = Some(source);
        Ok(())
    }

    fn connect(&mut self, direction: Direction) -> Result<Box<dyn Connection + '_>, EngineError> {
        let mut remote = self
            .repo
            .find_remote(&self.name)
            .map_err(|e| EngineError::from_git2(e, &self.name))?;

        let git_direction = match direction {
            Direction::Fetch => git2::Direction::Fetch,
            Direction::Push => git2::Direction::Push,
        };

        {
            let callbacks = base_callbacks(self.credentials.as_ref());
            // The handshake result is all we need here; the guard
            // disconnects when it goes out of scope.
            let _handshake = remote
                .connect_auth(git_direction, Some(callbacks), None)
                .map_err(|e| EngineError::from_git2(e, "connect"))?;
        }
        debug!(remote = %self.name, ?direction, "handshake complete");

        Ok(Box::new(Git2Connection {
            repo: &self.repo,
            remote,
            credentials: self.credentials.clone(),
        }))
    }
}

/// A connection stage sequence on one `git2::Remote`.
struct Git2Connection<'r> {
    repo: &'r git2::Repository,
    remote: git2::Remote<'r>,
    credentials: Option<Arc<dyn CredentialSource>>,
}

impl Connection for Git2Connection<'_> {
    fn download(&mut self, progress: &dyn ProgressSink) -> Result<(), EngineError> {
        let mut callbacks = base_callbacks(self.credentials.as_ref());
        callbacks.transfer_progress(|stats| {
            progress.report(ProgressEvent::Transfer {
                received_objects: stats.received_objects(),
                total_objects: stats.total_objects(),
                received_bytes: stats.received_bytes(),
            });
            // No cancellation: the operation runs until the engine finishes
            // or fails it.
            true
        });

        let mut options = git2::FetchOptions::new();
        options.remote_callbacks(callbacks);

        let no_refspecs: &[&str] = &[];
        self.remote
            .download(no_refspecs, Some(&mut options))
            .map_err(|e| EngineError::from_git2(e, "download"))
    }

    fn update_tips(
        &mut self,
        committer: Option<&Identity>,
        message: &str,
        prune: bool,
    ) -> Result<(), EngineError> {
        debug!(
            committer = committer.map(|c| c.email.as_str()),
            message, prune, "updating tips"
        );

        let mut callbacks = base_callbacks(self.credentials.as_ref());
        self.remote
            .update_tips(
                Some(&mut callbacks),
                git2::RemoteUpdateFlags::UPDATE_FETCHHEAD,
                git2::AutotagOption::Unspecified,
                Some(message),
            )
            .map_err(|e| EngineError::from_git2(e, "update tips"))?;

        if prune {
            let callbacks = base_callbacks(self.credentials.as_ref());
            self.remote
                .prune(Some(callbacks))
                .map_err(|e| EngineError::from_git2(e, "prune"))?;
        }
        Ok(())
    }

    fn new_push(&mut self) -> Result<Box<dyn PushSet + '_>, EngineError> {
        Ok(Box::new(Git2PushSet {
            repo: self.repo,
            remote: &mut self.remote,
            credentials: self.credentials.as_ref(),
            refspecs: Vec::new(),
            unpack_ok: true,
            statuses: Vec::new(),
        }))
    }
}

impl Drop for Git2Connection<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.remote.disconnect() {
            warn!(error = %e.message(), "disconnect failed");
        }
    }
}

/// A push under construction on a connection.
struct Git2PushSet<'a, 'r> {
    repo: &'r git2::Repository,
    remote: &'a mut git2::Remote<'r>,
    credentials: Option<&'a Arc<dyn CredentialSource>>,
    refspecs: Vec<String>,
    unpack_ok: bool,
    statuses: Vec<RefUpdateStatus>,
}

impl PushSet for Git2PushSet<'_, '_> {
    fn add_refspec(&mut self, refspec: &RefSpec) -> Result<(), EngineError> {
        // libgit2 only resolves sources when the pack is built; check here
        // so a missing branch fails this stage. An empty source deletes.
        if !refspec.source().is_empty() {
            self.repo
                .revparse_single(refspec.source())
                .map_err(|e| EngineError::from_git2(e, "push source"))?;
        }
        self.refspecs.push(refspec.to_string());
        Ok(())
    }

    fn finish(&mut self, progress: &dyn ProgressSink) -> Result<(), EngineError> {
        let mut statuses = Vec::new();
        let result = {
            let mut callbacks = base_callbacks(self.credentials);
            callbacks.pack_progress(|stage, current, total| {
                progress.report(ProgressEvent::PackBuilding {
                    stage: map_pack_stage(stage),
                    current,
                    total,
                });
            });
            callbacks.push_update_reference(|refname, status| {
                statuses.push(RefUpdateStatus {
                    refname: refname.to_string(),
                    rejection: status.map(String::from),
                });
                Ok(())
            });

            let mut options = git2::PushOptions::new();
            options.remote_callbacks(callbacks);
            self.remote.push(&self.refspecs, Some(&mut options))
        };
        self.statuses = statuses;

        match result {
            Ok(()) => Ok(()),
            // Reported through unpack_ok so the caller sees the dedicated
            // outcome rather than a generic send failure.
            Err(e) if e.message().contains(UNPACK_FAILED_MESSAGE) => {
                self.unpack_ok = false;
                Ok(())
            }
            Err(e) => Err(EngineError::from_git2(e, "push")),
        }
    }

    fn unpack_ok(&self) -> bool {
        self.unpack_ok
    }

    fn ref_statuses(&self) -> Vec<RefUpdateStatus> {
        self.statuses.clone()
    }
}

/// Callbacks shared by every stage: the credential handshake.
fn base_callbacks(credentials: Option<&Arc<dyn CredentialSource>>) -> git2::RemoteCallbacks<'_> {
    let mut callbacks = git2::RemoteCallbacks::new();
    let mut attempts = 0u32;
    callbacks.credentials(move |_url, username, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str("credentials rejected by remote"));
        }
        let source = credentials
            .ok_or_else(|| git2::Error::from_str("no credential resolver installed"))?;
        let credential = source
            .resolve(map_allowed(allowed), username)
            .map_err(|e| git2::Error::from_str(&e.to_string()))?;
        to_git2_cred(credential)
    });
    callbacks
}

fn to_git2_cred(credential: Credential) -> Result<git2::Cred, git2::Error> {
    match credential {
        Credential::Default => git2::Cred::default(),
        Credential::KeyPair {
            username,
            public_key,
            private_key,
            passphrase,
        } => git2::Cred::ssh_key(
            &username,
            Some(public_key.as_path()),
            &private_key,
            Some(passphrase.as_str()),
        ),
    }
}

fn map_allowed(allowed: git2::CredentialType) -> AllowedMechanisms {
    AllowedMechanisms {
        default: allowed.contains(git2::CredentialType::DEFAULT),
        key_pair: allowed.contains(git2::CredentialType::SSH_KEY),
        plaintext: allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT),
        interactive: allowed.contains(git2::CredentialType::SSH_INTERACTIVE),
    }
}

fn map_pack_stage(stage: git2::PackBuilderStage) -> PackStage {
    match stage {
        git2::PackBuilderStage::AddingObjects => PackStage::AddingObjects,
        git2::PackBuilderStage::Deltafication => PackStage::Deltafication,
    }
}

fn map_state(state: git2::RepositoryState) -> RepoState {
    match state {
        git2::RepositoryState::Clean => RepoState::Clean,
        git2::RepositoryState::Merge => RepoState::Merge,
        git2::RepositoryState::Revert => RepoState::Revert,
        git2::RepositoryState::RevertSequence => RepoState::RevertSequence,
        git2::RepositoryState::CherryPick => RepoState::CherryPick,
        git2::RepositoryState::CherryPickSequence => RepoState::CherryPickSequence,
        git2::RepositoryState::Bisect => RepoState::Bisect,
        git2::RepositoryState::Rebase => RepoState::Rebase,
        git2::RepositoryState::RebaseInteractive => RepoState::RebaseInteractive,
        git2::RepositoryState::RebaseMerge => RepoState::RebaseMerge,
        git2::RepositoryState::ApplyMailbox => RepoState::ApplyMailbox,
        git2::RepositoryState::ApplyMailboxOrRebase => RepoState::ApplyMailboxOrRebase,
    }
}

fn map_status(status: git2::Status) -> Vec<StatusCategory> {
    const FLAGS: [(git2::Status, StatusCategory); 9] = [
        (git2::Status::WT_NEW, StatusCategory::Untracked),
        (git2::Status::WT_MODIFIED, StatusCategory::Modified),
        (git2::Status::WT_DELETED, StatusCategory::Deleted),
        (git2::Status::WT_TYPECHANGE, StatusCategory::TypeChange),
        (git2::Status::INDEX_NEW, StatusCategory::IndexNew),
        (git2::Status::INDEX_MODIFIED, StatusCategory::IndexModified),
        (git2::Status::INDEX_DELETED, StatusCategory::IndexDeleted),
        (git2::Status::INDEX_TYPECHANGE, StatusCategory::IndexTypeChange),
        (git2::Status::INDEX_RENAMED, StatusCategory::IndexRenamed),
    ];

    FLAGS
        .iter()
        .filter(|(flag, _)| status.contains(*flag))
        .map(|(_, category)| *category)
        .collect()
}
