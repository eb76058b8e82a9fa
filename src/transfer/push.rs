//! transfer::push
//!
//! Push refs to a named remote.
//!
//! # Stages
//!
//! ValidateSession → ResolveRemote → Connect → BuildPushSet → AddRefspec →
//! Finish → VerifyUnpack → CollectStatus
//!
//! The push-set is freed and the connection closed on every exit path
//! once they exist. Ref rejections are coalesced into a single
//! [`ErrorKind::RefNotPushed`] carrying the first rejection in the order
//! the remote reported them.

use std::path::PathBuf;

use tracing::{debug, instrument};

use crate::core::types::{RefSpec, RemoteName};
use crate::session::{ErrorKind, OperationError, RepositorySession};
use crate::vcs::{Direction, EngineError, NoProgress, ProgressSink};

/// Parameters of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Remote name
    pub remote: String,
    /// Private key file for key-pair authentication
    pub key_file: Option<PathBuf>,
    /// Branch names or explicit refspecs, pushed together
    pub refspecs: Vec<String>,
}

impl PushRequest {
    /// Push nothing yet to `remote`.
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            key_file: None,
            refspecs: Vec::new(),
        }
    }

    /// Add a branch name (`main`) or refspec (`+refs/heads/a:refs/heads/b`).
    pub fn refspec(mut self, spec: impl Into<String>) -> Self {
        self.refspecs.push(spec.into());
        self
    }

    /// Authenticate with this private key file.
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }
}

/// Push `request.refspecs` to `request.remote`.
///
/// The session's last error is cleared at entry and set to the returned
/// error on failure.
///
/// # Errors
///
/// | Stage | Kind |
/// |---|---|
/// | invalid session | [`ErrorKind::BadRepo`] |
/// | remote resolution | [`ErrorKind::BadRemote`] |
/// | connect | [`ErrorKind::ConnectionFailed`] |
/// | push-set construction | [`ErrorKind::BadPush`] |
/// | refspec parse or add | [`ErrorKind::BadCommitish`] |
/// | authentication while sending | [`ErrorKind::ConnectionFailed`] |
/// | ref refused before sending | [`ErrorKind::RefNotPushed`] |
/// | pack build or send | [`ErrorKind::PushUnfinished`] |
/// | remote unpack | [`ErrorKind::RemoteUnpackFailed`] |
/// | any ref rejected | [`ErrorKind::RefNotPushed`] |
#[instrument(skip_all, fields(remote = %request.remote))]
pub fn push(
    session: &mut RepositorySession,
    request: &PushRequest,
    progress: &dyn ProgressSink,
) -> Result<(), OperationError> {
    session.clear_error();
    let result = run(session, request, progress);
    session.settle(result)
}

fn run(
    session: &mut RepositorySession,
    request: &PushRequest,
    progress: &dyn ProgressSink,
) -> Result<(), OperationError> {
    if !session.is_valid() {
        return Err(OperationError::new(ErrorKind::BadRepo));
    }
    RemoteName::new(request.remote.as_str())
        .map_err(|e| OperationError::with_diagnostic(ErrorKind::BadRemote, e.to_string()))?;

    let progress: &dyn ProgressSink = if session.config().progress() {
        progress
    } else {
        &NoProgress
    };

    let remote = session.resolve_remote(&request.remote, request.key_file.as_deref())?;

    debug!("connecting");
    let mut connection = remote
        .connect(Direction::Push)
        .map_err(|e| OperationError::from_engine(ErrorKind::ConnectionFailed, &e))?;

    let mut push_set = connection
        .new_push()
        .map_err(|e| OperationError::from_engine(ErrorKind::BadPush, &e))?;

    if request.refspecs.is_empty() {
        return Err(OperationError::with_diagnostic(
            ErrorKind::BadCommitish,
            "nothing to push",
        ));
    }
    for text in &request.refspecs {
        let spec = RefSpec::parse(text)
            .map_err(|e| OperationError::with_diagnostic(ErrorKind::BadCommitish, e.to_string()))?;
        debug!(refspec = %spec, "adding refspec");
        push_set
            .add_refspec(&spec)
            .map_err(|e| OperationError::from_engine(ErrorKind::BadCommitish, &e))?;
    }

    debug!("sending pack");
    push_set.finish(progress).map_err(|e| match e {
        // Refs the engine refuses before sending (non-fast-forward) are
        // rejections like the ones the remote reports.
        EngineError::Rejected { .. } => OperationError::from_engine(ErrorKind::RefNotPushed, &e),
        EngineError::Auth { .. } => OperationError::from_engine(ErrorKind::ConnectionFailed, &e),
        _ => OperationError::from_engine(ErrorKind::PushUnfinished, &e),
    })?;

    if !push_set.unpack_ok() {
        return Err(OperationError::new(ErrorKind::RemoteUnpackFailed));
    }

    let statuses = push_set.ref_statuses();
    for status in &statuses {
        debug!(refname = %status.refname, rejection = ?status.rejection, "ref update");
    }
    if let Some(message) = statuses.into_iter().find_map(|s| s.rejection) {
        return Err(OperationError::with_diagnostic(ErrorKind::RefNotPushed, message));
    }

    Ok(())
}
