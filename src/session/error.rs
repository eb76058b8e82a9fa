//! session::error
//!
//! Operation outcome kinds reported to the host.

use serde::Serialize;

use crate::vcs::EngineError;

/// Closed set of failure kinds a session operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// The session has no open repository.
    BadRepo,
    /// The remote could not be loaded or prepared.
    BadRemote,
    /// The handshake with the remote failed.
    ConnectionFailed,
    /// Downloading objects failed.
    DownloadFailed,
    /// Updating local refs from fetched tips failed.
    UpdateTipsFailed,
    /// The push-set could not be created.
    BadPush,
    /// A refspec was invalid or rejected by the engine.
    BadCommitish,
    /// Building or sending the pack failed.
    PushUnfinished,
    /// The remote failed to unpack what was sent.
    RemoteUnpackFailed,
    /// The remote rejected at least one ref update.
    RefNotPushed,
}

impl ErrorKind {
    /// Stable name used in replies and logs.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRepo => "BadRepo",
            ErrorKind::BadRemote => "BadRemote",
            ErrorKind::ConnectionFailed => "ConnectionFailed",
            ErrorKind::DownloadFailed => "DownloadFailed",
            ErrorKind::UpdateTipsFailed => "UpdateTipsFailed",
            ErrorKind::BadPush => "BadPush",
            ErrorKind::BadCommitish => "BadCommitish",
            ErrorKind::PushUnfinished => "PushUnfinished",
            ErrorKind::RemoteUnpackFailed => "RemoteUnpackFailed",
            ErrorKind::RefNotPushed => "RefNotPushed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed operation: its kind plus the engine's diagnostic, if any.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct OperationError {
    /// What failed
    pub kind: ErrorKind,
    /// Human-readable detail, usually the engine's own message
    pub diagnostic: Option<String>,
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.diagnostic {
            Some(diagnostic) => write!(f, "{}: {}", self.kind, diagnostic),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl OperationError {
    /// A failure with no diagnostic.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            diagnostic: None,
        }
    }

    /// A failure with a diagnostic message.
    pub fn with_diagnostic(kind: ErrorKind, diagnostic: impl Into<String>) -> Self {
        Self {
            kind,
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// A failure of `kind` carrying the engine's message. An empty engine
    /// message yields no diagnostic.
    pub fn from_engine(kind: ErrorKind, err: &EngineError) -> Self {
        let message = err.diagnostic();
        Self {
            kind,
            diagnostic: (!message.is_empty()).then(|| message.to_string()),
        }
    }
}
