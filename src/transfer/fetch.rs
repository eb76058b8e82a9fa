//! transfer::fetch
//!
//! Fetch from a named remote.
//!
//! # Stages
//!
//! ValidateSession → ResolveRemote → Connect → Download → UpdateTips
//!
//! The stages run once each, in order, with no retries. Once connected the
//! connection is closed on every exit path; the remote itself stays in the
//! session's cache for the next call.

use std::path::PathBuf;

use tracing::{debug, instrument};

use crate::core::types::RemoteName;
use crate::session::{ErrorKind, OperationError, RepositorySession};
use crate::vcs::{Direction, EngineError, NoProgress, ProgressSink};

/// Parameters of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Remote name
    pub remote: String,
    /// Private key file for key-pair authentication
    pub key_file: Option<PathBuf>,
    /// Prune stale remote-tracking refs; `None` uses the configured default
    pub prune: Option<bool>,
}

impl FetchRequest {
    /// Fetch from `remote` with default options.
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            key_file: None,
            prune: None,
        }
    }

    /// Authenticate with this private key file.
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    /// Override the configured prune setting.
    pub fn prune(mut self, prune: bool) -> Self {
        self.prune = Some(prune);
        self
    }
}

/// Fetch from `request.remote` into the session's repository.
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
/// | authentication after connect | [`ErrorKind::ConnectionFailed`] |
/// | download | [`ErrorKind::DownloadFailed`] |
/// | update tips / prune | [`ErrorKind::UpdateTipsFailed`] |
#[instrument(skip_all, fields(remote = %request.remote))]
pub fn fetch(
    session: &mut RepositorySession,
    request: &FetchRequest,
    progress: &dyn ProgressSink,
) -> Result<(), OperationError> {
    session.clear_error();
    let result = run(session, request, progress);
    session.settle(result)
}

fn run(
    session: &mut RepositorySession,
    request: &FetchRequest,
    progress: &dyn ProgressSink,
) -> Result<(), OperationError> {
    if !session.is_valid() {
        return Err(OperationError::new(ErrorKind::BadRepo));
    }
    RemoteName::new(request.remote.as_str())
        .map_err(|e| OperationError::with_diagnostic(ErrorKind::BadRemote, e.to_string()))?;

    let committer = session.committer();
    let message = session.config().reflog_message();
    let prune = request.prune.unwrap_or_else(|| session.config().prune());
    let progress: &dyn ProgressSink = if session.config().progress() {
        progress
    } else {
        &NoProgress
    };

    let remote = session.resolve_remote(&request.remote, request.key_file.as_deref())?;

    debug!("connecting");
    let mut connection = remote
        .connect(Direction::Fetch)
        .map_err(|e| OperationError::from_engine(ErrorKind::ConnectionFailed, &e))?;

    debug!("downloading");
    connection
        .download(progress)
        .map_err(|e| stage_error(ErrorKind::DownloadFailed, &e))?;

    debug!(prune, "updating tips");
    connection
        .update_tips(committer.as_ref(), &message, prune)
        .map_err(|e| stage_error(ErrorKind::UpdateTipsFailed, &e))?;

    Ok(())
}

/// An authentication failure after connecting means the transport was
/// re-established and refused, which is a connection failure whatever
/// stage triggered it.
fn stage_error(kind: ErrorKind, err: &EngineError) -> OperationError {
    match err {
        EngineError::Auth { .. } => OperationError::from_engine(ErrorKind::ConnectionFailed, err),
        _ => OperationError::from_engine(kind, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::session::SessionRegistry;
    use crate::vcs::mock::{FailOn, MockEngine, MockOperation, MockRepo};
    use std::path::Path;
    use std::sync::Arc;

    fn setup(engine: MockEngine) -> (MockEngine, RepositorySession) {
        let registry = SessionRegistry::new(Arc::new(engine.clone()), Config::default());
        let session = registry.open(Path::new("/r")).unwrap();
        engine.clear_operations();
        (engine, session)
    }

    fn engine() -> MockEngine {
        MockEngine::new().with_repo("/r", MockRepo::new().remote("origin", "https://example.com/r.git"))
    }

    fn disconnects(engine: &MockEngine) -> usize {
        engine
            .operations()
            .iter()
            .filter(|op| matches!(op, MockOperation::Disconnect { .. }))
            .count()
    }

    mod success {
        use super::*;

        #[test]
        fn stages_run_in_order() {
            let (engine, mut session) = setup(engine());

            fetch(&mut session, &FetchRequest::new("origin"), &NoProgress).unwrap();

            let stages: Vec<_> = engine
                .operations()
                .into_iter()
                .filter(|op| {
                    matches!(
                        op,
                        MockOperation::LoadRemote { .. }
                            | MockOperation::Connect { .. }
                            | MockOperation::Download { .. }
                            | MockOperation::UpdateTips { .. }
                            | MockOperation::Disconnect { .. }
                    )
                })
                .collect();
            assert_eq!(
                stages,
                vec![
                    MockOperation::LoadRemote {
                        name: "origin".to_string()
                    },
                    MockOperation::Connect {
                        remote: "origin".to_string(),
                        direction: Direction::Fetch
                    },
                    MockOperation::Download {
                        remote: "origin".to_string()
                    },
                    MockOperation::UpdateTips {
                        remote: "origin".to_string(),
                        committer: Some("mock@example.com".to_string()),
                        message: "repolink: fetch".to_string(),
                        prune: false,
                    },
                    MockOperation::Disconnect {
                        remote: "origin".to_string()
                    },
                ]
            );
            assert!(session.last_error().is_none());
        }

        #[test]
        fn remote_stays_cached_between_fetches() {
            let (engine, mut session) = setup(engine());

            fetch(&mut session, &FetchRequest::new("origin"), &NoProgress).unwrap();
            fetch(&mut session, &FetchRequest::new("origin"), &NoProgress).unwrap();

            let loads = engine
                .operations()
                .iter()
                .filter(|op| matches!(op, MockOperation::LoadRemote { .. }))
                .count();
            assert_eq!(loads, 1);
            assert_eq!(disconnects(&engine), 2);
            assert_eq!(session.remote_cache().cached_name(), Some("origin"));
        }

        #[test]
        fn prune_flag_reaches_update_tips() {
            let (engine, mut session) = setup(engine());

            fetch(&mut session, &FetchRequest::new("origin").prune(true), &NoProgress).unwrap();

            assert!(engine.operations().iter().any(|op| matches!(
                op,
                MockOperation::UpdateTips { prune: true, .. }
            )));
        }

        #[test]
        fn success_clears_previous_error() {
            let (_, mut session) = setup(engine());

            assert!(fetch(&mut session, &FetchRequest::new("nope"), &NoProgress).is_err());
            assert!(session.last_error().is_some());

            fetch(&mut session, &FetchRequest::new("origin"), &NoProgress).unwrap();
            assert!(session.last_error().is_none());
        }
    }

    mod failures {
        use super::*;

        #[test]
        fn invalid_session_touches_nothing() {
            let engine = engine();
            let mut session = RepositorySession::invalid(Config::default());

            let err = fetch(&mut session, &FetchRequest::new("origin"), &NoProgress).unwrap_err();

            assert_eq!(err.kind, ErrorKind::BadRepo);
            assert_eq!(session.last_error(), Some(&err));
            assert!(engine.operations().is_empty());
        }

        #[test]
        fn unknown_remote_never_connects() {
            let (engine, mut session) = setup(engine());

            let err = fetch(&mut session, &FetchRequest::new("upstream"), &NoProgress).unwrap_err();

            assert_eq!(err.kind, ErrorKind::BadRemote);
            assert!(engine
                .operations()
                .iter()
                .all(|op| !matches!(op, MockOperation::Connect { .. })));
        }

        #[test]
        fn malformed_remote_name_is_bad_remote() {
            let (engine, mut session) = setup(engine());

            let err = fetch(&mut session, &FetchRequest::new("bad name"), &NoProgress).unwrap_err();

            assert_eq!(err.kind, ErrorKind::BadRemote);
            assert!(engine.operations().is_empty());
        }

        #[test]
        fn connect_failure_carries_diagnostic() {
            let (_, mut session) = setup(engine().fail_on(FailOn::Connect(EngineError::Network {
                message: "could not resolve host".to_string(),
            })));

            let err = fetch(&mut session, &FetchRequest::new("origin"), &NoProgress).unwrap_err();

            assert_eq!(err.kind, ErrorKind::ConnectionFailed);
            assert_eq!(err.diagnostic.as_deref(), Some("could not resolve host"));
        }

        #[test]
        fn download_failure_still_disconnects() {
            let (engine, mut session) = setup(engine().fail_on(FailOn::Download(EngineError::Network {
                message: "early EOF".to_string(),
            })));

            let err = fetch(&mut session, &FetchRequest::new("origin"), &NoProgress).unwrap_err();

            assert_eq!(err.kind, ErrorKind::DownloadFailed);
            assert_eq!(err.diagnostic.as_deref(), Some("early EOF"));
            assert_eq!(disconnects(&engine), 1);
            assert!(engine
                .operations()
                .iter()
                .all(|op| !matches!(op, MockOperation::UpdateTips { .. })));
        }

        #[test]
        fn update_tips_failure_still_disconnects() {
            let (engine, mut session) = setup(engine().fail_on(FailOn::UpdateTips(EngineError::internal(
                "failed to lock reference",
            ))));

            let err = fetch(&mut session, &FetchRequest::new("origin"), &NoProgress).unwrap_err();

            assert_eq!(err.kind, ErrorKind::UpdateTipsFailed);
            assert_eq!(disconnects(&engine), 1);
        }
    }

    mod credentials {
        use super::*;
        use crate::vcs::mock::MockRemote;
        use crate::vcs::{AllowedMechanisms, Credential};

        fn ssh_engine() -> MockEngine {
            MockEngine::new().with_repo(
                "/r",
                MockRepo::new().remote_with(
                    "origin",
                    MockRemote::new("ssh://git@example.com/r.git").require_auth(AllowedMechanisms {
                        key_pair: true,
                        ..Default::default()
                    }),
                ),
            )
        }

        fn resolved(engine: &MockEngine) -> Vec<Credential> {
            engine
                .operations()
                .into_iter()
                .filter_map(|op| match op {
                    MockOperation::ResolvedCredential { credential, .. } => Some(credential),
                    _ => None,
                })
                .collect()
        }

        fn key_pair(private_key: &str) -> Credential {
            Credential::KeyPair {
                username: "git".to_string(),
                public_key: PathBuf::from(format!("{private_key}.pub")),
                private_key: PathBuf::from(private_key),
                passphrase: String::new(),
            }
        }

        #[test]
        fn key_file_is_offered_during_handshake() {
            let (engine, mut session) = setup(ssh_engine());

            fetch(&mut session, &FetchRequest::new("origin").key_file("/k"), &NoProgress).unwrap();

            assert_eq!(resolved(&engine), vec![key_pair("/k")]);
        }

        #[test]
        fn changed_key_file_installs_new_resolver() {
            let (engine, mut session) = setup(ssh_engine());

            fetch(&mut session, &FetchRequest::new("origin").key_file("/k"), &NoProgress).unwrap();
            fetch(&mut session, &FetchRequest::new("origin").key_file("/k"), &NoProgress).unwrap();
            fetch(&mut session, &FetchRequest::new("origin").key_file("/other"), &NoProgress).unwrap();

            assert_eq!(
                resolved(&engine),
                vec![key_pair("/k"), key_pair("/k"), key_pair("/other")]
            );
            let installs = engine
                .operations()
                .iter()
                .filter(|op| matches!(op, MockOperation::InstallCredentials { .. }))
                .count();
            assert_eq!(installs, 2);
            assert_eq!(session.remote_cache().cached_key_file(), Some(Path::new("/other")));
        }

        #[test]
        fn missing_key_file_fails_handshake() {
            let (engine, mut session) = setup(ssh_engine());

            let err = fetch(&mut session, &FetchRequest::new("origin"), &NoProgress).unwrap_err();

            assert_eq!(err.kind, ErrorKind::ConnectionFailed);
            assert!(resolved(&engine).is_empty());
            assert!(engine
                .operations()
                .iter()
                .all(|op| !matches!(op, MockOperation::Download { .. })));
        }

        #[test]
        fn auth_failure_after_connect_is_connection_failure() {
            let (_, mut session) = setup(engine().fail_on(FailOn::Download(EngineError::Auth {
                message: "credentials rejected by remote".to_string(),
            })));

            let err = fetch(&mut session, &FetchRequest::new("origin"), &NoProgress).unwrap_err();

            assert_eq!(err.kind, ErrorKind::ConnectionFailed);
            assert_eq!(err.diagnostic.as_deref(), Some("credentials rejected by remote"));
        }
    }

    mod progress {
        use super::*;
        use crate::host::MemoryChannel;
        use crate::transfer::ProgressReporter;

        #[test]
        fn download_progress_reaches_host() {
            let (_, mut session) = setup(engine());
            let channel = MemoryChannel::new();

            fetch(
                &mut session,
                &FetchRequest::new("origin"),
                &ProgressReporter::new(&channel),
            )
            .unwrap();

            assert_eq!(
                channel.lines(),
                vec![
                    "transfer: 1/3, 100 bytes",
                    "transfer: 2/3, 200 bytes",
                    "transfer: 3/3, 300 bytes",
                ]
            );
        }

        #[test]
        fn host_failure_does_not_cancel() {
            let (_, mut session) = setup(engine());
            let channel = MemoryChannel::closed();

            fetch(
                &mut session,
                &FetchRequest::new("origin"),
                &ProgressReporter::new(&channel),
            )
            .unwrap();
        }
    }
}
