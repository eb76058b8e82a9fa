//! Long-lived request loop: one JSON request per input line, one JSON
//! reply per output line.
//!
//! The registry lives as long as the loop, so keys handed out by `open`
//! stay valid for later requests until `release-key` drops them.
//!
//! ```text
//! {"op":"open","path":"/work/demo"}           -> {"ok":{"Key":1}}
//! {"op":"fetch","repo":1,"remote":"origin"}   -> {"ok":null}
//! {"op":"properties","repo":"#1"}             -> {"ok":{"ShallowQ":false,...}}
//! {"op":"release-key","key":1}                -> {"ok":null}
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use serde::Deserialize;
use tracing::debug;

use super::{emit, inspect, transfer};
use crate::cli::Context;
use crate::core::types::{SessionKey, SessionRef};
use crate::host::{Failure, Reply};
use crate::serialize::Tree;
use crate::session::{ErrorKind, OperationError};

/// A repository reference as a host sends it: an integer key, `#<key>`,
/// or a path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Target {
    /// A registered key
    Key(u64),
    /// `#<key>` or a repository path
    Text(String),
}

impl Target {
    fn resolve(&self) -> Result<SessionRef, OperationError> {
        match self {
            Target::Key(raw) => Ok(SessionRef::Key(SessionKey::new(*raw))),
            Target::Text(text) => text
                .parse()
                .map_err(|e| OperationError::with_diagnostic(ErrorKind::BadRepo, format!("{e}"))),
        }
    }
}

fn default_remote() -> String {
    "origin".to_string()
}

/// One host request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Request {
    /// Open a repository and register it, under `key` when given.
    Open {
        path: PathBuf,
        #[serde(default)]
        key: Option<u64>,
    },
    /// Drop a key mapping.
    ReleaseKey { key: u64 },
    /// Serialize repository properties.
    Properties { repo: Target },
    /// Serialize repository status.
    Status { repo: Target },
    /// Fetch from a remote.
    Fetch {
        repo: Target,
        #[serde(default = "default_remote")]
        remote: String,
        #[serde(default)]
        key_file: Option<PathBuf>,
        #[serde(default)]
        prune: bool,
    },
    /// Push branches to a remote.
    Push {
        repo: Target,
        branches: Vec<String>,
        #[serde(default = "default_remote")]
        remote: String,
        #[serde(default)]
        key_file: Option<PathBuf>,
    },
}

/// Answer requests from `input` until it ends.
pub fn serve(ctx: &Context, input: impl BufRead, mut output: impl Write) -> Result<()> {
    for line in input.lines() {
        let line = line.context("failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle(ctx, request),
            Err(e) => Reply::Failed(Failure {
                kind: None,
                message: Some(format!("malformed request: {e}")),
            }),
        };
        emit(&mut output, &reply)?;
    }
    debug!("input closed");
    Ok(())
}

/// Run one request against the long-lived registry.
pub fn handle(ctx: &Context, request: Request) -> Reply {
    debug!(?request, "request");
    match request {
        Request::Open { path, key } => open(ctx, &path, key),
        Request::ReleaseKey { key } => match ctx.registry.release(SessionKey::new(key)) {
            Ok(()) => Reply::Ok(Tree::Null),
            Err(e) => Reply::failed(Some(&e.to_operation_error())),
        },
        Request::Properties { repo } => with_target(&repo, |r| inspect::properties(ctx, r)),
        Request::Status { repo } => with_target(&repo, |r| inspect::status(ctx, r)),
        Request::Fetch {
            repo,
            remote,
            key_file,
            prune,
        } => with_target(&repo, |r| transfer::fetch(ctx, r, &remote, key_file, prune)),
        Request::Push {
            repo,
            branches,
            remote,
            key_file,
        } => with_target(&repo, |r| transfer::push(ctx, r, &remote, key_file, branches)),
    }
}

fn with_target(target: &Target, run: impl FnOnce(&SessionRef) -> Reply) -> Reply {
    match target.resolve() {
        Ok(reference) => run(&reference),
        Err(e) => Reply::failed(Some(&e)),
    }
}

fn open(ctx: &Context, path: &std::path::Path, key: Option<u64>) -> Reply {
    let registered = ctx.registry.open(path).and_then(|mut session| match key {
        Some(raw) => {
            let key = SessionKey::new(raw);
            ctx.registry.assign_key(&mut session, key).map(|()| key)
        }
        None => ctx.registry.register(&mut session),
    });

    match registered {
        // The registry keeps the resource; the session itself closes here.
        Ok(key) => Reply::Ok(Tree::Assoc(vec![("Key".to_string(), Tree::Integer(key.get()))])),
        Err(e) => Reply::failed(Some(&e.to_operation_error())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::host::MemoryChannel;
    use crate::session::SessionRegistry;
    use crate::vcs::mock::{MockEngine, MockRepo};
    use std::sync::Arc;

    fn context() -> Context {
        let engine = MockEngine::new()
            .with_repo("/r", MockRepo::new().remote("origin", "https://example.com/r.git"));
        Context {
            registry: SessionRegistry::new(Arc::new(engine), Config::default()),
            channel: Box::new(MemoryChannel::new()),
        }
    }

    fn run(ctx: &Context, input: &str) -> Vec<serde_json::Value> {
        let mut output = Vec::new();
        serve(ctx, input.as_bytes(), &mut output).unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    mod parsing {
        use super::*;

        #[test]
        fn fetch_defaults() {
            let request: Request = serde_json::from_str(r##"{"op":"fetch","repo":"#2"}"##).unwrap();
            assert_eq!(
                request,
                Request::Fetch {
                    repo: Target::Text("#2".to_string()),
                    remote: "origin".to_string(),
                    key_file: None,
                    prune: false,
                }
            );
        }

        #[test]
        fn integer_target_is_a_key() {
            assert_eq!(
                Target::Key(3).resolve(),
                Ok(SessionRef::Key(SessionKey::new(3)))
            );
            assert_eq!(
                Target::Text("/r".to_string()).resolve(),
                Ok(SessionRef::Path(PathBuf::from("/r")))
            );
            assert_eq!(
                Target::Text("#x".to_string()).resolve().map_err(|e| e.kind),
                Err(ErrorKind::BadRepo)
            );
        }
    }

    mod keys {
        use super::*;

        #[test]
        fn key_persists_across_requests() {
            let ctx = context();
            let replies = run(
                &ctx,
                r##"{"op":"open","path":"/r"}
{"op":"status","repo":"#1"}
{"op":"fetch","repo":1}
{"op":"release-key","key":1}
{"op":"status","repo":1}
"##,
            );

            assert_eq!(replies.len(), 5);
            assert_eq!(replies[0], serde_json::json!({"ok": {"Key": 1}}));
            assert!(replies[1]["ok"].is_object());
            assert_eq!(replies[2], serde_json::json!({"ok": null}));
            assert_eq!(replies[3], serde_json::json!({"ok": null}));
            assert_eq!(replies[4]["failed"]["kind"], "BadRepo");
            assert!(ctx.registry.is_empty());
        }

        #[test]
        fn explicit_key_and_collision() {
            let ctx = context();
            let replies = run(
                &ctx,
                r#"{"op":"open","path":"/r","key":7}
{"op":"open","path":"/r","key":7}
"#,
            );

            assert_eq!(replies[0], serde_json::json!({"ok": {"Key": 7}}));
            assert_eq!(replies[1]["failed"]["kind"], "BadRepo");
            assert!(ctx.registry.contains(SessionKey::new(7)));
        }

        #[test]
        fn releasing_unknown_key_fails() {
            let ctx = context();
            let replies = run(&ctx, r#"{"op":"release-key","key":4}"#);
            assert_eq!(replies[0]["failed"]["kind"], "BadRepo");
        }
    }

    mod malformed {
        use super::*;

        #[test]
        fn bad_line_does_not_stop_the_loop() {
            let ctx = context();
            let replies = run(
                &ctx,
                "not json\n\n{\"op\":\"teleport\"}\n{\"op\":\"open\",\"path\":\"/r\"}\n",
            );

            assert_eq!(replies.len(), 3);
            assert!(replies[0]["failed"]["message"]
                .as_str()
                .unwrap()
                .starts_with("malformed request"));
            assert!(replies[0]["failed"].get("kind").is_none());
            assert!(replies[1]["failed"].is_object());
            assert_eq!(replies[2], serde_json::json!({"ok": {"Key": 1}}));
        }
    }
}
