//! host::reply
//!
//! The envelope a host receives for each request.
//!
//! ```json
//! {"ok": {"ShallowQ": false, "BareQ": false}}
//! {"failed": {"kind": "BadRemote", "message": "remote 'nope' does not exist"}}
//! ```

use serde::Serialize;

use crate::serialize::Tree;
use crate::session::{ErrorKind, OperationError};

/// Why a request failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Failure kind, absent when the session recorded none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    /// Diagnostic text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of one host request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    /// The request succeeded and produced this tree.
    Ok(Tree),
    /// The request failed; the host sees the failure sentinel.
    Failed(Failure),
}

impl Reply {
    /// A failure reply from a session's last error.
    pub fn failed(error: Option<&OperationError>) -> Self {
        Reply::Failed(Failure {
            kind: error.map(|e| e.kind),
            message: error.and_then(|e| e.diagnostic.clone()),
        })
    }

    /// Whether this is a success reply.
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok(_))
    }

    /// Render the reply as a single JSON line.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope() {
        let reply = Reply::Ok(Tree::Bool(true));
        assert_eq!(reply.to_json().unwrap(), r#"{"ok":true}"#);
        assert!(reply.is_ok());
    }

    #[test]
    fn failed_envelope_with_diagnostic() {
        let error = OperationError::with_diagnostic(ErrorKind::RefNotPushed, "non-fast-forward");
        let reply = Reply::failed(Some(&error));
        assert_eq!(
            reply.to_json().unwrap(),
            r#"{"failed":{"kind":"RefNotPushed","message":"non-fast-forward"}}"#
        );
    }

    #[test]
    fn failed_envelope_without_error() {
        assert_eq!(Reply::failed(None).to_json().unwrap(), r#"{"failed":{}}"#);
    }
}
