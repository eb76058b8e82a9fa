//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`SessionKey`] - Registry handle for an open repository
//! - [`SessionRef`] - A host request target: a filesystem path or a key
//! - [`RemoteName`] - Validated remote name
//! - [`RefSpec`] - Validated push refspec (`[+]src:dst`)
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, so the transfer layer never hands a malformed
//! name to the engine.
//!
//! # Examples
//!
//! ```
//! use repolink::core::types::{RefSpec, RemoteName, SessionRef};
//!
//! let remote = RemoteName::new("origin").unwrap();
//! assert_eq!(remote.as_str(), "origin");
//!
//! let spec = RefSpec::parse("main").unwrap();
//! assert_eq!(spec.to_string(), "refs/heads/main:refs/heads/main");
//!
//! assert!(matches!("#7".parse::<SessionRef>(), Ok(SessionRef::Key(_))));
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid session key: {0}")]
    InvalidSessionKey(String),

    #[error("invalid remote name: {0}")]
    InvalidRemoteName(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("invalid refspec: {0}")]
    InvalidRefSpec(String),
}

/// An opaque registry key.
///
/// Keys are chosen by the host (or allocated by
/// [`SessionRegistry::register`](crate::session::SessionRegistry::register))
/// and index into the registry's resource store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(u64);

impl SessionKey {
    /// Create a key from its raw integer value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw integer value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for SessionKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('#').unwrap_or(s);
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| TypeError::InvalidSessionKey(s.to_string()))
    }
}

/// What a host request points at: a repository path or an existing key.
///
/// The host protocol carries either form; [`SessionRegistry::acquire`]
/// resolves both into a session.
///
/// [`SessionRegistry::acquire`]: crate::session::SessionRegistry::acquire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRef {
    /// Open the repository at this path.
    Path(PathBuf),
    /// Reuse the repository registered under this key.
    Key(SessionKey),
}

impl FromStr for SessionRef {
    type Err = TypeError;

    /// `#<digits>` is a key; anything else is a path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('#') {
            return s.parse().map(SessionRef::Key);
        }
        Ok(SessionRef::Path(PathBuf::from(s)))
    }
}

impl From<SessionKey> for SessionRef {
    fn from(key: SessionKey) -> Self {
        SessionRef::Key(key)
    }
}

/// A validated remote name.
///
/// Remote names follow the same component rules as ref names (they end
/// up inside `refs/remotes/<name>/`), so they may not be empty, contain
/// whitespace, `..`, or any of `~^:?*[\`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteName(String);

impl RemoteName {
    /// Create a new validated remote name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRemoteName` if the name is unusable.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        check_ref_component_text(&name).map_err(TypeError::InvalidRemoteName)?;
        if name.contains('/') {
            return Err(TypeError::InvalidRemoteName(
                "remote name cannot contain '/'".into(),
            ));
        }
        Ok(Self(name))
    }

    /// Get the remote name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RemoteName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteName> for String {
    fn from(name: RemoteName) -> Self {
        name.0
    }
}

impl AsRef<str> for RemoteName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated push refspec.
///
/// Accepts either a full refspec (`[+]<src>:<dst>`) or a bare branch name,
/// which expands to `refs/heads/<name>:refs/heads/<name>`.
///
/// # Example
///
/// ```
/// use repolink::core::types::RefSpec;
///
/// let spec = RefSpec::parse("+refs/heads/wip:refs/heads/backup").unwrap();
/// assert!(spec.is_forced());
/// assert_eq!(spec.destination(), "refs/heads/backup");
///
/// assert!(RefSpec::parse("bad..name").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefSpec {
    force: bool,
    src: String,
    dst: String,
}

impl RefSpec {
    /// Parse a refspec or bare branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefSpec` if either side is not a valid
    /// ref name.
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        let (force, body) = match text.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (src, dst) = match body.split_once(':') {
            Some((src, dst)) => (src.to_string(), dst.to_string()),
            None if body.starts_with("refs/") => (body.to_string(), body.to_string()),
            None => {
                let full = format!("refs/heads/{body}");
                (full.clone(), full)
            }
        };

        // An empty source is a delete refspec (":refs/heads/gone").
        if !src.is_empty() {
            check_ref_name(&src).map_err(|e| TypeError::InvalidRefSpec(format!("{text}: {e}")))?;
        }
        check_ref_name(&dst).map_err(|e| TypeError::InvalidRefSpec(format!("{text}: {e}")))?;

        Ok(Self { force, src, dst })
    }

    /// Whether the refspec allows non-fast-forward updates.
    pub fn is_forced(&self) -> bool {
        self.force
    }

    /// The local side.
    pub fn source(&self) -> &str {
        &self.src
    }

    /// The remote side.
    pub fn destination(&self) -> &str {
        &self.dst
    }
}

impl std::fmt::Display for RefSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.force {
            write!(f, "+")?;
        }
        write!(f, "{}:{}", self.src, self.dst)
    }
}

impl FromStr for RefSpec {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Validate a full ref name against Git's refname rules.
fn check_ref_name(name: &str) -> Result<(), TypeError> {
    check_ref_component_text(name).map_err(TypeError::InvalidRefName)?;

    if name.ends_with('/') || name.starts_with('/') {
        return Err(TypeError::InvalidRefName(
            "ref name cannot start or end with '/'".into(),
        ));
    }
    if name.contains("//") {
        return Err(TypeError::InvalidRefName(
            "ref name cannot contain '//'".into(),
        ));
    }

    for component in name.split('/') {
        if component.starts_with('.') {
            return Err(TypeError::InvalidRefName(
                "path component cannot start with '.'".into(),
            ));
        }
        if component.ends_with(".lock") {
            return Err(TypeError::InvalidRefName(
                "path component cannot end with '.lock'".into(),
            ));
        }
    }

    Ok(())
}

/// Character-level rules shared by ref names and remote names.
fn check_ref_component_text(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".into());
    }
    if name == "@" {
        return Err("name cannot be '@' (reserved)".into());
    }
    if name.starts_with('.') || name.starts_with('-') {
        return Err("name cannot start with '.' or '-'".into());
    }
    if name.ends_with(".lock") || name.ends_with('.') {
        return Err("name cannot end with '.lock' or '.'".into());
    }
    if name.contains("..") || name.contains("@{") {
        return Err("name cannot contain '..' or '@{'".into());
    }

    const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
    if let Some(c) = name.chars().find(|c| INVALID_CHARS.contains(c)) {
        return Err(format!("name cannot contain '{c}'"));
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Err("name cannot contain control characters".into());
    }

    Ok(())
}
