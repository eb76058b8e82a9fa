//! session::credentials
//!
//! Credential selection during a remote handshake.
//!
//! # Order
//!
//! The first permitted mechanism that can be satisfied wins:
//!
//! 1. Default/system credentials
//! 2. Key pair, when a private key file is configured. The public key is
//!    the private key path plus a suffix (`.pub` by default) and the
//!    passphrase is empty.
//! 3. Plaintext: recognized, not implemented
//! 4. Interactive: recognized, not implemented
//!
//! A failure here fails the handshake, which the caller reports as a
//! connection failure.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::config::DEFAULT_PUBLIC_KEY_SUFFIX;
use crate::vcs::{AllowedMechanisms, Credential, CredentialError, CredentialSource};

/// User name for key-pair auth when the remote URL does not carry one.
const DEFAULT_SSH_USER: &str = "git";

/// Picks a credential from the mechanisms a remote permits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialResolver {
    private_key: Option<PathBuf>,
    public_key_suffix: String,
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new(None, DEFAULT_PUBLIC_KEY_SUFFIX)
    }
}

impl CredentialResolver {
    /// Create a resolver for an optional private key file.
    pub fn new(private_key: Option<PathBuf>, public_key_suffix: impl Into<String>) -> Self {
        Self {
            private_key,
            public_key_suffix: public_key_suffix.into(),
        }
    }

    /// The configured private key file.
    pub fn private_key(&self) -> Option<&Path> {
        self.private_key.as_deref()
    }

    /// The public key file paired with the private key.
    pub fn public_key(&self) -> Option<PathBuf> {
        self.private_key.as_ref().map(|private| {
            let mut path = private.clone().into_os_string();
            path.push(&self.public_key_suffix);
            PathBuf::from(path)
        })
    }
}

impl CredentialSource for CredentialResolver {
    fn resolve(
        &self,
        allowed: AllowedMechanisms,
        username: Option<&str>,
    ) -> Result<Credential, CredentialError> {
        if allowed.default {
            debug!("using default credentials");
            return Ok(Credential::Default);
        }

        if allowed.key_pair {
            if let (Some(private_key), Some(public_key)) = (&self.private_key, self.public_key()) {
                debug!(key = %private_key.display(), "using key pair");
                return Ok(Credential::KeyPair {
                    username: username.unwrap_or(DEFAULT_SSH_USER).to_string(),
                    public_key,
                    private_key: private_key.clone(),
                    passphrase: String::new(),
                });
            }
        }

        if allowed.plaintext {
            return Err(CredentialError::Unimplemented("plaintext"));
        }
        if allowed.interactive {
            return Err(CredentialError::Unimplemented("interactive"));
        }

        Err(CredentialError::NoUsableMechanism)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow(default: bool, key_pair: bool, plaintext: bool, interactive: bool) -> AllowedMechanisms {
        AllowedMechanisms {
            default,
            key_pair,
            plaintext,
            interactive,
        }
    }

    #[test]
    fn default_wins_over_everything() {
        let resolver = CredentialResolver::new(Some(PathBuf::from("/keys/id")), ".pub");
        let cred = resolver.resolve(allow(true, true, true, true), None).unwrap();
        assert_eq!(cred, Credential::Default);
    }

    #[test]
    fn key_pair_derives_public_key() {
        let resolver = CredentialResolver::new(Some(PathBuf::from("/keys/id_ed25519")), ".pub");
        let cred = resolver
            .resolve(allow(false, true, false, false), Some("deploy"))
            .unwrap();
        assert_eq!(
            cred,
            Credential::KeyPair {
                username: "deploy".to_string(),
                public_key: PathBuf::from("/keys/id_ed25519.pub"),
                private_key: PathBuf::from("/keys/id_ed25519"),
                passphrase: String::new(),
            }
        );
    }

    #[test]
    fn key_pair_default_username() {
        let resolver = CredentialResolver::new(Some(PathBuf::from("/keys/id")), ".pub");
        match resolver.resolve(allow(false, true, false, false), None).unwrap() {
            Credential::KeyPair { username, .. } => assert_eq!(username, "git"),
            other => panic!("expected key pair, got {:?}", other),
        }
    }

    #[test]
    fn custom_suffix() {
        let resolver = CredentialResolver::new(Some(PathBuf::from("/keys/id")), ".public");
        assert_eq!(resolver.public_key(), Some(PathBuf::from("/keys/id.public")));
    }

    #[test]
    fn key_pair_without_key_falls_through() {
        let resolver = CredentialResolver::default();
        assert_eq!(
            resolver.resolve(allow(false, true, true, false), None),
            Err(CredentialError::Unimplemented("plaintext"))
        );
        assert_eq!(
            resolver.resolve(allow(false, true, false, false), None),
            Err(CredentialError::NoUsableMechanism)
        );
    }

    #[test]
    fn interactive_is_unimplemented() {
        let resolver = CredentialResolver::default();
        assert_eq!(
            resolver.resolve(allow(false, false, false, true), None),
            Err(CredentialError::Unimplemented("interactive"))
        );
    }

    #[test]
    fn nothing_permitted() {
        let resolver = CredentialResolver::default();
        assert_eq!(
            resolver.resolve(AllowedMechanisms::default(), None),
            Err(CredentialError::NoUsableMechanism)
        );
    }
}
