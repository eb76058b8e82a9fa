//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Example
//!
//! ```toml
//! [transfer]
//! public_key_suffix = ".pub"
//! reflog_message = "repolink: fetch"
//! prune = false
//! progress = true
//!
//! [status]
//! include_untracked = true
//! recurse_untracked_dirs = true
//! renames_head_to_index = true
//! ```
//!
//! # Validation
//!
//! Config values are validated after parsing (e.g., the public key suffix
//! must be a non-empty file extension).

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// A configuration file (global or repo scope share one schema).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Fetch/push settings
    pub transfer: Option<TransferConfig>,

    /// Status serialization settings
    pub status: Option<StatusConfig>,
}

impl ConfigFile {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(transfer) = &self.transfer {
            transfer.validate()?;
        }
        Ok(())
    }
}

/// Fetch and push settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TransferConfig {
    /// Suffix appended to the private key path to find the public key
    pub public_key_suffix: Option<String>,

    /// Reflog message used when fetched tips update local refs
    pub reflog_message: Option<String>,

    /// Prune stale remote-tracking refs after fetch
    pub prune: Option<bool>,

    /// Forward engine progress to the host
    pub progress: Option<bool>,
}

impl TransferConfig {
    /// Validate the transfer settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(suffix) = &self.public_key_suffix {
            if suffix.is_empty() || suffix.contains('/') || suffix.contains('\\') {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid public key suffix '{}': must be a non-empty file suffix",
                    suffix
                )));
            }
        }

        if let Some(message) = &self.reflog_message {
            if message.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "reflog message cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Status computation flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StatusConfig {
    /// Report untracked files
    pub include_untracked: Option<bool>,

    /// Descend into untracked directories
    pub recurse_untracked_dirs: Option<bool>,

    /// Detect renames between HEAD and the index
    pub renames_head_to_index: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            [transfer]
            public_key_suffix = ".pub"
            reflog_message = "sync: fetch"
            prune = true

            [status]
            include_untracked = false
            "#,
        )
        .unwrap();

        let transfer = file.transfer.as_ref().unwrap();
        assert_eq!(transfer.reflog_message.as_deref(), Some("sync: fetch"));
        assert_eq!(transfer.prune, Some(true));
        assert_eq!(file.status.unwrap().include_untracked, Some(false));
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<ConfigFile, _> = toml::from_str("[forge]\nname = \"x\"");
        assert!(result.is_err());
    }

    #[test]
    fn empty_suffix_rejected() {
        let config = TransferConfig {
            public_key_suffix: Some(String::new()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn suffix_with_separator_rejected() {
        let config = TransferConfig {
            public_key_suffix: Some("/x.pub".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn blank_reflog_message_rejected() {
        let config = TransferConfig {
            reflog_message: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
