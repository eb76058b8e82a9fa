//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! repolink has two configuration scopes:
//! - **Global**: User-level settings
//! - **Repo**: Per-repository overrides, stored inside the git directory
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$REPOLINK_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/repolink/config.toml`
//! 3. `~/.repolink/config.toml`
//!
//! # Repo Config Location
//!
//! `<git-dir>/repolink/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use repolink::core::config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Some(Path::new("/path/to/repo/.git"))).unwrap();
//! println!("public key suffix: {}", config.public_key_suffix());
//! println!("prune on fetch: {}", config.prune());
//! ```

pub mod schema;

pub use schema::{ConfigFile, StatusConfig, TransferConfig};

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::vcs::StatusOptions;

/// Default suffix that turns a private key path into its public key path.
pub const DEFAULT_PUBLIC_KEY_SUFFIX: &str = ".pub";

/// Default reflog message for refs updated by a fetch.
pub const DEFAULT_REFLOG_MESSAGE: &str = "repolink: fetch";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence rules automatically: repo config overrides
/// global config, which overrides built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: ConfigFile,
    /// Repository configuration (if one was found)
    pub repo: Option<ConfigFile>,
    /// Path to the global config file (if loaded)
    global_path: Option<PathBuf>,
    /// Path to the repo config file (if loaded)
    repo_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `git_dir` is provided, also loads the repo-specific config.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed or
    /// fail validation. Missing config files are not an error.
    pub fn load(git_dir: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(Self::find_global().as_deref(), git_dir)
    }

    /// Load configuration from an explicit global file.
    ///
    /// A `global` path that does not exist is treated as absent.
    pub fn load_from(global: Option<&Path>, git_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let (global_file, global_path) = match global {
            Some(path) if path.exists() => (Self::read_file(path)?, Some(path.to_path_buf())),
            _ => (ConfigFile::default(), None),
        };

        let (repo_file, repo_path) = match git_dir.map(Self::repo_config_path) {
            Some(path) if path.exists() => (Some(Self::read_file(&path)?), Some(path)),
            _ => (None, None),
        };

        global_file.validate()?;
        if let Some(ref r) = repo_file {
            r.validate()?;
        }

        Ok(Config {
            global: global_file,
            repo: repo_file,
            global_path,
            repo_path,
        })
    }

    /// Locate the global config file, if any exists.
    fn find_global() -> Option<PathBuf> {
        // 1. Check $REPOLINK_CONFIG
        if let Ok(path) = std::env::var("REPOLINK_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check $XDG_CONFIG_HOME/repolink/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("repolink/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. Check ~/.repolink/config.toml
        dirs::home_dir()
            .map(|home| home.join(".repolink/config.toml"))
            .filter(|path| path.exists())
    }

    /// Read and parse a config file.
    fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the canonical path for repo config inside a git directory.
    pub fn repo_config_path(git_dir: &Path) -> PathBuf {
        git_dir.join("repolink/config.toml")
    }

    /// Overlay another config's repo scope onto this one.
    ///
    /// Used when a session's git directory is only known after opening.
    pub fn with_repo(&self, git_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::repo_config_path(git_dir);
        if !path.exists() {
            return Ok(self.clone());
        }
        let repo = Self::read_file(&path)?;
        repo.validate()?;
        Ok(Config {
            repo: Some(repo),
            repo_path: Some(path),
            ..self.clone()
        })
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Pick a value from repo scope, then global scope.
    fn pick<T>(&self, get: impl Fn(&ConfigFile) -> Option<T>) -> Option<T> {
        self.repo.as_ref().and_then(&get).or_else(|| get(&self.global))
    }

    /// Suffix appended to the private key path to find the public key.
    ///
    /// Defaults to `.pub`.
    pub fn public_key_suffix(&self) -> String {
        self.pick(|f| f.transfer.as_ref()?.public_key_suffix.clone())
            .unwrap_or_else(|| DEFAULT_PUBLIC_KEY_SUFFIX.to_string())
    }

    /// Reflog message for refs updated by fetch.
    pub fn reflog_message(&self) -> String {
        self.pick(|f| f.transfer.as_ref()?.reflog_message.clone())
            .unwrap_or_else(|| DEFAULT_REFLOG_MESSAGE.to_string())
    }

    /// Whether fetch prunes stale remote-tracking refs. Defaults to `false`.
    pub fn prune(&self) -> bool {
        self.pick(|f| f.transfer.as_ref()?.prune).unwrap_or(false)
    }

    /// Whether engine progress is forwarded to the host. Defaults to `true`.
    pub fn progress(&self) -> bool {
        self.pick(|f| f.transfer.as_ref()?.progress).unwrap_or(true)
    }

    /// Status computation flags. Every flag defaults to `true`.
    pub fn status_options(&self) -> StatusOptions {
        StatusOptions {
            include_untracked: self
                .pick(|f| f.status.as_ref()?.include_untracked)
                .unwrap_or(true),
            recurse_untracked_dirs: self
                .pick(|f| f.status.as_ref()?.recurse_untracked_dirs)
                .unwrap_or(true),
            renames_head_to_index: self
                .pick(|f| f.status.as_ref()?.renames_head_to_index)
                .unwrap_or(true),
        }
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the path to the loaded repo config file.
    pub fn repo_config_loaded_from(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }
}
