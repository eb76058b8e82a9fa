//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--debug`: Enable debug logging on stderr
//! - `--config <path>`: Use this global config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::core::types::SessionRef;

/// repolink - drive repository sessions, fetches and pushes for a host
#[derive(Parser, Debug)]
#[command(name = "repolink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Global configuration file (overrides the default search)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
///
/// `<REPO>` is a repository path, or `#<key>` for a session registered
/// earlier in the same `serve` process.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print repository properties as JSON
    Properties {
        /// Repository path or #key
        repo: SessionRef,
    },

    /// Print changed paths grouped by status category as JSON
    Status {
        /// Repository path or #key
        repo: SessionRef,
    },

    /// Fetch from a remote
    #[command(after_help = "\
EXAMPLES:
    repolink fetch ./checkout
    repolink fetch ./checkout --remote upstream --prune
    repolink fetch ./checkout --key-file ~/.ssh/id_ed25519")]
    Fetch {
        /// Repository path or #key
        repo: SessionRef,

        /// Remote to fetch from
        #[arg(long, default_value = "origin")]
        remote: String,

        /// Private key for key-pair authentication (public key: same path + .pub)
        #[arg(long, value_name = "PATH")]
        key_file: Option<PathBuf>,

        /// Prune remote-tracking refs that no longer exist on the remote
        #[arg(long)]
        prune: bool,
    },

    /// Push branches to a remote
    #[command(after_help = "\
EXAMPLES:
    repolink push ./checkout --branch main
    repolink push ./checkout --branch main --branch release --remote upstream
    repolink push ./checkout --branch +refs/heads/wip:refs/heads/backup")]
    Push {
        /// Repository path or #key
        repo: SessionRef,

        /// Branch name or refspec to push (repeatable)
        #[arg(long = "branch", value_name = "BRANCH", required = true)]
        branches: Vec<String>,

        /// Remote to push to
        #[arg(long, default_value = "origin")]
        remote: String,

        /// Private key for key-pair authentication (public key: same path + .pub)
        #[arg(long, value_name = "PATH")]
        key_file: Option<PathBuf>,
    },

    /// Answer JSON requests from stdin, one per line, keeping keyed sessions
    #[command(after_help = "\
EXAMPLES:
    printf '%s\\n' '{\"op\":\"open\",\"path\":\".\"}' '{\"op\":\"status\",\"repo\":1}' | repolink serve")]
    Serve,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_fetch() {
        let cli = Cli::try_parse_from(["repolink", "fetch", "/tmp/repo", "--prune"]).unwrap();
        match cli.command {
            Command::Fetch {
                repo,
                remote,
                key_file,
                prune,
            } => {
                assert_eq!(repo, SessionRef::Path(PathBuf::from("/tmp/repo")));
                assert_eq!(remote, "origin");
                assert!(key_file.is_none());
                assert!(prune);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parse_key_reference() {
        let cli = Cli::try_parse_from(["repolink", "status", "#4"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Status {
                repo: SessionRef::Key(k)
            } if k.get() == 4
        ));
    }

    #[test]
    fn push_requires_branch() {
        assert!(Cli::try_parse_from(["repolink", "push", "/tmp/repo"]).is_err());
    }

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["repolink", "--debug", "serve"]).unwrap();
        assert!(matches!(cli.command, Command::Serve));
        assert!(cli.debug);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["repolink", "properties", ".", "--debug"]).unwrap();
        assert!(cli.debug);
    }
}
