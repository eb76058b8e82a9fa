//! repolink - repository sessions and transfer orchestration for a host
//!
//! repolink sits between a host application and a version-control engine.
//! It keeps track of open repository sessions, picks credentials during
//! remote handshakes, caches remote connections, runs multi-stage fetch
//! and push protocols, and serializes repository state into trees the host
//! can consume.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Command-line host adapter (parses args, prints replies)
//! - [`serialize`] - Properties and status trees
//! - [`transfer`] - Fetch and push stage sequences, progress forwarding
//! - [`session`] - Registry, sessions, remote cache, credential resolver
//! - [`host`] - Host channel and reply envelope
//! - [`vcs`] - Engine traits with git2 and mock implementations
//! - [`core`] - Domain types and configuration
//!
//! # Invariants
//!
//! 1. Every public operation clears the session's last error at entry
//! 2. An invalid session never reaches the engine
//! 3. Connections and push-sets are released on every exit path
//! 4. A failed serialization yields no tree at all

pub mod cli;
pub mod core;
pub mod host;
pub mod serialize;
pub mod session;
pub mod transfer;
pub mod vcs;
