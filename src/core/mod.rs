//! core
//!
//! Core domain types and configuration for repolink.
//!
//! # Modules
//!
//! - [`types`] - Strong types: SessionKey, SessionRef, RemoteName, RefSpec
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid names from reaching the engine
//! - Schemas are strict and self-describing

pub mod config;
pub mod types;
