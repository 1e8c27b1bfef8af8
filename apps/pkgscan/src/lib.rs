//! pkgscan core library.
//!
//! This crate exposes the scanner as a library: unit enumeration over an
//! ebuild repository, a catalog of independent checks, shared addons, and a
//! parallel scheduler that emits issues in deterministic order.
//!
//! High-level modules:
//! - `models`: Scopes, units, issues and the scan summary.
//! - `metadata`: Package-metadata provider, dependency and version parsing.
//! - `shell`: Syntax tree of embedded scripts and the detectors run over it.
//! - `addons`: Lazily computed shared data with on-disk persistence.
//! - `checks`: The built-in check catalog.
//! - `registry`: Catalog validation and scan planning.
//! - `source`: Post-order unit enumeration with target restrictions.
//! - `scheduler`: Dispatcher, worker pool and ordered merge.
//! - `sink`: Human/JSON result printers.
//! - `cli`, `config`, `logging`, `error`: Ambient plumbing for the binary.
pub mod addons;
pub mod checks;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod shell;
pub mod sink;
pub mod source;

#[cfg(test)]
mod testutil;
