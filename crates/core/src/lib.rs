//! Core library for the MCP server installer
//!
//! This crate contains the installation lifecycle engine (reference
//! resolution, source fetching, plan validation, image builds, metadata
//! persistence, and orchestration) together with configuration, logging,
//! and error handling shared with the CLI.

#![deny(rustdoc::broken_intra_doc_links)]

pub mod build;
pub mod config;
pub mod docker;
pub mod errors;
pub mod git;
pub mod lifecycle;
pub mod logging;
pub mod metadata;
pub mod plan;
/// Planning collaborators producing analysis text and raw execution plans.
pub mod planner;
pub mod process;
pub mod reference;
pub mod run_command;
pub mod runtime;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
