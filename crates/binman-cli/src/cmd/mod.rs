//! Subcommand implementations.

pub mod bootstrap;
pub mod completions;
pub mod download;
