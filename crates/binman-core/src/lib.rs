//! Core library for binman: locate and load the manifest, then fetch, unpack
//! and install every entry and regenerate the source script.

pub mod config;
pub mod flow;
pub mod install;
pub mod io;
/// Install root layout.
pub mod paths;
pub mod pipeline;
pub mod reporter;
pub mod source;

pub use config::ConfigError;
pub use flow::{AcquireError, InstalledArtifact, Stage};
pub use paths::InstallRoot;
pub use pipeline::{Context, RunOptions, RunReport};
pub use reporter::{NullReporter, Reporter};

/// User Agent string for outgoing requests
pub const USER_AGENT: &str = concat!("binman/", env!("CARGO_PKG_VERSION"));
