//! binman - declarative binary version manager
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Reads `binman.yaml`, downloads the listed binaries for the current
//! platform and installs them under one root directory.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.binman/
//! ├── binman.yaml  # Manifest
//! ├── .source      # Generated shell snippet (PATH etc.)
//! ├── bin/         # Installed binaries
//! └── tmp/         # Per-entry scratch
//! ```

pub mod cmd;
pub mod ui;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "binman")]
#[command(author, version = env!("BINMAN_VERSION"), about = "binman - declarative binary version manager")]
pub struct Cli {
    /// Install root (defaults to the directory binman is installed in)
    #[arg(long, global = true, env = "BMAN_PATH")]
    pub root: Option<PathBuf>,

    /// Show debug logs on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download and install binaries from binman.yaml
    Download(DownloadArgs),
    /// Set up a new install root backed by a git repository
    Bootstrap {
        /// Git repository holding binman.yaml
        #[arg(long)]
        gitrepo: Option<String>,
        /// Directory to clone into
        #[arg(long)]
        location: Option<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct DownloadArgs {
    /// Binaries to download (all when omitted)
    pub names: Vec<String>,

    /// Show what would be downloaded without touching the filesystem
    #[arg(long)]
    pub dry_run: bool,

    /// Exit non-zero when any binary fails
    #[arg(long)]
    pub strict: bool,

    /// HTTP timeout in seconds
    #[arg(long, env = "BINMAN_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Override the detected operating system (e.g. linux, darwin)
    #[arg(long, env = "BINMAN_SYSTEM")]
    pub system: Option<String>,

    /// Override the detected CPU architecture (e.g. amd64, arm64)
    #[arg(long, env = "BINMAN_CPU")]
    pub cpu: Option<String>,
}
