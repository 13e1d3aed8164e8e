//! binman - declarative binary version manager

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use binman_cli::cmd;
use binman_cli::{Cli, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise warnings only, or debug with --verbose.
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Download(args) => cmd::download::download(cli.root.as_deref(), &args).await,
        Commands::Bootstrap { gitrepo, location } => {
            cmd::bootstrap::bootstrap(gitrepo.as_deref(), location.as_deref())
        }
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}
