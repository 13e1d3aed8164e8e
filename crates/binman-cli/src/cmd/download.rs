//! Download command

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use binman_core::config::{self, ConfigError};
use binman_core::io::fetch::Fetcher;
use binman_core::pipeline::{self, Context, RunOptions};
use binman_core::{InstallRoot, Reporter, source};
use binman_schema::Platform;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::DownloadArgs;
use crate::ui::ConsoleReporter;

/// The platform to resolve for: the host, with optional overrides.
pub fn platform(system: Option<&str>, cpu: Option<&str>) -> Platform {
    let mut platform = Platform::current();
    if let Some(system) = system.filter(|s| !s.is_empty()) {
        platform.system = system.to_string();
    }
    if let Some(cpu) = cpu.filter(|c| !c.is_empty()) {
        platform.cpu = cpu.to_string();
    }
    platform
}

fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Download and install the selected manifest entries, then regenerate the
/// source script.
pub async fn download(root: Option<&Path>, args: &DownloadArgs) -> Result<()> {
    let root = InstallRoot::discover(root).map_err(ConfigError::Root)?;
    let cwd = std::env::current_dir().ok();
    let manifest_path = config::locate_manifest(&root, exe_dir().as_deref(), cwd.as_deref())?;
    let manifest = config::load_manifest(&manifest_path).await?;

    let platform = platform(args.system.as_deref(), args.cpu.as_deref());
    debug!(root = %root.path().display(), %platform, manifest = %manifest_path.display(), "starting download");

    let reporter = Arc::new(ConsoleReporter::new());
    let fetcher = Fetcher::new(args.timeout.map(Duration::from_secs))
        .context("Failed to build HTTP client")?;
    let ctx = Context::new(root.clone(), platform.clone(), fetcher, reporter.clone());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let opts = RunOptions {
        dry_run: args.dry_run,
    };
    let report = pipeline::run(&ctx, &manifest, &args.names, opts, &cancel).await;

    if args.dry_run {
        reporter.info("Dry run: nothing was downloaded and .source was left as is");
    } else {
        tokio::fs::create_dir_all(root.path())
            .await
            .with_context(|| format!("Failed to create {}", root.path().display()))?;
        let script = source::generate(&root, &platform, report.source_entries(&manifest))
            .await
            .context("Failed to regenerate source script")?;
        debug!(path = %script.display(), "source script updated");
        reporter.success(&format!("Updated {}", script.display()));
    }

    if report.has_failures() {
        let failed: Vec<&str> = report.failed.iter().map(|f| f.name.as_str()).collect();
        let msg = format!("{} failed: {}", failed.len(), failed.join(", "));
        if args.strict {
            bail!(msg);
        }
        reporter.warning(&msg);
    }

    Ok(())
}
