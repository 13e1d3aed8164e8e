//! Batch orchestration over manifest entries.
//!
//! Entries are processed one at a time. A failing entry is reported with its
//! stage and cause and the batch moves on; only the caller decides whether
//! failures affect the exit status.
//!
//! Cancellation interrupts the entry in flight. Dropping its flow state
//! removes the scratch directory, so nothing half-downloaded is left behind.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use binman_schema::{Manifest, ManifestEntry, Platform};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Reporter;
use crate::flow::{AcquireError, InstalledArtifact, ResolvedArtifact, Stage};
use crate::io::fetch::Fetcher;
use crate::paths::InstallRoot;

/// Process-wide state shared by every entry of a run.
#[derive(Clone)]
pub struct Context {
    /// Install root.
    pub root: InstallRoot,
    /// Target platform for placeholder resolution.
    pub platform: Platform,
    /// Shared HTTP client.
    pub fetcher: Fetcher,
    /// Progress sink.
    pub reporter: Arc<dyn Reporter>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("root", &self.root)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Group the state for a run.
    pub fn new(
        root: InstallRoot,
        platform: Platform,
        fetcher: Fetcher,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            root,
            platform,
            fetcher,
            reporter,
        }
    }
}

/// Knobs for a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Resolve and report without downloading anything.
    pub dry_run: bool,
}

/// An entry that failed, with the stage it failed in.
#[derive(Debug)]
pub struct EntryFailure {
    /// Binary name.
    pub name: String,
    /// Stage of the failure.
    pub stage: Stage,
    /// Cause.
    pub error: AcquireError,
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Entries installed in this run.
    pub installed: Vec<InstalledArtifact>,
    /// Entries resolved in a dry run.
    pub planned: Vec<ResolvedArtifact>,
    /// Entries that failed.
    pub failed: Vec<EntryFailure>,
    /// Requested names absent from the manifest.
    pub missing: Vec<String>,
    /// Entries interrupted or not started because the run was cancelled.
    pub skipped: Vec<String>,
}

impl RunReport {
    /// Whether any selected entry failed.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Entries that contribute to the source script: every manifest entry
    /// except those that failed in this run.
    pub fn source_entries<'a>(
        &'a self,
        manifest: &'a Manifest,
    ) -> impl Iterator<Item = (&'a str, &'a ManifestEntry)> {
        manifest
            .iter()
            .filter(move |(name, _)| !self.failed.iter().any(|f| f.name == *name))
    }
}

/// Names to process and requested names that do not exist.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// Names to process, in order.
    pub names: Vec<String>,
    /// Requested names absent from the manifest.
    pub missing: Vec<String>,
}

/// Choose the entries for a run.
///
/// No names selects every entry in lexicographic order. Otherwise the given
/// order is kept and duplicates are dropped.
pub fn select(manifest: &Manifest, names: &[String]) -> Selection {
    if names.is_empty() {
        return Selection {
            names: manifest.names().map(str::to_string).collect(),
            missing: Vec::new(),
        };
    }

    let mut seen = HashSet::new();
    let mut selection = Selection::default();
    for name in names {
        if !seen.insert(name.as_str()) {
            continue;
        }
        if manifest.contains(name) {
            selection.names.push(name.clone());
        } else {
            selection.missing.push(name.clone());
        }
    }
    selection
}

/// Run one entry through the whole flow.
///
/// # Errors
///
/// Returns the first [`AcquireError`] hit; the scratch directory is gone
/// either way.
pub async fn acquire(
    ctx: &Context,
    name: &str,
    entry: &ManifestEntry,
) -> Result<InstalledArtifact, AcquireError> {
    let reporter = ctx.reporter.as_ref();
    let resolved = ResolvedArtifact::resolve(&ctx.root, &ctx.platform, name, entry)?;
    reporter.resolved(name, resolved.version(), &resolved.url);

    resolved
        .fetch(&ctx.root, &ctx.fetcher, reporter)
        .await?
        .prepare(reporter)
        .await?
        .install(reporter)
        .await
}

/// Process the selected entries of `manifest`.
///
/// Once `cancel` fires the entry in flight is abandoned and it, along with
/// every entry not yet started, is recorded as skipped.
pub async fn run(
    ctx: &Context,
    manifest: &Manifest,
    names: &[String],
    opts: RunOptions,
    cancel: &CancellationToken,
) -> RunReport {
    let reporter = ctx.reporter.as_ref();
    let selection = select(manifest, names);
    let mut report = RunReport {
        missing: selection.missing,
        ..RunReport::default()
    };

    for name in &report.missing {
        warn!(name = %name, "not declared in manifest");
        reporter.warning(&format!("{name} is not declared in the manifest"));
    }

    if selection.names.is_empty() {
        return report;
    }

    reporter.section(if opts.dry_run { "Resolving" } else { "Downloading" });
    let start = Instant::now();

    for name in selection.names {
        if cancel.is_cancelled() {
            report.skipped.push(name);
            continue;
        }
        let Some(entry) = manifest.get(&name) else {
            continue;
        };

        let outcome = if opts.dry_run {
            ResolvedArtifact::resolve(&ctx.root, &ctx.platform, &name, entry).map(|resolved| {
                reporter.resolved(&name, resolved.version(), &resolved.url);
                reporter.done(
                    &name,
                    resolved.version(),
                    &resolved.final_path.display().to_string(),
                );
                report.planned.push(resolved);
            })
        } else {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = acquire(ctx, &name, entry) => Some(result),
            };
            let Some(result) = result else {
                warn!(name = %name, "interrupted");
                report.skipped.push(name);
                continue;
            };
            result.map(|installed| {
                reporter.done(&name, &installed.version, &installed.path.display().to_string());
                report.installed.push(installed);
            })
        };

        if let Err(error) = outcome {
            let stage = error.stage();
            warn!(name = %name, %stage, error = %error, "entry failed");
            reporter.failed(&name, &entry.version, &format!("{stage}: {error}"));
            report.failed.push(EntryFailure { name, stage, error });
        }
    }

    if !report.skipped.is_empty() {
        reporter.warning(&format!(
            "cancelled, skipped: {}",
            report.skipped.join(", ")
        ));
    }

    let (count, action) = if opts.dry_run {
        (report.planned.len(), "resolved")
    } else {
        (report.installed.len(), "installed")
    };
    info!(count, failed = report.failed.len(), "run finished");
    reporter.summary(count, action, start.elapsed().as_secs_f64());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use mockito::Server;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn context(root: &std::path::Path) -> Context {
        Context::new(
            InstallRoot::new(root),
            Platform::new("linux", "amd64"),
            Fetcher::new(None).unwrap(),
            Arc::new(NullReporter),
        )
    }

    fn abc_manifest(base: &str) -> Manifest {
        let mut manifest = Manifest::new();
        for name in ["a", "b", "c"] {
            manifest.insert(name, ManifestEntry::new(format!("{base}/{name}"), "1"));
        }
        manifest
    }

    fn tar_gz(name: &str, data: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, data).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_select_all_is_lexicographic() {
        let manifest = abc_manifest("https://x.io");
        let selection = select(&manifest, &[]);
        assert_eq!(selection.names, names(&["a", "b", "c"]));
        assert!(selection.missing.is_empty());
    }

    #[test]
    fn test_select_keeps_order_and_dedupes() {
        let manifest = abc_manifest("https://x.io");
        let selection = select(&manifest, &names(&["c", "d", "a", "c"]));
        assert_eq!(selection.names, names(&["c", "a"]));
        assert_eq!(selection.missing, names(&["d"]));
    }

    #[tokio::test]
    async fn test_selective_download() {
        let mut server = Server::new_async().await;
        let only_b = server
            .mock("GET", "/b")
            .with_status(200)
            .with_body("b")
            .expect(1)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let manifest = abc_manifest(&server.url());

        let report = run(
            &ctx,
            &manifest,
            &names(&["b", "d"]),
            RunOptions::default(),
            &CancellationToken::new(),
        )
        .await;

        only_b.assert_async().await;
        assert_eq!(report.installed.len(), 1);
        assert_eq!(report.installed[0].name, "b");
        assert_eq!(report.missing, names(&["d"]));
        assert!(!report.has_failures());
        assert!(ctx.root.binary_path("b", None).exists());
        assert!(!ctx.root.binary_path("a", None).exists());
        assert!(!ctx.root.binary_path("c", None).exists());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_batch() {
        let mut server = Server::new_async().await;
        let _a = server.mock("GET", "/a").with_status(404).create_async().await;
        let _b = server
            .mock("GET", "/b")
            .with_status(200)
            .with_body("b")
            .create_async()
            .await;
        let _c = server
            .mock("GET", "/c")
            .with_status(200)
            .with_body("c")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let manifest = abc_manifest(&server.url());

        let report = run(&ctx, &manifest, &[], RunOptions::default(), &CancellationToken::new()).await;

        assert_eq!(report.installed.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "a");
        assert_eq!(report.failed[0].stage, Stage::Fetch);

        let contributing: Vec<&str> = report.source_entries(&manifest).map(|(n, _)| n).collect();
        assert_eq!(contributing, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_archive_entry_with_original_name() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/v3/tool_linux_amd64.tar.gz")
            .with_status(200)
            .with_body(tar_gz("tool_linux_amd64", b"#!/bin/sh\n"))
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let mut manifest = Manifest::new();
        manifest.insert(
            "tool",
            ManifestEntry::new(
                format!("{}/${{version}}/tool_${{system}}_${{cpu}}.tar.gz", server.url()),
                "v3",
            )
            .with_original_name("tool_${system}_${cpu}"),
        );

        let report = run(&ctx, &manifest, &[], RunOptions::default(), &CancellationToken::new()).await;

        assert!(!report.has_failures(), "{:?}", report.failed);
        let installed = ctx.root.binary_path("tool", None);
        assert_eq!(fs::read(&installed).unwrap(), b"#!/bin/sh\n");
        assert_eq!(fs::read_dir(ctx.root.tmp_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/a")
            .with_status(200)
            .with_body("a")
            .expect(2)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let mut manifest = Manifest::new();
        manifest.insert("a", ManifestEntry::new(format!("{}/a", server.url()), "1"));

        for _ in 0..2 {
            let report =
                run(&ctx, &manifest, &[], RunOptions::default(), &CancellationToken::new()).await;
            assert_eq!(report.installed.len(), 1);
        }

        assert_eq!(fs::read(ctx.root.binary_path("a", None)).unwrap(), b"a");
        assert_eq!(fs::read_dir(ctx.root.bin_dir()).unwrap().count(), 1);
        assert_eq!(fs::read_dir(ctx.root.tmp_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let manifest = abc_manifest("https://downloads.invalid");

        let opts = RunOptions { dry_run: true };
        let report = run(&ctx, &manifest, &[], opts, &CancellationToken::new()).await;

        assert_eq!(report.planned.len(), 3);
        assert_eq!(report.planned[0].url, "https://downloads.invalid/a");
        assert!(!ctx.root.bin_dir().exists());
        assert!(!ctx.root.tmp_dir().exists());
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_everything() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let manifest = abc_manifest("https://downloads.invalid");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = run(&ctx, &manifest, &[], RunOptions::default(), &cancel).await;

        assert!(report.installed.is_empty());
        assert_eq!(report.skipped, names(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_stalled_download() {
        let mut server = Server::new_async().await;
        let _slow = server
            .mock("GET", "/slow")
            .with_status(200)
            .with_chunked_body(|w| {
                w.write_all(b"partial")?;
                std::thread::sleep(Duration::from_secs(3));
                w.write_all(b"rest")
            })
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let mut manifest = Manifest::new();
        manifest.insert("slow", ManifestEntry::new(format!("{}/slow", server.url()), "1"));
        manifest.insert("later", ManifestEntry::new(format!("{}/later", server.url()), "1"));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let report = run(
            &ctx,
            &manifest,
            &names(&["slow", "later"]),
            RunOptions::default(),
            &cancel,
        )
        .await;

        assert!(start.elapsed() < Duration::from_secs(2), "{:?}", start.elapsed());
        assert!(report.installed.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(report.skipped, names(&["slow", "later"]));
        assert!(!ctx.root.binary_path("slow", None).exists());
        assert_eq!(fs::read_dir(ctx.root.tmp_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_sub_path_outside_bin_fails_at_resolve() {
        let mut server = Server::new_async().await;
        let never = server
            .mock("GET", "/tool")
            .with_status(200)
            .with_body("tool")
            .expect(0)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let ctx = context(&dir.path().join("root"));
        let mut manifest = Manifest::new();
        manifest.insert(
            "tool",
            ManifestEntry::new(format!("{}/tool", server.url()), "1")
                .with_sub_path("../../outside"),
        );

        let report = run(&ctx, &manifest, &[], RunOptions::default(), &CancellationToken::new()).await;

        never.assert_async().await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].stage, Stage::Resolve);
        assert!(!dir.path().join("outside").exists());
    }
}
