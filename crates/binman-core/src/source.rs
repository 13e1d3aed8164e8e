//! The generated `.source` shell script.
//!
//! Every entry may carry `source` lines; they are resolved with the entry's
//! own placeholders and concatenated in name order.

use std::io;
use std::path::PathBuf;

use binman_schema::{ManifestEntry, Platform};
use thiserror::Error;
use tracing::debug;

use crate::paths::InstallRoot;

/// Failure writing the source script.
#[derive(Error, Debug)]
pub enum GenError {
    /// The script could not be written.
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        /// Script path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Render the script for `entries`, sorted by name.
pub fn render<'a>(
    root: &InstallRoot,
    platform: &Platform,
    entries: impl IntoIterator<Item = (&'a str, &'a ManifestEntry)>,
) -> String {
    let mut entries: Vec<_> = entries.into_iter().collect();
    entries.sort_by_key(|(name, _)| *name);

    let mut script = String::new();
    for (_, entry) in entries {
        let placeholders = entry.placeholders(platform, root.path());
        for line in &entry.source {
            script.push_str(&placeholders.resolve(line));
            script.push('\n');
        }
    }
    script
}

/// Write the script to `<root>/.source`, replacing any previous one.
///
/// # Errors
///
/// Returns [`GenError::Write`] if the file cannot be written.
pub async fn generate<'a>(
    root: &InstallRoot,
    platform: &Platform,
    entries: impl IntoIterator<Item = (&'a str, &'a ManifestEntry)>,
) -> Result<PathBuf, GenError> {
    let path = root.source_script_path();
    let script = render(root, platform, entries);

    tokio::fs::write(&path, script.as_bytes())
        .await
        .map_err(|source| GenError::Write {
            path: path.clone(),
            source,
        })?;

    debug!(path = %path.display(), bytes = script.len(), "wrote source script");
    Ok(path)
}
