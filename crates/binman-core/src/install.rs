//! Moving a payload into its final place in the bin directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use binman_schema::{ManifestEntry, Placeholders};
use thiserror::Error;
use tracing::debug;

use crate::io::extract::enclosed_path;

/// Errors from locating or moving a payload.
#[derive(Error, Debug)]
pub enum InstallError {
    /// The expected payload does not exist.
    #[error("payload not found: {}", .path.display())]
    NotFound {
        /// Where the payload was expected.
        path: PathBuf,
    },

    /// `originalName` resolves to a location outside the extraction directory.
    #[error("originalName '{name}' points outside the extracted archive")]
    InvalidName {
        /// The resolved name.
        name: String,
    },

    /// A filesystem step failed.
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        /// What was being done.
        action: &'static str,
        /// Path it was being done to.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

fn io_error(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> InstallError {
    let path = path.to_path_buf();
    move |source| InstallError::Io {
        action,
        path,
        source,
    }
}

/// Pick the path that will be moved into place.
///
/// Without an extraction directory the downloaded file is the payload. With
/// one, the payload is the resolved `originalName` inside it or, when no
/// name is configured, the whole directory.
///
/// # Errors
///
/// Returns [`InstallError::InvalidName`] if `originalName` escapes the
/// extraction directory.
pub fn locate_payload(
    entry: &ManifestEntry,
    placeholders: &Placeholders,
    fetched: &Path,
    extract_dir: Option<&Path>,
) -> Result<PathBuf, InstallError> {
    let Some(dir) = extract_dir else {
        return Ok(fetched.to_path_buf());
    };
    match entry.original_name() {
        None => Ok(dir.to_path_buf()),
        Some(template) => {
            let name = placeholders.resolve(template);
            enclosed_path(dir, Path::new(&name)).ok_or(InstallError::InvalidName { name })
        }
    }
}

/// Install the payload of one entry at `final_path`.
///
/// Anything already at `final_path` is replaced. Regular files are made
/// executable; directories keep the permissions they were extracted with.
///
/// # Errors
///
/// Returns [`InstallError::NotFound`] if the payload is missing and
/// [`InstallError::Io`] for any failed filesystem step.
pub fn install(
    entry: &ManifestEntry,
    placeholders: &Placeholders,
    fetched: &Path,
    extract_dir: Option<&Path>,
    final_path: &Path,
) -> Result<PathBuf, InstallError> {
    let payload = locate_payload(entry, placeholders, fetched, extract_dir)?;
    let metadata = fs::symlink_metadata(&payload)
        .map_err(|_| InstallError::NotFound {
            path: payload.clone(),
        })?;

    remove_existing(final_path)?;
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).map_err(io_error("create directory", parent))?;
    }

    fs::rename(&payload, final_path).map_err(io_error("move payload to", final_path))?;
    debug!(from = %payload.display(), to = %final_path.display(), "moved payload");

    if metadata.is_file() {
        make_executable(final_path).map_err(io_error("set permissions on", final_path))?;
    }

    Ok(final_path.to_path_buf())
}

fn remove_existing(path: &Path) -> Result<(), InstallError> {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return Ok(());
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
    .map_err(io_error("remove existing", path))?;
    debug!(path = %path.display(), "removed previous install");
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
