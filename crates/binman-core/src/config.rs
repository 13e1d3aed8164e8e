//! Locating and loading `binman.yaml`.
//!
//! Failures here are the only fatal ones: without a manifest there is
//! nothing to process.

use std::io;
use std::path::{Path, PathBuf};

use binman_schema::{MANIFEST_FILE, Manifest, ManifestError};
use thiserror::Error;
use tracing::debug;

use crate::paths::InstallRoot;

/// Manifest or install-root problems that abort a run before any entry is
/// processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The install root could not be derived from the running executable.
    #[error("could not determine install root (set BMAN_PATH): {0}")]
    Root(#[source] io::Error),

    /// No manifest exists at any candidate location.
    #[error("binman.yaml not found (searched: {})", display_paths(.searched))]
    NotFound {
        /// Locations that were checked, in order.
        searched: Vec<PathBuf>,
    },

    /// The manifest exists but could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// Manifest path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The manifest is malformed or violates an entry invariant.
    #[error("invalid manifest {}: {source}", .path.display())]
    Parse {
        /// Manifest path.
        path: PathBuf,
        /// Parse or validation error.
        #[source]
        source: ManifestError,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Candidate manifest locations, in lookup order: the install root, the
/// directory of the running executable, then the working directory.
pub fn manifest_candidates(
    root: &InstallRoot,
    exe_dir: Option<&Path>,
    cwd: Option<&Path>,
) -> Vec<PathBuf> {
    let mut candidates = vec![root.manifest_path()];
    for dir in [exe_dir, cwd].into_iter().flatten() {
        let path = dir.join(MANIFEST_FILE);
        if !candidates.contains(&path) {
            candidates.push(path);
        }
    }
    candidates
}

/// Find the first existing manifest among [`manifest_candidates`].
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] listing every location checked.
pub fn locate_manifest(
    root: &InstallRoot,
    exe_dir: Option<&Path>,
    cwd: Option<&Path>,
) -> Result<PathBuf, ConfigError> {
    let searched = manifest_candidates(root, exe_dir, cwd);
    match searched.iter().find(|p| p.is_file()) {
        Some(found) => {
            debug!(path = %found.display(), "found manifest");
            Ok(found.clone())
        }
        None => Err(ConfigError::NotFound { searched }),
    }
}

/// Read, parse and validate a manifest file.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] if the file cannot be read and
/// [`ConfigError::Parse`] if it is malformed or an entry is invalid.
pub async fn load_manifest(path: &Path) -> Result<Manifest, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let parse_error = |source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let manifest = Manifest::from_yaml_str(&content).map_err(parse_error)?;
    manifest.validate().map_err(parse_error)?;

    debug!(path = %path.display(), entries = manifest.len(), "loaded manifest");
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_candidates_are_deduplicated() {
        let root = InstallRoot::new("/srv/bm");
        let candidates = manifest_candidates(&root, Some(Path::new("/srv/bm")), Some(Path::new("/work")));
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/srv/bm/binman.yaml"),
                PathBuf::from("/work/binman.yaml")
            ]
        );
    }

    #[test]
    fn test_locate_falls_back_to_cwd() {
        let root_dir = tempdir().unwrap();
        let cwd = tempdir().unwrap();
        std::fs::write(cwd.path().join(MANIFEST_FILE), "").unwrap();

        let root = InstallRoot::new(root_dir.path());
        let found = locate_manifest(&root, None, Some(cwd.path())).unwrap();
        assert_eq!(found, cwd.path().join(MANIFEST_FILE));
    }

    #[test]
    fn test_locate_prefers_root() {
        let root_dir = tempdir().unwrap();
        let cwd = tempdir().unwrap();
        std::fs::write(root_dir.path().join(MANIFEST_FILE), "").unwrap();
        std::fs::write(cwd.path().join(MANIFEST_FILE), "").unwrap();

        let root = InstallRoot::new(root_dir.path());
        let found = locate_manifest(&root, None, Some(cwd.path())).unwrap();
        assert_eq!(found, root.manifest_path());
    }

    #[test]
    fn test_locate_reports_searched_paths() {
        let root_dir = tempdir().unwrap();
        let root = InstallRoot::new(root_dir.path());
        let err = locate_manifest(&root, None, None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { ref searched } if searched.len() == 1));
        assert!(err.to_string().contains("binman.yaml not found"));
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        std::fs::write(&path, "tool:\n  url: https://x.io/${version}/tool\n").unwrap();

        let err = load_manifest(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_load_rejects_install_target_outside_bin() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        for yaml in [
            "tool:\n  url: https://x.io/tool\n  subPath: ../../outside\n",
            "k8s/helm:\n  url: https://x.io/helm\n",
        ] {
            std::fs::write(&path, yaml).unwrap();
            let err = load_manifest(&path).await.unwrap_err();
            assert!(matches!(err, ConfigError::Parse { .. }), "{yaml}");
        }
    }

    #[tokio::test]
    async fn test_load_valid_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        std::fs::write(&path, "tool:\n  url: https://x.io/${version}/tool\n  version: v1\n").unwrap();

        let manifest = load_manifest(&path).await.unwrap();
        assert_eq!(manifest.get("tool").unwrap().version, "v1");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = load_manifest(&dir.path().join("nope.yaml")).await.unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
