//! Acquisition flow typestate.
//!
//! One manifest entry moves through explicit states:
//!
//! ```text
//! ResolvedArtifact --[fetch()]--> FetchedArtifact --[prepare()]--> PreparedArtifact
//!                                                                       |
//!                                                                 [install()]
//!                                                                       v
//!                                                              InstalledArtifact
//! ```
//!
//! An archive cannot be unpacked before it was downloaded, and nothing is
//! moved into the bin directory before the payload is located. The scratch
//! directory is owned by the intermediate states and removed when they are
//! dropped, whichever state the entry stops in.
//!
//! # Usage
//!
//! ```ignore
//! let resolved = ResolvedArtifact::resolve(&root, &platform, name, entry)?;
//! let fetched = resolved.fetch(&root, &fetcher, &reporter).await?;
//! let installed = fetched.prepare(&reporter).await?.install(&reporter).await?;
//! ```

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use binman_schema::{ManifestEntry, ManifestError, Placeholders, Platform};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info};

use crate::Reporter;
use crate::install::{self, InstallError};
use crate::io::extract::{self, ArchiveFormat, ExtractError};
use crate::io::fetch::{self, DownloadRequest, FetchError, Fetcher};
use crate::paths::{InstallRoot, filename_from_url};

/// Pipeline stage an entry failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Turning the entry into a concrete URL.
    Resolve,
    /// Downloading.
    Fetch,
    /// Unpacking an archive.
    Extract,
    /// Moving the payload into place.
    Install,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolve => "resolve",
            Self::Fetch => "fetch",
            Self::Extract => "extract",
            Self::Install => "install",
        })
    }
}

/// Failure of a single entry.
#[derive(Error, Debug)]
pub enum AcquireError {
    /// The entry itself is malformed, e.g. its target leaves `bin/`.
    #[error(transparent)]
    Invalid(#[from] ManifestError),

    /// The resolved URL is unusable.
    #[error("{0}")]
    Resolve(#[source] FetchError),

    /// The scratch directory could not be created.
    #[error("failed to create scratch directory: {0}")]
    Scratch(#[source] io::Error),

    /// Download failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Extraction failed.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Installing the payload failed.
    #[error(transparent)]
    Install(#[from] InstallError),
}

impl AcquireError {
    /// The stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Invalid(_) | Self::Resolve(_) => Stage::Resolve,
            Self::Scratch(_) | Self::Fetch(_) => Stage::Fetch,
            Self::Extract(_) => Stage::Extract,
            Self::Install(_) => Stage::Install,
        }
    }
}

/// State 1: the URL and final location of an entry are known.
#[derive(Debug)]
pub struct ResolvedArtifact {
    /// Binary name.
    pub name: String,
    /// Entry as declared in the manifest.
    pub entry: ManifestEntry,
    /// Substitution values for this entry.
    pub placeholders: Placeholders,
    /// Fully resolved download URL.
    pub url: String,
    /// Where the payload will be installed.
    pub final_path: PathBuf,
}

/// State 2: the artifact has been downloaded into scratch.
#[derive(Debug)]
pub struct FetchedArtifact {
    /// The resolved entry.
    pub resolved: ResolvedArtifact,
    /// Downloaded file inside the scratch directory.
    pub file: PathBuf,
    /// Format selected from the file name.
    pub format: ArchiveFormat,
    /// Bytes written.
    pub bytes: u64,
    scratch: TempDir,
}

/// State 3: archives are unpacked and the payload can be located.
#[derive(Debug)]
pub struct PreparedArtifact {
    /// The downloaded artifact.
    pub fetched: FetchedArtifact,
    /// Extraction directory, for archives.
    pub extract_dir: Option<PathBuf>,
}

/// Final state: the payload sits at its install location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledArtifact {
    /// Binary name.
    pub name: String,
    /// Installed version.
    pub version: String,
    /// Install location.
    pub path: PathBuf,
    /// Size of the download.
    pub bytes: u64,
}

impl ResolvedArtifact {
    /// Resolve `entry` for `platform` under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Invalid`] if the entry fails validation and
    /// [`AcquireError::Resolve`] if the resolved URL is not an absolute
    /// http(s) URL.
    pub fn resolve(
        root: &InstallRoot,
        platform: &Platform,
        name: &str,
        entry: &ManifestEntry,
    ) -> Result<Self, AcquireError> {
        entry.validate(name)?;
        let placeholders = entry.placeholders(platform, root.path());
        let url = entry.resolve_url(platform, root.path());
        fetch::parse_url(&url).map_err(AcquireError::Resolve)?;

        let final_path = root.binary_path(name, entry.sub_path());
        debug!(name, url = %url, dest = %final_path.display(), "resolved");

        Ok(Self {
            name: name.to_string(),
            entry: entry.clone(),
            placeholders,
            url,
            final_path,
        })
    }

    /// Version token of the entry.
    pub fn version(&self) -> &str {
        &self.entry.version
    }

    /// Name the download is saved under: the last URL segment, or the entry
    /// name when that segment is empty, `.` or `..`.
    pub fn download_name(&self) -> &str {
        match filename_from_url(&self.url) {
            "" | "." | ".." => &self.name,
            file => file,
        }
    }

    /// Download into a fresh scratch directory under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Scratch`] or [`AcquireError::Fetch`].
    pub async fn fetch(
        self,
        root: &InstallRoot,
        fetcher: &Fetcher,
        reporter: &dyn Reporter,
    ) -> Result<FetchedArtifact, AcquireError> {
        let tmp = root.tmp_dir();
        tokio::fs::create_dir_all(&tmp)
            .await
            .map_err(AcquireError::Scratch)?;
        let scratch = tempfile::Builder::new()
            .prefix(&scratch_prefix(&self.name))
            .tempdir_in(&tmp)
            .map_err(AcquireError::Scratch)?;

        let file = scratch.path().join(self.download_name());
        let format = ArchiveFormat::detect(&file);

        let bytes = fetcher
            .download(
                DownloadRequest {
                    name: &self.name,
                    version: self.version(),
                    url: &self.url,
                    headers: &self.entry.headers,
                    dest: &file,
                },
                reporter,
            )
            .await?;

        Ok(FetchedArtifact {
            resolved: self,
            file,
            format,
            bytes,
            scratch,
        })
    }
}

/// Tempdir prefix for an entry, with anything but `[A-Za-z0-9._-]` replaced.
fn scratch_prefix(name: &str) -> String {
    let mut prefix: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    prefix.push('-');
    prefix
}

impl FetchedArtifact {
    /// Scratch directory of this entry.
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Unpack the download if it is an archive.
    ///
    /// Extraction runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Extract`].
    pub async fn prepare(self, reporter: &dyn Reporter) -> Result<PreparedArtifact, AcquireError> {
        if !self.format.is_archive() {
            return Ok(PreparedArtifact {
                fetched: self,
                extract_dir: None,
            });
        }

        reporter.extracting(
            &self.resolved.name,
            self.resolved.version(),
            self.format.as_str(),
        );

        let format = self.format;
        let source = self.file.clone();
        let dest = self.scratch.path().join("extracted");
        let target = dest.clone();

        tokio::task::spawn_blocking(move || extract::extract(format, &source, &target))
            .await
            .map_err(|e| ExtractError::Io(io::Error::other(e)))??;

        debug!(name = %self.resolved.name, dir = %dest.display(), "extracted");
        Ok(PreparedArtifact {
            fetched: self,
            extract_dir: Some(dest),
        })
    }
}

impl PreparedArtifact {
    /// Move the payload into place. The scratch directory is removed when
    /// this returns.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Install`].
    pub async fn install(self, reporter: &dyn Reporter) -> Result<InstalledArtifact, AcquireError> {
        let Self {
            fetched,
            extract_dir,
        } = self;
        let FetchedArtifact {
            resolved,
            file,
            bytes,
            scratch,
            ..
        } = fetched;

        reporter.installing(&resolved.name, resolved.version(), &resolved.final_path);

        let final_path = resolved.final_path.clone();
        let entry = resolved.entry.clone();
        let placeholders = resolved.placeholders.clone();

        let path = tokio::task::spawn_blocking(move || {
            install::install(
                &entry,
                &placeholders,
                &file,
                extract_dir.as_deref(),
                &final_path,
            )
        })
        .await
        .map_err(|e| InstallError::Io {
            action: "join install task for",
            path: resolved.final_path.clone(),
            source: io::Error::other(e),
        })??;

        drop(scratch);
        info!(name = %resolved.name, path = %path.display(), "installed");

        Ok(InstalledArtifact {
            version: resolved.entry.version,
            name: resolved.name,
            path,
            bytes,
        })
    }
}
