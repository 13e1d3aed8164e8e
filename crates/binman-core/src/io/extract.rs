//! Archive extraction module
//!
//! Handles tar.gz and zip archives. Anything else is passed through as the
//! payload itself.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

/// Errors from unpacking an archive.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Filesystem or decompression failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The zip index could not be read.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A tar entry is neither a directory nor a regular file.
    #[error("unsupported entry type {kind} for {}", .path.display())]
    UnsupportedEntryType {
        /// Stored entry name.
        path: PathBuf,
        /// Tar entry type.
        kind: String,
    },

    /// An entry would be written outside the extraction directory.
    #[error("entry {} escapes the extraction directory", .path.display())]
    PathTraversal {
        /// Stored entry name.
        path: PathBuf,
    },
}

/// How a fetched file is turned into a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Gzip-compressed tar archive (`.tar.gz` / `.tgz`).
    TarGz,
    /// Zip archive (`.zip`).
    Zip,
    /// Not an archive: the downloaded file is the payload.
    Passthrough,
}

impl ArchiveFormat {
    /// Detect the format from the file name suffix (case-insensitive).
    pub fn detect(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Self::TarGz
        } else if name.ends_with(".zip") {
            Self::Zip
        } else {
            Self::Passthrough
        }
    }

    /// Whether extraction produces a directory.
    pub fn is_archive(self) -> bool {
        !matches!(self, Self::Passthrough)
    }

    /// Short display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
            Self::Passthrough => "raw",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unpack `source` into `dest` according to `format`.
///
/// [`ArchiveFormat::Passthrough`] is a no-op. On failure `dest` may hold a
/// partial extraction; the caller owns its cleanup.
///
/// # Errors
///
/// See [`ExtractError`].
pub fn extract(format: ArchiveFormat, source: &Path, dest: &Path) -> Result<(), ExtractError> {
    match format {
        ArchiveFormat::TarGz => extract_tar_gz(source, dest),
        ArchiveFormat::Zip => extract_zip(source, dest),
        ArchiveFormat::Passthrough => Ok(()),
    }
}

/// Join `name` onto `root`, refusing names that leave `root` lexically.
///
/// `..` may only cancel components the name itself added; absolute names are
/// rejected.
pub fn enclosed_path(root: &Path, name: &Path) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(root.join(relative))
}

/// Extract a tar.gz archive to a destination directory
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive_path)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    extract_tar(decoder, dest_dir)
}

fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<(), ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let stored = entry.path()?.into_owned();
        let kind = entry.header().entry_type();

        // Archive-level metadata, not a file.
        if kind.is_pax_global_extensions() {
            continue;
        }

        let target = enclosed_path(dest_dir, &stored)
            .ok_or_else(|| ExtractError::PathTraversal {
                path: stored.clone(),
            })?;

        if kind.is_dir() {
            fs::create_dir_all(&target)?;
        } else if kind.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mode = entry.header().mode().ok();
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            if let Some(mode) = mode {
                apply_mode(&target, mode)?;
            }
            debug!(entry = %stored.display(), "extracted");
        } else {
            return Err(ExtractError::UnsupportedEntryType {
                path: stored,
                kind: format!("{kind:?}"),
            });
        }
    }

    Ok(())
}

/// Extract a zip archive to a destination directory
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    fs::create_dir_all(dest_dir)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let stored = PathBuf::from(file.name());
        let target = enclosed_path(dest_dir, &stored)
            .ok_or_else(|| ExtractError::PathTraversal {
                path: stored.clone(),
            })?;

        if file.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut file, &mut out)?;
        if let Some(mode) = file.unix_mode() {
            apply_mode(&target, mode)?;
        }
        debug!(entry = %stored.display(), "extracted");
    }

    Ok(())
}

/// Apply stored permission bits, keeping the file readable and writable by
/// its owner.
#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode((mode & 0o777) | 0o600))
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn apply_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_tar_gz(path: &Path, build: impl FnOnce(&mut tar::Builder<GzEncoder<File>>)) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        build(&mut builder);
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn append_file(builder: &mut tar::Builder<GzEncoder<File>>, name: &str, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, name, data).unwrap();
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(ArchiveFormat::detect(Path::new("yq.tar.gz")), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::detect(Path::new("yq.tgz")), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::detect(Path::new("tool.zip")), ArchiveFormat::Zip);
        assert_eq!(ArchiveFormat::detect(Path::new("kubectl")), ArchiveFormat::Passthrough);
        assert_eq!(ArchiveFormat::detect(Path::new("217034480")), ArchiveFormat::Passthrough);
    }

    #[test]
    fn test_detect_format_case_insensitive() {
        assert_eq!(ArchiveFormat::detect(Path::new("TOOL.TAR.GZ")), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::detect(Path::new("Tool.Zip")), ArchiveFormat::Zip);
    }

    #[test]
    fn test_enclosed_path() {
        let root = Path::new("/scratch/x");
        assert_eq!(
            enclosed_path(root, Path::new("bin/tool")),
            Some(PathBuf::from("/scratch/x/bin/tool"))
        );
        assert_eq!(
            enclosed_path(root, Path::new("./a/../tool")),
            Some(PathBuf::from("/scratch/x/tool"))
        );
        assert_eq!(enclosed_path(root, Path::new("../../evil")), None);
        assert_eq!(enclosed_path(root, Path::new("a/../../evil")), None);
        assert_eq!(enclosed_path(root, Path::new("/etc/passwd")), None);
    }

    #[test]
    fn test_extract_tar_gz() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tool.tar.gz");
        write_tar_gz(&archive, |b| {
            append_file(b, "tool-1.0/bin/tool", b"#!/bin/sh\n");
            append_file(b, "tool-1.0/README", b"docs");
        });

        let dest = dir.path().join("out");
        extract(ArchiveFormat::TarGz, &archive, &dest).unwrap();

        assert_eq!(fs::read(dest.join("tool-1.0/bin/tool")).unwrap(), b"#!/bin/sh\n");
        assert_eq!(fs::read(dest.join("tool-1.0/README")).unwrap(), b"docs");
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_tar_gz_keeps_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let archive = dir.path().join("tool.tgz");
        write_tar_gz(&archive, |b| append_file(b, "tool", b"x"));

        let dest = dir.path().join("out");
        extract(ArchiveFormat::TarGz, &archive, &dest).unwrap();

        let mode = fs::metadata(dest.join("tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_extract_tar_gz_rejects_symlink() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tool.tar.gz");
        write_tar_gz(&archive, |b| {
            let mut header = tar::Header::new_gnu();
            header.set_size(0);
            header.set_entry_type(tar::EntryType::Symlink);
            b.append_link(&mut header, "link", "tool").unwrap();
        });

        let err = extract(ArchiveFormat::TarGz, &archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedEntryType { .. }));
    }

    #[test]
    fn test_extract_corrupt_tar_gz() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tool.tar.gz");
        fs::write(&archive, b"definitely not gzip").unwrap();

        let err = extract(ArchiveFormat::TarGz, &archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }

    #[test]
    fn test_extract_zip() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tool.zip");
        write_zip(&archive, &[("tool/bin/tool", b"binary"), ("tool/LICENSE", b"MIT")]);

        let dest = dir.path().join("out");
        extract(ArchiveFormat::Zip, &archive, &dest).unwrap();

        assert_eq!(fs::read(dest.join("tool/bin/tool")).unwrap(), b"binary");
        assert_eq!(fs::read(dest.join("tool/LICENSE")).unwrap(), b"MIT");
    }

    #[test]
    fn test_extract_zip_rejects_traversal() {
        let dir = tempdir().unwrap();
        let sandbox = dir.path().join("a").join("b");
        fs::create_dir_all(&sandbox).unwrap();

        let archive = sandbox.join("evil.zip");
        write_zip(&archive, &[("../../evil", b"pwned")]);

        let dest = sandbox.join("out");
        let err = extract(ArchiveFormat::Zip, &archive, &dest).unwrap_err();

        assert!(matches!(err, ExtractError::PathTraversal { .. }));
        assert!(!dir.path().join("evil").exists());
        assert!(!sandbox.join("evil").exists());
        assert!(!dir.path().join("a").join("evil").exists());
    }

    #[test]
    fn test_passthrough_is_noop() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("kubectl");
        fs::write(&src, b"bin").unwrap();

        let dest = dir.path().join("out");
        extract(ArchiveFormat::Passthrough, &src, &dest).unwrap();
        assert!(!dest.exists());
    }
}
