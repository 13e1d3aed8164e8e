use std::io;
use std::path::{Path, PathBuf};

use binman_schema::MANIFEST_FILE;

/// Environment variable overriding the install root.
pub const ROOT_ENV: &str = "BMAN_PATH";

/// Generated source script name inside the install root.
pub const SOURCE_FILE: &str = ".source";

/// The directory every binary, the manifest and the source script live under.
///
/// ```text
/// <root>/
/// ├── binman.yaml
/// ├── .source
/// ├── bin/        # bin/[subPath/]<name>
/// └── tmp/        # per-entry scratch, same volume as bin/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRoot {
    path: PathBuf,
}

impl InstallRoot {
    /// Use `path` as the install root.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Derive the root from the location of an executable.
    ///
    /// An executable living in a `bin/` directory belongs to the root above
    /// it (the layout `bootstrap` creates); otherwise its own directory is the
    /// root.
    pub fn from_executable(exe: &Path) -> Self {
        let dir = exe.parent().unwrap_or_else(|| Path::new("."));
        match dir.parent() {
            Some(parent) if dir.file_name().is_some_and(|n| n == "bin") => Self::new(parent),
            _ => Self::new(dir),
        }
    }

    /// Resolve the root from an explicit override, falling back to the running
    /// executable's location.
    ///
    /// # Errors
    ///
    /// Returns an error if no override is given and the path of the running
    /// executable cannot be determined.
    pub fn discover(override_path: Option<&Path>) -> io::Result<Self> {
        if let Some(path) = override_path.filter(|p| !p.as_os_str().is_empty()) {
            return Ok(Self::new(path));
        }
        let exe = std::env::current_exe()?;
        Ok(Self::from_executable(&exe))
    }

    /// The root directory itself.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Installed binaries: `<root>/bin`
    pub fn bin_dir(&self) -> PathBuf {
        self.path.join("bin")
    }

    /// Scratch space: `<root>/tmp`
    pub fn tmp_dir(&self) -> PathBuf {
        self.path.join("tmp")
    }

    /// Manifest path: `<root>/binman.yaml`
    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    /// Generated source script: `<root>/.source`
    pub fn source_script_path(&self) -> PathBuf {
        self.path.join(SOURCE_FILE)
    }

    /// Final install location of a binary: `<root>/bin/[sub_path/]<name>`
    ///
    /// Both parts are joined as given; entries are checked with
    /// [`ManifestEntry::validate`](binman_schema::ManifestEntry::validate)
    /// before they get here.
    pub fn binary_path(&self, name: &str, sub_path: Option<&str>) -> PathBuf {
        let mut path = self.bin_dir();
        if let Some(sub) = sub_path {
            path.push(sub);
        }
        path.join(name)
    }
}

/// Extract the filename from a URL, ignoring any query string or fragment.
///
/// ```
/// use binman_core::paths::filename_from_url;
///
/// assert_eq!(filename_from_url("https://example.com/v1/tool.tar.gz?raw=1"), "tool.tar.gz");
/// assert_eq!(filename_from_url("https://example.com/assets/"), "");
/// ```
pub fn filename_from_url(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].split('/').next_back().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_from_executable_in_bin() {
        let root = InstallRoot::from_executable(Path::new("/home/me/.binman/bin/binman"));
        assert_eq!(root.path(), Path::new("/home/me/.binman"));
    }

    #[test]
    fn test_root_from_executable_elsewhere() {
        let root = InstallRoot::from_executable(Path::new("/opt/tools/binman"));
        assert_eq!(root.path(), Path::new("/opt/tools"));
    }

    #[test]
    fn test_override_wins() {
        let root = InstallRoot::discover(Some(Path::new("/srv/bm"))).unwrap();
        assert_eq!(root.path(), Path::new("/srv/bm"));
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let root = InstallRoot::discover(Some(Path::new(""))).unwrap();
        assert_ne!(root.path(), Path::new(""));
    }

    #[test]
    fn test_layout() {
        let root = InstallRoot::new("/srv/bm");
        assert_eq!(root.manifest_path(), Path::new("/srv/bm/binman.yaml"));
        assert_eq!(root.source_script_path(), Path::new("/srv/bm/.source"));
        assert_eq!(root.binary_path("kubectl", None), Path::new("/srv/bm/bin/kubectl"));
        assert_eq!(
            root.binary_path("helm", Some("k8s")),
            Path::new("/srv/bm/bin/k8s/helm")
        );
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(filename_from_url("https://x.io/a/b/kubectl"), "kubectl");
        assert_eq!(filename_from_url("https://x.io/a/tool.zip#frag"), "tool.zip");
        assert_eq!(filename_from_url(""), "");
    }
}
