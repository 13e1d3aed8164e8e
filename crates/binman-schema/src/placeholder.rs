//! Template placeholder substitution.
//!
//! Templates may reference `${version}`, `${system}`, `${cpu}` and
//! `${install-root}` (also spelled `${binman-path}`). Substitution is
//! verbatim and non-recursive; anything else that looks like a placeholder is
//! left untouched.

use std::path::Path;

use crate::Platform;

/// `${version}` token.
pub const VERSION: &str = "${version}";
/// `${system}` token.
pub const SYSTEM: &str = "${system}";
/// `${cpu}` token.
pub const CPU: &str = "${cpu}";
/// `${install-root}` token.
pub const INSTALL_ROOT: &str = "${install-root}";
/// Older spelling of [`INSTALL_ROOT`].
pub const BINMAN_PATH: &str = "${binman-path}";

/// Replace every known placeholder in `template`.
///
/// ```
/// use binman_schema::placeholder::resolve;
///
/// let url = resolve("tool-${version}-${system}-${cpu}", "v1", "linux", "amd64", "/opt/bm");
/// assert_eq!(url, "tool-v1-linux-amd64");
/// ```
pub fn resolve(template: &str, version: &str, system: &str, cpu: &str, install_root: &str) -> String {
    template
        .replace(VERSION, version)
        .replace(SYSTEM, system)
        .replace(CPU, cpu)
        .replace(INSTALL_ROOT, install_root)
        .replace(BINMAN_PATH, install_root)
}

/// The substitution values for one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    /// Value for `${version}`.
    pub version: String,
    /// Value for `${system}`.
    pub system: String,
    /// Value for `${cpu}`.
    pub cpu: String,
    /// Value for `${install-root}`.
    pub install_root: String,
}

impl Placeholders {
    /// Build the values for an entry's `version` on the given platform.
    pub fn new(version: &str, platform: &Platform, install_root: &Path) -> Self {
        Self {
            version: version.to_string(),
            system: platform.system.clone(),
            cpu: platform.cpu.clone(),
            install_root: install_root.to_string_lossy().into_owned(),
        }
    }

    /// Resolve a template with these values.
    pub fn resolve(&self, template: &str) -> String {
        resolve(
            template,
            &self.version,
            &self.system,
            &self.cpu,
            &self.install_root,
        )
    }
}
