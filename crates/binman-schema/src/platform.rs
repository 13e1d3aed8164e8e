//! Host platform identifiers.
//!
//! Manifests are shared across a team, so `${system}` and `${cpu}` must expand
//! to the names release pages actually use (`linux`, `darwin`, `amd64`,
//! `arm64`, ...) rather than Rust's target names (`macos`, `x86_64`,
//! `aarch64`).
//!
//! # Example
//!
//! ```
//! use binman_schema::Platform;
//!
//! let platform = Platform::new("Linux", "AMD64");
//! assert_eq!(platform.key(), "linux-amd64");
//! ```

use std::fmt;

/// Operating system and CPU identifiers used for placeholder substitution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    /// Operating system identifier (`${system}`).
    pub system: String,
    /// CPU architecture identifier (`${cpu}`).
    pub cpu: String,
}

impl Platform {
    /// Create a platform from explicit identifiers, used verbatim.
    pub fn new(system: impl Into<String>, cpu: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            cpu: cpu.into(),
        }
    }

    /// Detect the platform of the running process.
    pub fn current() -> Self {
        Self::new(
            system_name(std::env::consts::OS),
            cpu_name(std::env::consts::ARCH),
        )
    }

    /// Key used to look up `urlPostfix` entries: `"<system>-<cpu>"`, lowercase.
    pub fn key(&self) -> String {
        format!(
            "{}-{}",
            self.system.to_lowercase(),
            self.cpu.to_lowercase()
        )
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.system, self.cpu)
    }
}

/// Map a Rust `std::env::consts::OS` value to its release-asset name.
pub fn system_name(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

/// Map a Rust `std::env::consts::ARCH` value to its release-asset name.
pub fn cpu_name(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "loongarch64" => "loong64",
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
        "powerpc64" => "ppc64",
        "mips64" if cfg!(target_endian = "little") => "mips64le",
        "mips" if cfg!(target_endian = "little") => "mipsle",
        other => other,
    }
}
