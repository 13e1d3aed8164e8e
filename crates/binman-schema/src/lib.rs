//! Shared types for binman.
//!
//! - [`Manifest`] / [`ManifestEntry`]: the `binman.yaml` data model.
//! - [`Platform`]: host identifiers used for `${system}` and `${cpu}`.
//! - [`placeholder`]: template substitution.

pub mod manifest;
pub mod placeholder;
pub mod platform;

// Re-exports
pub use manifest::{Manifest, ManifestEntry, ManifestError};
pub use placeholder::Placeholders;
pub use platform::Platform;

/// Default manifest file name inside the install root.
pub const MANIFEST_FILE: &str = "binman.yaml";
