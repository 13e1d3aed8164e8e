//! The `binman.yaml` data model.
//!
//! A manifest maps binary names to the parameters needed to fetch and install
//! them:
//!
//! ```yaml
//! yq:
//!   url: https://github.com/mikefarah/yq/releases/download/${version}/yq_${system}_${cpu}.tar.gz
//!   version: v4.44.6
//!   originalName: yq_${system}_${cpu}
//! private-release:
//!   url: https://api.github.com/repos/acme/private-release/releases/assets/
//!   urlPostfix:
//!     linux-amd64: 217034480
//!   version: 1.0.1
//!   headers:
//!     - "Authorization: token ${GITHUB_TOKEN}"
//! ```
//!
//! Entries are kept in a `BTreeMap`, so iteration is lexicographic by name.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::placeholder::{self, Placeholders};
use crate::Platform;

/// Errors produced while reading, writing or validating a manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The document is not valid YAML or does not match the schema.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An entry violates one of the manifest invariants.
    #[error("entry '{name}': {reason}")]
    Invalid {
        /// Binary name of the offending entry.
        name: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Acquisition parameters for one named binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Download URL template.
    #[serde(default)]
    pub url: String,

    /// Version token substituted for `${version}`.
    #[serde(default, deserialize_with = "scalar::string")]
    pub version: String,

    /// Name of the payload inside an extracted archive (template).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub original_name: String,

    /// Platform key (`system-cpu`) to URL suffix.
    #[serde(
        default,
        deserialize_with = "scalar::string_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub url_postfix: BTreeMap<String, String>,

    /// Request headers as `"Name: value"` lines.
    #[serde(default, alias = "header", skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,

    /// Sub-directory of the bin directory to install into.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_path: String,

    /// Shell lines (templates) for the generated source script.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source: Vec<String>,
}

impl ManifestEntry {
    /// Create an entry with only a URL template and a version.
    pub fn new(url: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Set the in-archive payload name.
    pub fn with_original_name(mut self, name: impl Into<String>) -> Self {
        self.original_name = name.into();
        self
    }

    /// Add a platform-specific URL suffix.
    pub fn with_url_postfix(mut self, key: impl Into<String>, postfix: impl Into<String>) -> Self {
        self.url_postfix.insert(key.into(), postfix.into());
        self
    }

    /// Append a request header line.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    /// Set the install sub-directory.
    pub fn with_sub_path(mut self, sub_path: impl Into<String>) -> Self {
        self.sub_path = sub_path.into();
        self
    }

    /// Append a source-script line.
    pub fn with_source(mut self, line: impl Into<String>) -> Self {
        self.source.push(line.into());
        self
    }

    /// The in-archive payload name, if one is configured.
    pub fn original_name(&self) -> Option<&str> {
        Some(self.original_name.as_str()).filter(|n| !n.is_empty())
    }

    /// The install sub-directory, if one is configured.
    pub fn sub_path(&self) -> Option<&str> {
        Some(self.sub_path.as_str()).filter(|p| !p.is_empty())
    }

    /// Substitution values for this entry on `platform`.
    pub fn placeholders(&self, platform: &Platform, install_root: &Path) -> Placeholders {
        Placeholders::new(&self.version, platform, install_root)
    }

    /// Resolve the download URL for `platform`.
    ///
    /// The `urlPostfix` entry for the platform key, if any, is appended after
    /// a `/`.
    ///
    /// ```
    /// use std::path::Path;
    /// use binman_schema::{ManifestEntry, Platform};
    ///
    /// let entry = ManifestEntry::new("https://example.com/assets", "1.0")
    ///     .with_url_postfix("linux-amd64", "42");
    /// let url = entry.resolve_url(&Platform::new("linux", "amd64"), Path::new("/opt/bm"));
    /// assert_eq!(url, "https://example.com/assets/42");
    /// ```
    pub fn resolve_url(&self, platform: &Platform, install_root: &Path) -> String {
        let mut url = self.placeholders(platform, install_root).resolve(&self.url);
        if let Some(postfix) = self.url_postfix.get(&platform.key()) {
            if !url.ends_with('/') {
                url.push('/');
            }
            url.push_str(postfix);
        }
        url
    }

    /// Check the entry's invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Invalid`] when the name is not a plain file
    /// name, when `subPath` leaves the bin directory, when the URL is empty,
    /// when a template references `${version}` without a version, or when a
    /// header line is not of the form `Name: value`.
    pub fn validate(&self, name: &str) -> Result<(), ManifestError> {
        let invalid = |reason: String| ManifestError::Invalid {
            name: name.to_string(),
            reason,
        };

        if !is_file_name(name) {
            return Err(invalid("name must be a plain file name".to_string()));
        }
        if !is_relative_descent(&self.sub_path) {
            return Err(invalid(format!(
                "subPath '{}' must stay inside the bin directory",
                self.sub_path
            )));
        }

        if self.url.trim().is_empty() {
            return Err(invalid("url is empty".to_string()));
        }

        let uses_version = self.url.contains(placeholder::VERSION)
            || self.original_name.contains(placeholder::VERSION);
        if uses_version && self.version.trim().is_empty() {
            return Err(invalid(
                "version is empty but a template references ${version}".to_string(),
            ));
        }

        for header in &self.headers {
            if split_header(header).is_none() {
                return Err(invalid(format!(
                    "header '{header}' is not of the form 'Name: value'"
                )));
            }
        }

        Ok(())
    }
}

fn is_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Relative path made of plain components only.
fn is_relative_descent(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && !path.contains('\\')
}

/// Split a `"Name: value"` header line on the first `": "`.
///
/// Returns `None` when the separator is missing or the name is empty.
pub fn split_header(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(": ")?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value))
}

/// Mapping of binary name to [`ManifestEntry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a manifest from YAML.
    ///
    /// A document with nothing but blank lines and comments yields an empty
    /// manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Yaml`] if the document does not match the
    /// schema.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ManifestError> {
        let blank = yaml.lines().all(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with('#')
        });
        if blank {
            return Ok(Self::new());
        }
        let entries: Option<BTreeMap<String, ManifestEntry>> = serde_yaml::from_str(yaml)?;
        Ok(Self {
            entries: entries.unwrap_or_default(),
        })
    }

    /// Serialize the manifest to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Yaml`] if serialization fails.
    pub fn to_yaml_string(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(&self.entries)?)
    }

    /// Validate every entry.
    ///
    /// # Errors
    ///
    /// Returns the first [`ManifestError::Invalid`] found, in name order.
    pub fn validate(&self) -> Result<(), ManifestError> {
        self.entries
            .iter()
            .try_for_each(|(name, entry)| entry.validate(name))
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, name: impl Into<String>, entry: ManifestEntry) {
        self.entries.insert(name.into(), entry);
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.get(name)
    }

    /// Whether `name` is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entries in lexicographic name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ManifestEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lenient deserializers: YAML writes `version: 1.0` or `linux-amd64: 217034480`
/// as numbers, but they are opaque strings to us.
mod scalar {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, de::Error};
    use serde_yaml::Value;

    fn to_string(value: Value) -> Result<String, String> {
        match value {
            Value::Null => Ok(String::new()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) => Ok(s),
            other => Err(format!("expected a scalar, found {other:?}")),
        }
    }

    pub(super) fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        to_string(Value::deserialize(d)?).map_err(D::Error::custom)
    }

    pub(super) fn string_map<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<String, String>, D::Error> {
        let raw: Option<BTreeMap<String, Value>> = Option::deserialize(d)?;
        raw.unwrap_or_default()
            .into_iter()
            .map(|(k, v)| to_string(v).map(|v| (k, v)))
            .collect::<Result<_, _>>()
            .map_err(D::Error::custom)
    }
}
