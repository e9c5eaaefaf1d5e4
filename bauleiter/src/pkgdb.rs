//! Package metadata database
//!
//! A JSON document with binary package records under `bin` and source
//! package records under `src`:
//!
//! ```json
//! {
//!   "bin": {
//!     "python3-foo": {
//!       "src_name": "foo",
//!       "short_description": "Foo for Python",
//!       "long_description": ["Foo does things.", " .", " More text."],
//!       "in_suite": {"bookworm": "1.0-1", "jammy": {"version": "1.0-1~jammy"}}
//!     }
//!   },
//!   "src": {
//!     "foo": {"homepage": "https://example.org/foo", "maintainer": "Jane <jane@example.org>"}
//!   }
//! }
//! ```
//!
//! Fields other than the ones modelled here are kept and available through
//! [`PackageInfo::field`].

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A binary package record
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BinaryPackage {
    /// Name of the source package building this binary
    pub src_name: String,
    /// One-line synopsis
    #[serde(default)]
    pub short_description: Option<String>,
    /// Extended description, one entry per line
    #[serde(default)]
    pub long_description: Option<Vec<String>>,
    /// Versions per suite
    #[serde(default)]
    pub in_suite: BTreeMap<String, Value>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A source package record
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SourcePackage {
    /// All fields
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

/// The whole database
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PackageDb {
    /// Binary packages by name
    #[serde(default)]
    pub bin: BTreeMap<String, BinaryPackage>,
    /// Source packages by name
    #[serde(default)]
    pub src: BTreeMap<String, SourcePackage>,
}

impl PackageDb {
    /// Load the database from a JSON file
    pub fn load(path: &Path) -> Result<Self, PkgDbError> {
        debug!("Using package DB at {}", path.display());
        let content = std::fs::read_to_string(path)
            .map_err(|e| PkgDbError::IoError(path.to_path_buf(), e.to_string()))?;
        serde_json::from_str(&content)
            .map_err(|e| PkgDbError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Binary and source information of one binary package
    pub fn package<'a>(&'a self, name: &'a str) -> Option<PackageInfo<'a>> {
        let binary = self.bin.get(name)?;
        let source = self.src.get(&binary.src_name);
        if source.is_none() {
            warn!(
                "Source package {} of {} not in package DB",
                binary.src_name, name
            );
        }
        Some(PackageInfo {
            name,
            binary,
            source,
        })
    }

    /// All binary packages in name order
    pub fn packages(&self) -> impl Iterator<Item = PackageInfo<'_>> {
        self.bin.keys().filter_map(|name| self.package(name))
    }
}

/// Merged view of a binary package and its source package
///
/// Binary package fields take precedence over source package fields, since
/// the binary record describes the package the page is about.
#[derive(Debug, Clone, Copy)]
pub struct PackageInfo<'a> {
    /// Binary package name
    pub name: &'a str,
    /// Binary package record
    pub binary: &'a BinaryPackage,
    /// Source package record, if known
    pub source: Option<&'a SourcePackage>,
}

impl PackageInfo<'_> {
    /// A text field from the binary record, else the source record
    pub fn field(&self, name: &str) -> Option<String> {
        self.binary
            .extra
            .get(name)
            .or_else(|| self.source.and_then(|s| s.fields.get(name)))
            .and_then(value_text)
    }

    /// One-line synopsis
    pub fn short_description(&self) -> Option<String> {
        self.binary
            .short_description
            .clone()
            .or_else(|| self.field("short_description"))
    }

    /// Extended description lines
    pub fn long_description(&self) -> Option<Vec<String>> {
        if let Some(lines) = &self.binary.long_description {
            return Some(lines.clone());
        }
        let value = self.source?.fields.get("long_description")?;
        match value {
            Value::Array(items) => Some(items.iter().filter_map(value_text).collect()),
            Value::String(text) => Some(text.lines().map(String::from).collect()),
            _ => None,
        }
    }

    /// Version per suite; objects contribute their `version` member
    pub fn suite_versions(&self) -> BTreeMap<&str, String> {
        self.binary
            .in_suite
            .iter()
            .filter_map(|(suite, value)| {
                let version = match value {
                    Value::Object(map) => map.get("version").and_then(value_text),
                    other => value_text(other),
                }?;
                Some((suite.as_str(), version))
            })
            .collect()
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Package database error types
#[derive(Debug, thiserror::Error)]
pub enum PkgDbError {
    /// File system I/O error
    #[error("IO error reading {0}: {1}")]
    IoError(PathBuf, String),

    /// JSON parsing error
    #[error("Parse error in {0}: {1}")]
    ParseError(PathBuf, String),

    /// Neither `--pkgdb` nor `pages.pkgdb` given
    #[error("No package database given and 'pkgdb' is not configured in section 'pages'")]
    NotConfigured,
}
