//! Debian source control file parsing
//!
//! A `.dsc` file describes one Debian source package: its name, version and
//! the artifacts (orig tarball, debian tarball, ...) that make up the source.
//! This crate parses the deb822 paragraph of such a file, including
//! clear-signed files, into a [`DscFile`].

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PGP_SIGNED_HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const PGP_SIGNATURE_HEADER: &str = "-----BEGIN PGP SIGNATURE-----";

/// One artifact referenced by a `.dsc` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DscFileEntry {
    /// Checksum as listed (MD5 for `Files`, SHA256 for `Checksums-Sha256`)
    pub checksum: String,
    /// Size in bytes
    pub size: u64,
    /// File name, relative to the directory of the `.dsc` file
    pub name: String,
}

/// Parsed Debian source control file
#[derive(Debug, Clone)]
pub struct DscFile {
    /// Location of the `.dsc` file
    path: PathBuf,
    /// Source package name (`Source`)
    source: String,
    /// Package version (`Version`)
    version: String,
    /// Referenced artifacts (`Files`), in listed order
    files: Vec<DscFileEntry>,
    /// All fields in file order, continuation lines joined with `\n`
    fields: Vec<(String, String)>,
}

impl DscFile {
    /// Load and parse a `.dsc` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DscError> {
        let path = path.as_ref();
        info!("Loading source package descriptor {}", path.display());

        let content = std::fs::read_to_string(path)
            .map_err(|e| DscError::IoError(path.to_path_buf(), e.to_string()))?;

        Self::parse(path, &content)
    }

    /// Parse `.dsc` content that was read from `path`
    pub fn parse(path: impl AsRef<Path>, content: &str) -> Result<Self, DscError> {
        let path = path.as_ref().to_path_buf();
        let body = strip_signature(content);
        let fields = parse_paragraph(&path, &body)?;

        let lookup = |name: &str| {
            fields
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        };

        let source = lookup("Source")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DscError::MissingField(path.clone(), "Source"))?
            .to_string();
        let version = lookup("Version")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DscError::MissingField(path.clone(), "Version"))?
            .to_string();
        let files = lookup("Files")
            .ok_or_else(|| DscError::MissingField(path.clone(), "Files"))
            .and_then(|value| parse_file_entries(&path, "Files", value))?;
        if let Some(value) = lookup("Checksums-Sha256") {
            let checksums = parse_file_entries(&path, "Checksums-Sha256", value)?;
            for entry in &files {
                if !checksums.iter().any(|c| c.name == entry.name) {
                    warn!(
                        "{} lists {} without a SHA256 checksum",
                        path.display(),
                        entry.name
                    );
                }
            }
        }

        debug!(
            "Parsed {} {} with {} referenced files",
            source,
            version,
            files.len()
        );

        Ok(Self {
            path,
            source,
            version,
            files,
            fields,
        })
    }

    /// Path of the `.dsc` file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the `.dsc` file and its artifacts
    ///
    /// Empty for a bare file name, so that joined artifact paths stay relative
    /// in the same way the descriptor path is.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// File name of the `.dsc` file without its directory
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    /// Source package name
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Package version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Artifacts listed in the `Files` field
    pub fn files(&self) -> &[DscFileEntry] {
        &self.files
    }

    /// Paths of all artifacts listed in `Files`, next to the `.dsc` file
    pub fn file_paths(&self) -> Vec<PathBuf> {
        let dir = self.dir();
        self.files.iter().map(|entry| dir.join(&entry.name)).collect()
    }

    /// Raw value of a field, looked up case-insensitively
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Remove an OpenPGP clear-signature armor, if any
fn strip_signature(content: &str) -> String {
    let mut lines = content.lines().skip_while(|l| l.trim().is_empty()).peekable();

    if lines.peek().map(|l| l.trim_end()) != Some(PGP_SIGNED_HEADER) {
        return content.to_string();
    }

    // Armor headers ("Hash: SHA512") end at the first blank line
    let body = lines.skip(1).skip_while(|l| !l.trim().is_empty());

    let mut out = String::new();
    for line in body {
        if line.trim_end() == PGP_SIGNATURE_HEADER {
            break;
        }
        // Dash-escaped lines
        let line = line.strip_prefix("- ").unwrap_or(line);
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Parse the first deb822 paragraph into ordered fields
fn parse_paragraph(path: &Path, body: &str) -> Result<Vec<(String, String)>, DscError> {
    let mut fields: Vec<(String, String)> = Vec::new();

    for (lineno, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            if fields.is_empty() {
                continue;
            }
            break;
        }
        if line.starts_with('#') {
            continue;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            let Some((_, value)) = fields.last_mut() else {
                return Err(DscError::ParseError(
                    path.to_path_buf(),
                    format!("line {}: continuation line before any field", lineno + 1),
                ));
            };
            let continuation = line.trim();
            value.push('\n');
            if continuation != "." {
                value.push_str(continuation);
            }
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            return Err(DscError::ParseError(
                path.to_path_buf(),
                format!("line {}: expected 'Field: value'", lineno + 1),
            ));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(DscError::ParseError(
                path.to_path_buf(),
                format!("line {}: empty field name", lineno + 1),
            ));
        }
        fields.push((name.to_string(), value.trim().to_string()));
    }

    if fields.is_empty() {
        return Err(DscError::ParseError(
            path.to_path_buf(),
            "no fields found".to_string(),
        ));
    }

    Ok(fields)
}

/// Parse a `checksum size name` list field
fn parse_file_entries(
    path: &Path,
    field: &str,
    value: &str,
) -> Result<Vec<DscFileEntry>, DscError> {
    value
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let [checksum, size, name] = parts.as_slice() else {
                return Err(DscError::ParseError(
                    path.to_path_buf(),
                    format!("{field}: malformed entry '{line}'"),
                ));
            };
            let size = size.parse().map_err(|_| {
                DscError::ParseError(
                    path.to_path_buf(),
                    format!("{field}: invalid size in '{line}'"),
                )
            })?;
            Ok(DscFileEntry {
                checksum: checksum.to_string(),
                size,
                name: name.to_string(),
            })
        })
        .collect()
}

/// Descriptor error types
#[derive(Debug, thiserror::Error)]
pub enum DscError {
    /// File system I/O error
    #[error("IO error reading {0}: {1}")]
    IoError(PathBuf, String),

    /// Malformed deb822 content
    #[error("Parse error in {0}: {1}")]
    ParseError(PathBuf, String),

    /// Required field absent
    #[error("Missing field '{1}' in {0}")]
    MissingField(PathBuf, &'static str),
}
