//! Layered YAML configuration
//!
//! Configuration is organised in sections of key/value pairs:
//!
//! ```yaml
//! include:
//!   - site.yml
//!
//! build:
//!   environments: debian-bookworm ubuntu-jammy
//!   architectures: amd64
//!   debian architectures: [amd64, i386, arm64]
//!   debian source include: yes
//!
//! release codenames:
//!   bookworm: Debian 12
//! ```
//!
//! Included files are merged first, the including file last, so the including
//! file wins per key. Several files passed to [`Config::load`] are merged the
//! same way in order.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A single configuration value
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// YAML boolean
    Bool(bool),
    /// YAML integer
    Integer(i64),
    /// YAML float; rejected on load since the text form is lost
    Float(f64),
    /// Any scalar text
    Text(String),
    /// YAML sequence
    List(Vec<String>),
}

impl ConfigValue {
    /// Value as text; lists are joined with blanks
    pub fn as_text(&self) -> String {
        match self {
            ConfigValue::Bool(b) => b.to_string(),
            ConfigValue::Integer(i) => i.to_string(),
            ConfigValue::Float(f) => f.to_string(),
            ConfigValue::Text(s) => s.clone(),
            ConfigValue::List(items) => items.join(" "),
        }
    }

    /// Value as list; text is split on whitespace
    pub fn as_list(&self) -> Vec<String> {
        match self {
            ConfigValue::List(items) => items.clone(),
            ConfigValue::Text(s) => s.split_whitespace().map(String::from).collect(),
            other => vec![other.as_text()],
        }
    }

    /// Value as boolean, accepting the usual yes/no spellings
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::Integer(0) => Some(false),
            ConfigValue::Integer(1) => Some(true),
            ConfigValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" | "on" | "1" => Some(true),
                "no" | "false" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Text(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Text(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(value: Vec<String>) -> Self {
        ConfigValue::List(value)
    }
}

type Section = BTreeMap<String, ConfigValue>;

/// On-disk layout of one configuration file
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    /// Files merged before this one, relative to this file
    #[serde(default)]
    include: Vec<String>,
    /// Everything else is a section
    #[serde(flatten)]
    sections: BTreeMap<String, Section>,
}

impl ConfigFile {
    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: Self = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;

        // `22.10` would read back as `22.1`
        for (name, section) in &file.sections {
            for (key, value) in section {
                if let ConfigValue::Float(number) = value {
                    return Err(ConfigError::UnquotedNumber {
                        path: path.to_path_buf(),
                        key: format!("{name}.{key}"),
                        value: number.to_string(),
                    });
                }
            }
        }
        Ok(file)
    }
}

/// Merged configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    sections: BTreeMap<String, Section>,
    /// Files merged so far, in merge order
    sources: Vec<PathBuf>,
}

impl Config {
    /// Empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and merge configuration files in order
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut config = Self::new();
        for path in paths {
            let mut chain = Vec::new();
            config.merge_file(path.as_ref(), &mut chain)?;
        }
        info!("Loaded configuration from {} file(s)", config.sources.len());
        Ok(config)
    }

    /// Parse configuration from YAML text; includes resolve against the
    /// current directory
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let origin = Path::new("<inline>");
        let file = ConfigFile::parse(origin, content)?;
        let mut config = Self::new();
        let mut chain = Vec::new();
        for include in &file.include {
            config.merge_file(Path::new(include), &mut chain)?;
        }
        config.merge_sections(file.sections);
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path, chain: &mut Vec<PathBuf>) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if chain.contains(&canonical) {
            let cycle = chain
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ConfigError::CircularInclude(cycle));
        }

        debug!("Merging configuration file {}", path.display());
        let file = ConfigFile::parse(path, &content)?;

        chain.push(canonical);
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        for include in &file.include {
            self.merge_file(&parent.join(include), chain)?;
        }
        chain.pop();

        self.merge_sections(file.sections);
        self.sources.push(path.to_path_buf());
        Ok(())
    }

    fn merge_sections(&mut self, overlay: BTreeMap<String, Section>) {
        for (name, section) in overlay {
            self.sections.entry(name).or_default().extend(section);
        }
    }

    /// Look up a value
    pub fn get(&self, section: &str, key: &str) -> Option<&ConfigValue> {
        self.sections.get(section).and_then(|s| s.get(key))
    }

    /// Set a value, replacing any previous one
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<ConfigValue>) {
        let _ = self
            .sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Files that contributed to this configuration
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File system I/O error
    #[error("IO error reading {0}: {1}")]
    IoError(PathBuf, String),

    /// YAML parsing error
    #[error("Parse error in {0}: {1}")]
    ParseError(PathBuf, String),

    /// Circular include dependency detected
    #[error("Circular include detected: {0}")]
    CircularInclude(String),

    /// A decimal number that has to be quoted to keep its text
    #[error("Value {value} of '{key}' in {} must be quoted", path.display())]
    UnquotedNumber {
        /// File holding the value
        path: PathBuf,
        /// `section.key`
        key: String,
        /// Value as parsed
        value: String,
    },
}
