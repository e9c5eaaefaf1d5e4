//! Per-family build option resolution
//!
//! A build option is resolved from, in order:
//! 1. an explicit value (usually from the command line)
//! 2. the `build` section key `"<family> <option>"`
//! 3. a default supplied by the caller
//!
//! The first present candidate wins; values from different layers are never
//! merged.

use crate::config::{Config, ConfigValue};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration section holding build options
pub const BUILD_SECTION: &str = "build";

/// Where a resolved option came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionOrigin {
    /// Given explicitly by the caller
    Explicit,
    /// Per-family configuration entry
    Family,
    /// Caller-supplied default
    Default,
}

/// A resolved option value with its origin
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOption<T> {
    /// The effective value
    pub value: T,
    /// The layer that provided it
    pub origin: OptionOrigin,
}

/// Conversion from a configuration value to an option type
pub trait FromConfigValue: Sized {
    /// Convert, or `None` if the value cannot represent `Self`
    fn from_config_value(value: &ConfigValue) -> Option<Self>;
}

impl FromConfigValue for String {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        Some(value.as_text())
    }
}

impl FromConfigValue for Vec<String> {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        Some(value.as_list())
    }
}

impl FromConfigValue for bool {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromConfigValue for PathBuf {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Text(s) if !s.trim().is_empty() => Some(PathBuf::from(s.trim())),
            _ => None,
        }
    }
}

/// Resolves build options against a configuration
#[derive(Debug, Clone, Copy)]
pub struct OptionResolver<'a> {
    config: &'a Config,
}

impl<'a> OptionResolver<'a> {
    /// Create a resolver over `config`
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Configuration key of an option for one family
    pub fn family_key(family: &str, name: &str) -> String {
        format!("{family} {name}")
    }

    /// Resolve `name` for `family`
    pub fn resolve<T: FromConfigValue>(
        &self,
        name: &str,
        explicit: Option<T>,
        family: &str,
        default: T,
    ) -> Result<ResolvedOption<T>, OptionError> {
        let resolved = match explicit {
            Some(value) => ResolvedOption {
                value,
                origin: OptionOrigin::Explicit,
            },
            None => match self.family_value(name, family)? {
                Some(value) => ResolvedOption {
                    value,
                    origin: OptionOrigin::Family,
                },
                None => ResolvedOption {
                    value: default,
                    origin: OptionOrigin::Default,
                },
            },
        };

        debug!("Option '{}' for {} from {:?}", name, family, resolved.origin);
        Ok(resolved)
    }

    /// Per-family `build` entry of an option, if configured
    fn family_value<T: FromConfigValue>(
        &self,
        name: &str,
        family: &str,
    ) -> Result<Option<T>, OptionError> {
        let key = Self::family_key(family, name);
        self.config
            .get(BUILD_SECTION, &key)
            .map(|value| {
                T::from_config_value(value).ok_or_else(|| OptionError::InvalidValue {
                    key: key.clone(),
                    value: value.to_string(),
                })
            })
            .transpose()
    }

    /// Family-independent `build` entry of an option, used to form defaults
    pub fn section_default<T: FromConfigValue>(
        &self,
        name: &str,
        fallback: T,
    ) -> Result<T, OptionError> {
        match self.config.get(BUILD_SECTION, name) {
            Some(value) => T::from_config_value(value).ok_or_else(|| OptionError::InvalidValue {
                key: name.to_string(),
                value: value.to_string(),
            }),
            None => Ok(fallback),
        }
    }

    /// Resolve a log directory and create it if it does not exist
    pub fn resolve_logdir(
        &self,
        name: &str,
        explicit: Option<PathBuf>,
        family: &str,
        default: PathBuf,
    ) -> Result<ResolvedOption<PathBuf>, OptionError> {
        let resolved = self.resolve(name, explicit, family, default)?;
        ensure_dir(&resolved.value)?;
        Ok(resolved)
    }
}

fn ensure_dir(dir: &Path) -> Result<(), OptionError> {
    if !dir.exists() {
        info!("Creating log directory {}", dir.display());
        std::fs::create_dir_all(dir)
            .map_err(|e| OptionError::CreateDir(dir.to_path_buf(), e.to_string()))?;
    }
    Ok(())
}

/// Option resolution error types
#[derive(Debug, thiserror::Error)]
pub enum OptionError {
    /// A configured value has the wrong shape for the option
    #[error("Invalid value '{value}' for build option '{key}'")]
    InvalidValue {
        /// Configuration key
        key: String,
        /// Offending value
        value: String,
    },

    /// A directory could not be created
    #[error("Failed to create directory {0}: {1}")]
    CreateDir(PathBuf, String),
}
