//! Backporting of source packages to a target environment
//!
//! The backport itself is done by an external tool. It receives the target
//! family and codename plus the source package descriptor, and prints the path
//! of the backported descriptor as the last line of its output.

use crate::config::Config;
use crate::matrix::Environment;
use crate::options::BUILD_SECTION;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use tracing::{debug, info};

/// Produces an environment-specific variant of a source package
pub trait Backporter {
    /// Backport `descriptor` to `environment`, returning the new descriptor
    fn backport(&self, descriptor: &Path, environment: &Environment)
    -> Result<PathBuf, BackportError>;
}

/// Runs a configured backport command
#[derive(Debug, Clone)]
pub struct CommandBackporter {
    program: String,
    args: Vec<String>,
}

impl CommandBackporter {
    /// Use `command` (program followed by fixed arguments)
    pub fn new(command: Vec<String>) -> Result<Self, BackportError> {
        let mut command = command.into_iter();
        let program = command.next().ok_or(BackportError::NotConfigured)?;
        Ok(Self {
            program,
            args: command.collect(),
        })
    }

    /// The command configured as `build.backport command`, if any
    pub fn from_config(config: &Config) -> Option<Self> {
        let command = config.get(BUILD_SECTION, "backport command")?.as_list();
        Self::new(command).ok()
    }
}

impl Backporter for CommandBackporter {
    fn backport(
        &self,
        descriptor: &Path,
        environment: &Environment,
    ) -> Result<PathBuf, BackportError> {
        info!("Backporting {} to {}", descriptor.display(), environment);

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--family")
            .arg(&environment.family)
            .arg("--codename")
            .arg(&environment.codename)
            .arg(descriptor)
            .output()
            .map_err(|source| BackportError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BackportError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let backported = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .ok_or_else(|| BackportError::NoOutput(self.program.clone()))?;

        debug!("Backported descriptor: {}", backported);
        Ok(PathBuf::from(backported))
    }
}

/// Used when no backport command is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackporter;

impl Backporter for NoBackporter {
    fn backport(&self, _: &Path, _: &Environment) -> Result<PathBuf, BackportError> {
        Err(BackportError::NotConfigured)
    }
}

/// Backport error types
#[derive(Debug, thiserror::Error)]
pub enum BackportError {
    /// Backporting was requested but no command is configured
    #[error("Backport requested but 'backport command' is not configured in section 'build'")]
    NotConfigured,

    /// The backport command could not be started
    #[error("Failed to run backport command {program}: {source}")]
    Spawn {
        /// Program that was attempted
        program: String,
        /// Underlying error
        source: io::Error,
    },

    /// The backport command failed
    #[error("Backport command {program} failed ({status}): {stderr}")]
    Failed {
        /// Program that failed
        program: String,
        /// Its exit status
        status: ExitStatus,
        /// Its error output
        stderr: String,
    },

    /// The backport command did not name a descriptor
    #[error("Backport command {0} printed no descriptor path")]
    NoOutput(String),
}
