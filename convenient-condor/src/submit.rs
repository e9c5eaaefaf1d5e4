//! Delivery of submit descriptions
//!
//! A submission is all-or-nothing: the scheduler either accepts the whole
//! document or nothing is assumed queued. There is no retry.

use crate::description::SubmitDescription;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while submitting
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The submit program could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        /// Program that was attempted
        program: String,
        /// Underlying error
        source: io::Error,
    },

    /// Talking to the submit program or writing the submit file failed
    #[error("IO error during submission: {0}")]
    Io(#[from] io::Error),

    /// The scheduler refused the submission
    #[error("could not submit build ({status}); submit description follows\n---\n{description}---")]
    Rejected {
        /// Exit status of the submit program
        status: ExitStatus,
        /// The complete rejected document
        description: String,
    },
}

/// Result of an accepted submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Standard output of the submit program
    pub output: String,
    /// Cluster id assigned by the scheduler, if reported
    pub cluster: Option<u64>,
}

/// Something that accepts a finished submit description
pub trait Submitter {
    /// Hand over the description; fails if it was not accepted as a whole
    fn submit(&self, description: &SubmitDescription) -> Result<SubmitReceipt, SubmitError>;

    /// Name used in log messages
    fn name(&self) -> &str;
}

/// Submission through `condor_submit`, reading the description from stdin
#[derive(Debug, Clone)]
pub struct CondorSubmit {
    program: String,
    args: Vec<String>,
}

impl Default for CondorSubmit {
    fn default() -> Self {
        Self::new()
    }
}

impl CondorSubmit {
    /// Use `condor_submit` from `PATH`
    pub fn new() -> Self {
        Self::with_program("condor_submit")
    }

    /// Use a different submit program
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add an argument placed before the description is piped in
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl Submitter for CondorSubmit {
    fn submit(&self, description: &SubmitDescription) -> Result<SubmitReceipt, SubmitError> {
        info!(
            "Submitting {} job(s) via {}",
            description.job_count(),
            self.program
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| SubmitError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(description.as_str().as_bytes()) {
                // The exit status tells what happened
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!("{} closed its input early", self.program);
                }
                other => other?,
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(SubmitError::Rejected {
                status: output.status,
                description: description.to_string(),
            });
        }

        let output = String::from_utf8_lossy(&output.stdout).into_owned();
        let cluster = parse_cluster(&output);
        if let Some(cluster) = cluster {
            info!("Jobs queued in cluster {}", cluster);
        }

        Ok(SubmitReceipt { output, cluster })
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Store the description in a file instead of submitting it
#[derive(Debug, Clone)]
pub struct SubmitFile {
    path: PathBuf,
}

impl SubmitFile {
    /// Write to `path`, replacing any existing file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Submitter for SubmitFile {
    fn submit(&self, description: &SubmitDescription) -> Result<SubmitReceipt, SubmitError> {
        std::fs::write(&self.path, description.as_str())?;
        info!(
            "Stored submit description with {} job(s) in {}",
            description.job_count(),
            self.path.display()
        );
        Ok(SubmitReceipt::default())
    }

    fn name(&self) -> &str {
        "submit file"
    }
}

/// Extract the cluster id from `condor_submit` output
///
/// Looks for the summary line `N job(s) submitted to cluster C.`
pub fn parse_cluster(output: &str) -> Option<u64> {
    output.lines().find_map(|line| {
        let (_, rest) = line.split_once("submitted to cluster")?;
        rest.trim().trim_end_matches('.').parse().ok()
    })
}
