//! Bauleiter command-line interface
//!
//! Bauleiter supports two commands:
//! - `build-pkg-condor`: Submit a source package build matrix to an HTCondor pool
//! - `genpkgs`: Generate reStructuredText package pages from a package database

use crate::argv::ArgvError;
use crate::config::Config;
use crate::matrix::{BuildRequest, Environment, MatrixError, default_environments};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod build_pkg_condor;
pub mod genpkgs;

/// Bauleiter - build matrix orchestration for Debian source packages
#[derive(Parser, Debug)]
#[command(name = "bauleiter")]
#[command(about = "Build matrix orchestration for Debian source packages")]
#[command(version)]
pub struct Cli {
    /// Configuration file, may be given several times (later files win)
    #[arg(short, long, global = true, env = "BAULEITER_CONFIG")]
    pub config: Vec<PathBuf>,

    /// Debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Bauleiter commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a source package for all environments on an HTCondor pool
    BuildPkgCondor(BuildPkgCondorArgs),

    /// Generate package pages from the package database
    Genpkgs {
        /// Package database (JSON); defaults to `pages.pkgdb` from the configuration
        #[arg(long)]
        pkgdb: Option<PathBuf>,

        /// Target directory for the generated pages
        #[arg(short = 'D', long, default_value = ".")]
        dest_dir: PathBuf,
    },
}

/// `yes` or `no`
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum YesNo {
    /// Enabled
    Yes,
    /// Disabled
    No,
}

impl From<YesNo> for bool {
    fn from(value: YesNo) -> Self {
        value == YesNo::Yes
    }
}

/// Arguments of `build-pkg-condor`
#[derive(Args, Debug)]
pub struct BuildPkgCondorArgs {
    /// Target environment, may be given several times
    #[arg(
        long = "env",
        num_args = 2,
        value_names = ["FAMILY", "CODENAME"],
        action = ArgAction::Append
    )]
    pub env: Vec<String>,

    /// Architectures to build for, overriding the configuration
    #[arg(long, num_args = 1..)]
    pub arch: Vec<String>,

    /// Backport the package to each environment before building
    #[arg(long)]
    pub backport: bool,

    /// Whether to build the source package
    #[arg(long, value_enum)]
    pub source_include: Option<YesNo>,

    /// Directory holding the chroot base archives
    #[arg(long)]
    pub chroot_basedir: Option<PathBuf>,

    /// Build directory on the local machine
    #[arg(long)]
    pub build_basedir: Option<PathBuf>,

    /// Where to store build results
    #[arg(long)]
    pub result_dir: Option<PathBuf>,

    #[command(flatten)]
    pub condor: CondorArgs,

    /// Source package descriptor (.dsc)
    pub dsc: Option<PathBuf>,
}

/// Scheduler options of `build-pkg-condor`
#[derive(Args, Debug)]
pub struct CondorArgs {
    /// Memory request per job in megabytes
    #[arg(long = "condor-request-memory", default_value_t = 1000)]
    pub request_memory: u32,

    /// Submit jobs with lowest priority
    #[arg(long = "condor-nice-user", value_enum, default_value = "yes")]
    pub nice_user: YesNo,

    /// Directory for job logs
    #[arg(long = "condor-logdir")]
    pub logdir: Option<PathBuf>,

    /// Write the submit description to this file instead of submitting it
    #[arg(long = "condor-submit-file")]
    pub submit_file: Option<PathBuf>,
}

impl BuildPkgCondorArgs {
    /// The descriptor, taken back from a greedy `--arch` list if needed
    fn descriptor(&mut self) -> Result<PathBuf, ArgvError> {
        if let Some(dsc) = self.dsc.take() {
            return Ok(dsc);
        }
        // `--arch a b foo.dsc` swallows the descriptor
        if self.arch.len() > 1 {
            if let Some(dsc) = self.arch.pop() {
                return Ok(PathBuf::from(dsc));
            }
        }
        Err(ArgvError::MissingDescriptor)
    }

    /// Turn the parsed arguments into a build request
    ///
    /// Without `--env` the environments from `build.environments` are used.
    pub fn request(mut self, config: &Config) -> Result<BuildRequest, MatrixError> {
        let descriptor = self.descriptor()?;

        let environments = if self.env.is_empty() {
            default_environments(config)?
        } else {
            self.env
                .chunks(2)
                .map(|pair| match pair {
                    [family, codename] => Ok(Environment::new(family.as_str(), codename.as_str())),
                    _ => Err(MatrixError::InvalidEnvironment(pair.join(" "))),
                })
                .collect::<Result<_, _>>()?
        };

        Ok(BuildRequest {
            descriptor,
            environments,
            arch: (!self.arch.is_empty()).then_some(self.arch),
            backport: self.backport,
            source_include: self.source_include.map(bool::from),
            chroot_basedir: self.chroot_basedir,
            build_basedir: self.build_basedir,
            result_dir: self.result_dir,
            condor_logdir: self.condor.logdir,
        })
    }
}
