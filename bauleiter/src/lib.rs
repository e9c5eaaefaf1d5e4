//! Bauleiter - build matrix orchestration for Debian source packages
//!
//! Bauleiter fans the build of one source package out over a matrix of
//! target environments (distribution family and codename) and architectures,
//! and submits one HTCondor job per combination. It combines:
//! - **convenient-dsc**: source package descriptor (`.dsc`) parsing
//! - **convenient-condor**: submit description text and `condor_submit`
//!
//! ## Architecture
//!
//! 1. **Configuration**: layered YAML files ([`config`])
//! 2. **Option resolution**: explicit value, per-family entry, default ([`options`])
//! 3. **Argument rewriting**: the original invocation becomes the remote
//!    `build-pkg` invocation ([`argv`])
//! 4. **Matrix expansion**: one job per environment and architecture
//!    ([`matrix`], with [`chroot`] and [`backport`] as collaborators)
//! 5. **Submission**: one submit description for all jobs ([`descriptor`])
//!
//! Package pages for documentation are generated by [`pages`] from the
//! package database in [`pkgdb`].

pub mod argv;
pub mod backport;
pub mod chroot;
pub mod commands;
pub mod config;
pub mod descriptor;
pub mod matrix;
pub mod options;
pub mod pages;
pub mod pkgdb;

pub use argv::{ArgvError, ArgvRewriter, RewrittenArgs};
pub use backport::{BackportError, Backporter, CommandBackporter, NoBackporter};
pub use chroot::{BasedirLayout, ChrootBaseResolver, ChrootError};
pub use config::{Config, ConfigError, ConfigValue};
pub use descriptor::build_description;
pub use matrix::{BuildRequest, Environment, JobSpec, MatrixError, MatrixExpander};
pub use options::{OptionError, OptionOrigin, OptionResolver, ResolvedOption};
pub use pages::{DescriptionFormatter, PageError, PageWriter};
pub use pkgdb::{PackageDb, PackageInfo, PkgDbError};
