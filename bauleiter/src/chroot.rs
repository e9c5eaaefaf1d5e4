//! Chroot base archive lookup

use crate::matrix::{BuildRequest, Environment};
use crate::options::{OptionError, OptionResolver};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Finds the chroot base a job builds in
pub trait ChrootBaseResolver {
    /// Base path of the chroot for one environment and architecture, without
    /// the archive extension
    fn resolve(
        &self,
        environment: &Environment,
        arch: &str,
        request: &BuildRequest,
    ) -> Result<PathBuf, ChrootError>;
}

/// Archive transferred for a chroot base
pub fn archive_path(base: &Path) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".tar.gz");
    PathBuf::from(name)
}

/// Chroots stored as `<chroot basedir>/<family>-<codename>-<arch>.tar.gz`
#[derive(Debug, Clone, Copy)]
pub struct BasedirLayout<'a> {
    options: OptionResolver<'a>,
}

impl<'a> BasedirLayout<'a> {
    /// Resolve the base directory per family through `options`
    pub fn new(options: OptionResolver<'a>) -> Self {
        Self { options }
    }
}

impl ChrootBaseResolver for BasedirLayout<'_> {
    fn resolve(
        &self,
        environment: &Environment,
        arch: &str,
        request: &BuildRequest,
    ) -> Result<PathBuf, ChrootError> {
        if arch.is_empty() || arch.contains('/') {
            return Err(ChrootError::InvalidArchitecture(arch.to_string()));
        }

        let default = self.options.section_default("chroot basedir", PathBuf::from("."))?;
        let basedir = self.options.resolve(
            "chroot basedir",
            request.chroot_basedir.clone(),
            &environment.family,
            default,
        )?;

        let base = basedir
            .value
            .join(format!("{}-{}", environment, arch));
        let archive = archive_path(&base);
        if !archive.exists() {
            warn!(
                "Chroot archive {} not found on the submit machine",
                archive.display()
            );
        }
        Ok(base)
    }
}

/// Chroot lookup error types
#[derive(Debug, thiserror::Error)]
pub enum ChrootError {
    /// Architecture name not usable in a file name
    #[error("Invalid architecture '{0}'")]
    InvalidArchitecture(String),

    /// Base directory option could not be resolved
    #[error(transparent)]
    Option(#[from] OptionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::options::BUILD_SECTION;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn bullseye() -> Environment {
        Environment::new("debian", "bullseye")
    }

    #[test]
    fn test_archive_path() {
        assert_eq!(
            archive_path(Path::new("/srv/chroots/debian-bullseye-amd64")),
            PathBuf::from("/srv/chroots/debian-bullseye-amd64.tar.gz")
        );
    }

    #[test]
    fn test_default_basedir() {
        let config = Config::new();
        let layout = BasedirLayout::new(OptionResolver::new(&config));

        let base = layout
            .resolve(&bullseye(), "amd64", &BuildRequest::new("foo.dsc"))
            .unwrap();

        assert_eq!(base, PathBuf::from("./debian-bullseye-amd64"));
    }

    #[test]
    fn test_family_basedir_and_explicit_override() {
        let mut config = Config::new();
        config.set(BUILD_SECTION, "debian chroot basedir", "/srv/chroots/debian");
        let layout = BasedirLayout::new(OptionResolver::new(&config));

        let base = layout
            .resolve(&bullseye(), "i386", &BuildRequest::new("foo.dsc"))
            .unwrap();
        assert_eq!(base, PathBuf::from("/srv/chroots/debian/debian-bullseye-i386"));

        let request = BuildRequest {
            chroot_basedir: Some(PathBuf::from("/tmp/chroots")),
            ..BuildRequest::new("foo.dsc")
        };
        let base = layout.resolve(&bullseye(), "i386", &request).unwrap();
        assert_eq!(base, PathBuf::from("/tmp/chroots/debian-bullseye-i386"));
    }

    #[test]
    #[traced_test]
    fn test_missing_archive_warns() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("debian-bullseye-amd64.tar.gz"), b"").unwrap();
        let mut config = Config::new();
        config.set(
            BUILD_SECTION,
            "chroot basedir",
            temp.path().to_string_lossy().to_string(),
        );
        let layout = BasedirLayout::new(OptionResolver::new(&config));
        let request = BuildRequest::new("foo.dsc");

        layout.resolve(&bullseye(), "amd64", &request).unwrap();
        assert!(!logs_contain("debian-bullseye-amd64.tar.gz not found"));

        layout.resolve(&bullseye(), "arm64", &request).unwrap();
        assert!(logs_contain("debian-bullseye-arm64.tar.gz not found"));
    }

    #[test]
    fn test_invalid_architecture() {
        let config = Config::new();
        let layout = BasedirLayout::new(OptionResolver::new(&config));

        let result = layout.resolve(&bullseye(), "../amd64", &BuildRequest::new("foo.dsc"));
        assert!(matches!(result, Err(ChrootError::InvalidArchitecture(_))));
    }
}
