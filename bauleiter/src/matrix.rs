//! Job matrix expansion
//!
//! One build request fans out into one job per environment and architecture,
//! environment-major. Options are resolved per family, so two environments of
//! different families may build for different architectures.
//!
//! The source package is built into every job, but the source artifacts
//! (`--source-include yes`) are only produced by the first architecture of an
//! environment.

use crate::argv::{
    ARCH_FLAG, ArgvError, BUILD_BASEDIR_FLAG, CHROOT_BASEDIR_FLAG, ENV_FLAG, RewrittenArgs,
    SEPARATOR, SOURCE_INCLUDE_FLAG,
};
use crate::backport::{BackportError, Backporter};
use crate::chroot::{ChrootBaseResolver, ChrootError, archive_path};
use crate::config::Config;
use crate::options::{BUILD_SECTION, OptionError, OptionResolver};
use convenient_dsc::{DscError, DscFile};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Build directory on the execute node, relative to the job's scratch dir
pub const REMOTE_BUILD_BASEDIR: &str = "buildbase";

/// A target distribution release
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Environment {
    /// Distribution family, e.g. `debian`
    pub family: String,
    /// Release codename, e.g. `bookworm`
    pub codename: String,
}

impl Environment {
    /// Create an environment
    pub fn new(family: impl Into<String>, codename: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            codename: codename.into(),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.family, self.codename)
    }
}

impl FromStr for Environment {
    type Err = MatrixError;

    /// Parse `family-codename`; the codename may contain further dashes
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((family, codename)) if !family.is_empty() && !codename.is_empty() => {
                Ok(Self::new(family, codename))
            }
            _ => Err(MatrixError::InvalidEnvironment(s.to_string())),
        }
    }
}

/// Environments listed as `build.environments`
pub fn default_environments(config: &Config) -> Result<Vec<Environment>, MatrixError> {
    config
        .get(BUILD_SECTION, "environments")
        .map(|value| value.as_list())
        .unwrap_or_default()
        .iter()
        .map(|env| env.parse())
        .collect()
}

/// A parsed `build-pkg-condor` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Source package descriptor
    pub descriptor: PathBuf,
    /// Target environments in build order
    pub environments: Vec<Environment>,
    /// Architectures overriding the configured ones
    pub arch: Option<Vec<String>>,
    /// Backport the package to each environment first
    pub backport: bool,
    /// Explicit source inclusion policy
    pub source_include: Option<bool>,
    /// Where chroot archives live
    pub chroot_basedir: Option<PathBuf>,
    /// Local build directory; remote jobs always use their scratch dir
    pub build_basedir: Option<PathBuf>,
    /// Where build results go
    pub result_dir: Option<PathBuf>,
    /// Where scheduler logs go
    pub condor_logdir: Option<PathBuf>,
}

impl BuildRequest {
    /// Request for `descriptor` with nothing else specified
    pub fn new(descriptor: impl Into<PathBuf>) -> Self {
        Self {
            descriptor: descriptor.into(),
            environments: Vec::new(),
            arch: None,
            backport: false,
            source_include: None,
            chroot_basedir: None,
            build_basedir: None,
            result_dir: None,
            condor_logdir: None,
        }
    }
}

/// One remote build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Target environment
    pub environment: Environment,
    /// Target architecture
    pub arch: String,
    /// Arguments of the remote invocation
    pub arguments: Vec<String>,
    /// Files transferred to the execute node
    pub transfer_files: Vec<PathBuf>,
    /// Whether this job produces the source artifacts
    pub source_include: bool,
    /// Directory for the job's scheduler logs
    pub logdir: PathBuf,
    /// Source package name
    pub package: String,
    /// Source package version
    pub version: String,
}

impl JobSpec {
    /// Log file name stem: `<package>_<version>_<arch>`
    pub fn log_stem(&self) -> String {
        format!("{}_{}_{}", self.package, self.version, self.arch)
    }
}

/// Expands build requests into jobs
pub struct MatrixExpander<'a> {
    options: OptionResolver<'a>,
    backporter: &'a dyn Backporter,
    chroots: &'a dyn ChrootBaseResolver,
}

impl<'a> MatrixExpander<'a> {
    /// Create an expander
    pub fn new(
        options: OptionResolver<'a>,
        backporter: &'a dyn Backporter,
        chroots: &'a dyn ChrootBaseResolver,
    ) -> Self {
        Self {
            options,
            backporter,
            chroots,
        }
    }

    /// Expand `request` into jobs, using `template` as the common part of
    /// every remote invocation
    pub fn expand(
        &self,
        request: &BuildRequest,
        template: &RewrittenArgs,
        dsc: &DscFile,
    ) -> Result<Vec<JobSpec>, MatrixError> {
        template.ensure_descriptor(&request.descriptor)?;

        let mut jobs = Vec::new();
        for (position, environment) in request.environments.iter().enumerate() {
            let backported;
            let dsc = if request.backport {
                let path = self.backporter.backport(dsc.path(), environment)?;
                backported = DscFile::load(&path)?;
                &backported
            } else {
                dsc
            };

            let environment_jobs =
                self.expand_environment(request, template, dsc, environment, position)?;
            if environment_jobs.is_empty() {
                warn!("No architectures configured for {}, skipping", environment);
            }
            jobs.extend(environment_jobs);
        }

        info!(
            "Expanded {} {} into {} job(s) for {} environment(s)",
            dsc.source(),
            dsc.version(),
            jobs.len(),
            request.environments.len()
        );
        Ok(jobs)
    }

    fn expand_environment(
        &self,
        request: &BuildRequest,
        template: &RewrittenArgs,
        dsc: &DscFile,
        environment: &Environment,
        position: usize,
    ) -> Result<Vec<JobSpec>, MatrixError> {
        let family = environment.family.as_str();
        let include_source = self.source_include_policy(request, family, position)?;

        let default_logdir = self
            .options
            .section_default("condor logdir", PathBuf::from("."))?;
        let logdir = self
            .options
            .resolve_logdir("condor logdir", request.condor_logdir.clone(), family, default_logdir)?
            .value;
        let logdir = std::path::absolute(&logdir)
            .map_err(|e| MatrixError::Io(logdir.clone(), e.to_string()))?;

        let default_archs = self
            .options
            .section_default("architectures", Vec::<String>::new())?;
        let archs = self
            .options
            .resolve("architectures", request.arch.clone(), family, default_archs)?
            .value;

        let mut jobs = Vec::with_capacity(archs.len());
        for (index, arch) in archs.into_iter().enumerate() {
            let chroot = archive_path(&self.chroots.resolve(environment, &arch, request)?);
            let source_include = index == 0 && include_source;

            let mut arguments = template.arguments.clone();
            arguments.extend([
                ENV_FLAG.to_string(),
                environment.family.clone(),
                environment.codename.clone(),
                BUILD_BASEDIR_FLAG.to_string(),
                REMOTE_BUILD_BASEDIR.to_string(),
                ARCH_FLAG.to_string(),
                arch.clone(),
                CHROOT_BASEDIR_FLAG.to_string(),
                ".".to_string(),
                SOURCE_INCLUDE_FLAG.to_string(),
                if source_include { "yes" } else { "no" }.to_string(),
                SEPARATOR.to_string(),
                dsc.file_name(),
            ]);

            let mut transfer_files = vec![dsc.path().to_path_buf()];
            transfer_files.extend(dsc.file_paths());
            transfer_files.push(chroot);

            debug!(
                "Job {}/{}: source include {}",
                environment, arch, source_include
            );
            jobs.push(JobSpec {
                environment: environment.clone(),
                arch,
                arguments,
                transfer_files,
                source_include,
                logdir: logdir.clone(),
                package: dsc.source().to_string(),
                version: dsc.version().to_string(),
            });
        }
        Ok(jobs)
    }

    /// Source inclusion for the environment at `position`
    ///
    /// An explicit request applies to the first environment, and to every
    /// environment when backporting; otherwise the family configuration
    /// decides.
    fn source_include_policy(
        &self,
        request: &BuildRequest,
        family: &str,
        position: usize,
    ) -> Result<bool, MatrixError> {
        let explicit = if position == 0 || request.backport {
            request.source_include
        } else {
            None
        };
        Ok(self
            .options
            .resolve("source include", explicit, family, false)?
            .value)
    }
}

/// Matrix expansion error types
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    /// Environment not in `family-codename` form
    #[error("Invalid environment '{0}', expected family-codename")]
    InvalidEnvironment(String),

    /// File system error
    #[error("IO error for {0}: {1}")]
    Io(PathBuf, String),

    /// Invocation does not fit the request
    #[error(transparent)]
    Argv(#[from] ArgvError),

    /// Option resolution failed
    #[error(transparent)]
    Option(#[from] OptionError),

    /// Chroot lookup failed
    #[error(transparent)]
    Chroot(#[from] ChrootError),

    /// Backporting failed
    #[error(transparent)]
    Backport(#[from] BackportError),

    /// A backported descriptor could not be loaded
    #[error(transparent)]
    Dsc(#[from] DscError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argv::ArgvRewriter;
    use crate::backport::NoBackporter;
    use crate::chroot::BasedirLayout;
    use std::path::Path;
    use tempfile::TempDir;

    const FOO_DSC: &str = "\
Format: 3.0 (quilt)
Source: foo
Version: 1.0
Files:
 d41d8cd98f00b204e9800998ecf8427e 100 foo_1.0.orig.tar.gz
";

    struct Fixture {
        _temp: TempDir,
        logdir: PathBuf,
        dsc: DscFile,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("foo_1.0.dsc");
        std::fs::write(&path, FOO_DSC).unwrap();
        Fixture {
            logdir: temp.path().join("logs"),
            dsc: DscFile::load(&path).unwrap(),
            _temp: temp,
        }
    }

    fn request(fixture: &Fixture, envs: &[&str]) -> BuildRequest {
        BuildRequest {
            environments: envs.iter().map(|e| e.parse().unwrap()).collect(),
            condor_logdir: Some(fixture.logdir.clone()),
            chroot_basedir: Some(PathBuf::from("/srv/chroots")),
            ..BuildRequest::new(fixture.dsc.path())
        }
    }

    fn template(dsc: &Path) -> RewrittenArgs {
        let args = vec![
            "bauleiter".to_string(),
            "build-pkg-condor".to_string(),
            dsc.display().to_string(),
        ];
        ArgvRewriter::default().rewrite(&args).unwrap()
    }

    fn expand(config: &Config, request: &BuildRequest, dsc: &DscFile) -> Vec<JobSpec> {
        let options = OptionResolver::new(config);
        let chroots = BasedirLayout::new(options);
        MatrixExpander::new(options, &NoBackporter, &chroots)
            .expand(request, &template(&request.descriptor), dsc)
            .unwrap()
    }

    #[test]
    fn test_environment_parsing() {
        let env: Environment = "debian-bullseye".parse().unwrap();
        assert_eq!(env, Environment::new("debian", "bullseye"));
        assert_eq!(env.to_string(), "debian-bullseye");

        let env: Environment = "ubuntu-jammy-backports".parse().unwrap();
        assert_eq!(env.codename, "jammy-backports");

        assert!("bullseye".parse::<Environment>().is_err());
        assert!("-bullseye".parse::<Environment>().is_err());
        assert!("debian-".parse::<Environment>().is_err());
    }

    #[test]
    fn test_default_environments() {
        let mut config = Config::new();
        assert!(default_environments(&config).unwrap().is_empty());

        config.set(BUILD_SECTION, "environments", "debian-bookworm ubuntu-jammy");
        assert_eq!(
            default_environments(&config).unwrap(),
            vec![
                Environment::new("debian", "bookworm"),
                Environment::new("ubuntu", "jammy")
            ]
        );

        config.set(BUILD_SECTION, "environments", "bookworm");
        assert!(matches!(
            default_environments(&config),
            Err(MatrixError::InvalidEnvironment(_))
        ));
    }

    #[test]
    fn test_foo_round_trip() {
        let fixture = fixture();
        let mut config = Config::new();
        config.set(BUILD_SECTION, "debian architectures", "amd64 i386");
        let request = BuildRequest {
            source_include: Some(true),
            ..request(&fixture, &["debian-bullseye"])
        };

        let jobs = expand(&config, &request, &fixture.dsc);

        assert_eq!(jobs.len(), 2);
        let dir = fixture.dsc.dir();
        for (job, arch) in jobs.iter().zip(["amd64", "i386"]) {
            assert_eq!(job.arch, arch);
            assert_eq!(
                job.transfer_files,
                vec![
                    fixture.dsc.path().to_path_buf(),
                    dir.join("foo_1.0.orig.tar.gz"),
                    PathBuf::from(format!("/srv/chroots/debian-bullseye-{arch}.tar.gz")),
                ]
            );
            assert_eq!(job.log_stem(), format!("foo_1.0_{arch}"));
            assert_eq!(job.logdir, fixture.logdir);
        }
        assert!(jobs[0].source_include);
        assert!(!jobs[1].source_include);
        assert_eq!(
            jobs[0].arguments,
            vec![
                "build-pkg",
                "--env",
                "debian",
                "bullseye",
                "--build-basedir",
                "buildbase",
                "--arch",
                "amd64",
                "--chroot-basedir",
                ".",
                "--source-include",
                "yes",
                "--",
                "foo_1.0.dsc",
            ]
        );
        assert_eq!(jobs[1].arguments[11], "no");
        assert!(fixture.logdir.is_dir());
    }

    #[test]
    fn test_job_count_and_order() {
        let fixture = fixture();
        let mut config = Config::new();
        config.set(BUILD_SECTION, "architectures", "amd64");
        config.set(BUILD_SECTION, "debian architectures", "amd64 i386 arm64");
        let request = request(&fixture, &["debian-bookworm", "ubuntu-jammy", "debian-trixie"]);

        let jobs = expand(&config, &request, &fixture.dsc);

        let order: Vec<String> = jobs
            .iter()
            .map(|job| format!("{}/{}", job.environment, job.arch))
            .collect();
        assert_eq!(
            order,
            vec![
                "debian-bookworm/amd64",
                "debian-bookworm/i386",
                "debian-bookworm/arm64",
                "ubuntu-jammy/amd64",
                "debian-trixie/amd64",
                "debian-trixie/i386",
                "debian-trixie/arm64",
            ]
        );
    }

    #[test]
    fn test_arch_override_applies_to_all_families() {
        let fixture = fixture();
        let mut config = Config::new();
        config.set(BUILD_SECTION, "debian architectures", "amd64 i386");
        let request = BuildRequest {
            arch: Some(vec!["arm64".to_string()]),
            ..request(&fixture, &["debian-bookworm", "ubuntu-jammy"])
        };

        let jobs = expand(&config, &request, &fixture.dsc);

        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|job| job.arch == "arm64"));
    }

    #[test]
    fn test_source_include_only_first_arch_per_environment() {
        let fixture = fixture();
        let mut config = Config::new();
        config.set(BUILD_SECTION, "architectures", "amd64 i386 arm64");
        config.set(BUILD_SECTION, "debian source include", "yes");
        config.set(BUILD_SECTION, "ubuntu source include", "yes");
        let request = request(&fixture, &["debian-bookworm", "ubuntu-jammy"]);

        let jobs = expand(&config, &request, &fixture.dsc);

        for environment in ["debian-bookworm", "ubuntu-jammy"] {
            let flags: Vec<bool> = jobs
                .iter()
                .filter(|job| job.environment.to_string() == environment)
                .map(|job| job.source_include)
                .collect();
            assert_eq!(flags, vec![true, false, false]);
        }
    }

    #[test]
    fn test_explicit_source_include_does_not_leak() {
        let fixture = fixture();
        let mut config = Config::new();
        config.set(BUILD_SECTION, "architectures", "amd64 i386");
        let request = BuildRequest {
            source_include: Some(true),
            ..request(&fixture, &["debian-bookworm", "debian-trixie"])
        };

        let jobs = expand(&config, &request, &fixture.dsc);

        let flags: Vec<bool> = jobs.iter().map(|job| job.source_include).collect();
        assert_eq!(flags, vec![true, false, false, false]);
    }

    #[test]
    fn test_explicit_no_beats_family_config_for_first_environment() {
        let fixture = fixture();
        let mut config = Config::new();
        config.set(BUILD_SECTION, "architectures", "amd64");
        config.set(BUILD_SECTION, "debian source include", "yes");
        let request = BuildRequest {
            source_include: Some(false),
            ..request(&fixture, &["debian-bookworm", "debian-trixie"])
        };

        let jobs = expand(&config, &request, &fixture.dsc);

        assert!(!jobs[0].source_include);
        assert!(jobs[1].source_include);
    }

    #[test]
    fn test_empty_architecture_list_yields_no_jobs() {
        let fixture = fixture();
        let mut config = Config::new();
        config.set(BUILD_SECTION, "debian architectures", "amd64");
        let request = request(&fixture, &["ubuntu-jammy", "debian-bookworm"]);

        let jobs = expand(&config, &request, &fixture.dsc);

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].environment, Environment::new("debian", "bookworm"));
    }

    #[test]
    fn test_descriptor_must_match_template() {
        let fixture = fixture();
        let config = Config::new();
        let options = OptionResolver::new(&config);
        let chroots = BasedirLayout::new(options);
        let request = request(&fixture, &["debian-bookworm"]);

        let result = MatrixExpander::new(options, &NoBackporter, &chroots).expand(
            &request,
            &template(Path::new("other.dsc")),
            &fixture.dsc,
        );

        assert!(matches!(result, Err(MatrixError::Argv(_))));
    }

    /// Writes `foo_1.0~<codename>1.dsc` next to the original descriptor
    struct RenamingBackporter;

    impl Backporter for RenamingBackporter {
        fn backport(
            &self,
            descriptor: &Path,
            environment: &Environment,
        ) -> Result<PathBuf, BackportError> {
            let version = format!("1.0~{}1", environment.codename);
            let path = descriptor.with_file_name(format!("foo_{version}.dsc"));
            let content = format!(
                "Source: foo\nVersion: {version}\nFiles:\n d41d8cd98f00b204e9800998ecf8427e 100 foo_{version}.debian.tar.xz\n"
            );
            std::fs::write(&path, content).unwrap();
            Ok(path)
        }
    }

    #[test]
    fn test_backported_descriptor_per_environment() {
        let fixture = fixture();
        let mut config = Config::new();
        config.set(BUILD_SECTION, "architectures", "amd64 i386");
        let options = OptionResolver::new(&config);
        let chroots = BasedirLayout::new(options);
        let request = BuildRequest {
            backport: true,
            source_include: Some(true),
            ..request(&fixture, &["debian-bookworm", "ubuntu-jammy"])
        };

        let jobs = MatrixExpander::new(options, &RenamingBackporter, &chroots)
            .expand(&request, &template(&request.descriptor), &fixture.dsc)
            .unwrap();

        let flags: Vec<bool> = jobs.iter().map(|job| job.source_include).collect();
        assert_eq!(flags, vec![true, false, true, false]);

        let dir = fixture.dsc.dir();
        for job in &jobs {
            let version = format!("1.0~{}1", job.environment.codename);
            assert_eq!(job.package, "foo");
            assert_eq!(job.version, version);
            assert_eq!(job.log_stem(), format!("foo_{version}_{}", job.arch));
            assert_eq!(
                job.transfer_files,
                vec![
                    dir.join(format!("foo_{version}.dsc")),
                    dir.join(format!("foo_{version}.debian.tar.xz")),
                    PathBuf::from(format!(
                        "/srv/chroots/{}-{}.tar.gz",
                        job.environment, job.arch
                    )),
                ]
            );
            let tail = &job.arguments[job.arguments.len() - 2..];
            assert_eq!(tail, ["--".to_string(), format!("foo_{version}.dsc")]);
        }
    }

    #[test]
    fn test_backport_without_command_fails() {
        let fixture = fixture();
        let mut config = Config::new();
        config.set(BUILD_SECTION, "architectures", "amd64");
        let options = OptionResolver::new(&config);
        let chroots = BasedirLayout::new(options);
        let request = BuildRequest {
            backport: true,
            ..request(&fixture, &["debian-bookworm"])
        };

        let result = MatrixExpander::new(options, &NoBackporter, &chroots).expand(
            &request,
            &template(&request.descriptor),
            &fixture.dsc,
        );

        assert!(matches!(
            result,
            Err(MatrixError::Backport(BackportError::NotConfigured))
        ));
    }
}
