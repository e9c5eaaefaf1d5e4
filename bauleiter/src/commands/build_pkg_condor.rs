//! `build-pkg-condor`: submit the build matrix of one source package
//!
//! Pipeline:
//! 1. Parse the request and load the source package descriptor
//! 2. Rewrite the original invocation into the remote `build-pkg` invocation
//! 3. Expand environments x architectures into jobs
//! 4. Serialize the jobs into one submit description
//! 5. Hand the description to `condor_submit` (or a file)

use super::BuildPkgCondorArgs;
use crate::argv::ArgvRewriter;
use crate::backport::{Backporter, CommandBackporter, NoBackporter};
use crate::chroot::BasedirLayout;
use crate::config::Config;
use crate::descriptor::build_description;
use crate::matrix::MatrixExpander;
use crate::options::OptionResolver;
use convenient_condor::{CondorSubmit, GlobalSettings, SubmitFile, Submitter};
use convenient_dsc::DscFile;
use tracing::{debug, info, warn};

/// Configuration section of scheduler settings
pub const CONDOR_SECTION: &str = "condor";

/// Submitter configured as `condor.submit program`, else `condor_submit`
pub fn condor_submit(config: &Config) -> CondorSubmit {
    let command = config
        .get(CONDOR_SECTION, "submit program")
        .map(|value| value.as_list())
        .unwrap_or_default();

    match command.split_first() {
        Some((program, args)) => args
            .iter()
            .fold(CondorSubmit::with_program(program.as_str()), |submit, arg| {
                submit.arg(arg.as_str())
            }),
        None => CondorSubmit::new(),
    }
}

/// Submit all jobs for `args`; `argv` is the complete original command line
pub fn execute(
    config: &Config,
    args: BuildPkgCondorArgs,
    argv: &[String],
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let request_memory = args.condor.request_memory;
    let nice_user = bool::from(args.condor.nice_user);
    let submit_file = args.condor.submit_file.clone();

    let request = args.request(config)?;
    let dsc = DscFile::load(&request.descriptor)?;
    info!(
        "Building {} {} for {} environment(s)",
        dsc.source(),
        dsc.version(),
        request.environments.len()
    );
    debug!("Source format {}", dsc.field("Format").unwrap_or("1.0"));

    let template = ArgvRewriter::default().rewrite(argv)?;

    let options = OptionResolver::new(config);
    let chroots = BasedirLayout::new(options);
    let backporter: Box<dyn Backporter> = match CommandBackporter::from_config(config) {
        Some(backporter) => Box::new(backporter),
        None => Box::new(NoBackporter),
    };
    let jobs = MatrixExpander::new(options, backporter.as_ref(), &chroots)
        .expand(&request, &template, &dsc)?;

    if jobs.is_empty() {
        warn!("No jobs to submit for {} {}", dsc.source(), dsc.version());
        return Ok(());
    }

    let executable = config
        .get(CONDOR_SECTION, "executable")
        .map(|value| value.as_text())
        .unwrap_or_else(|| template.executable.clone());
    let settings = GlobalSettings {
        request_memory,
        nice_user,
        executable,
    };
    let description = build_description(&settings, &jobs);

    let submitter: Box<dyn Submitter> = match submit_file {
        Some(path) => Box::new(SubmitFile::new(path)),
        None => Box::new(condor_submit(config)),
    };
    let receipt = submitter.submit(&description)?;
    debug!("{} output:\n{}", submitter.name(), receipt.output.trim_end());

    match receipt.cluster {
        Some(cluster) => info!(
            "Submitted {} job(s) to cluster {} via {}",
            description.job_count(),
            cluster,
            submitter.name()
        ),
        None => info!(
            "Submitted {} job(s) via {}",
            description.job_count(),
            submitter.name()
        ),
    }
    Ok(())
}
