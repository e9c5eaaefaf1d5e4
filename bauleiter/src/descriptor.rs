//! Submit description of an expanded job matrix

use crate::matrix::{Environment, JobSpec};
use convenient_condor::{GlobalSettings, JobStanza, LogFiles, SubmitDescription};
use tracing::debug;

/// Serialize `jobs` in order into one submit description
///
/// Each environment's jobs are preceded by a `# family-codename` comment.
pub fn build_description(settings: &GlobalSettings, jobs: &[JobSpec]) -> SubmitDescription {
    let mut description = SubmitDescription::new(settings);
    let mut current: Option<&Environment> = None;

    for job in jobs {
        if current != Some(&job.environment) {
            description.comment(&job.environment.to_string());
            current = Some(&job.environment);
        }
        description.queue(&stanza(job));
    }

    debug!("Submit description with {} job(s)", description.job_count());
    description
}

fn stanza(job: &JobSpec) -> JobStanza {
    JobStanza {
        label: job.arch.clone(),
        arguments: job.arguments.clone(),
        transfer_input_files: job.transfer_files.clone(),
        logs: LogFiles {
            dir: job.logdir.clone(),
            stem: job.log_stem(),
        },
    }
}
