//! Submit description text
//!
//! The document is append-only: a header written on construction, then
//! comments and job stanzas in the order they should be queued. HTCondor
//! queues jobs in document order.

use std::fmt;
use std::path::PathBuf;

/// Settings shared by all jobs of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSettings {
    /// Memory request per job, in megabytes
    pub request_memory: u32,
    /// Submit with lowest queue priority
    pub nice_user: bool,
    /// Program run on the execute node (not transferred)
    pub executable: String,
}

/// Log file locations of one job
///
/// HTCondor fills in `$(Cluster)` and `$(Process)` at submit time, so each
/// run gets its own files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFiles {
    /// Directory on the submit machine
    pub dir: PathBuf,
    /// File name stem, e.g. `hello_2.10-3_amd64`
    pub stem: String,
}

impl LogFiles {
    /// Path of the log file with the given extension
    pub fn path(&self, extension: &str) -> String {
        format!(
            "{}/{}.$(Cluster).$(Process).{}",
            self.dir.display(),
            self.stem,
            extension
        )
    }
}

/// One queued job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStanza {
    /// Comment line preceding the stanza
    pub label: String,
    /// Arguments passed to the executable
    pub arguments: Vec<String>,
    /// Files copied to the execute node
    pub transfer_input_files: Vec<PathBuf>,
    /// stdout/stderr/user log destinations
    pub logs: LogFiles,
}

/// A complete submit description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitDescription {
    text: String,
    jobs: usize,
}

impl SubmitDescription {
    /// Start a description with the global settings block
    pub fn new(settings: &GlobalSettings) -> Self {
        let nice_user = if settings.nice_user { "True" } else { "False" };
        let text = format!(
            "\nuniverse = vanilla\n\
             should_transfer_files = YES\n\
             when_to_transfer_output = ON_EXIT\n\
             getenv = True\n\
             notification = Never\n\
             transfer_executable = FALSE\n\
             request_memory = {}\n\
             nice_user = {}\n\
             executable = {}\n\n\n",
            settings.request_memory, nice_user, settings.executable
        );

        Self { text, jobs: 0 }
    }

    /// Append a comment line
    pub fn comment(&mut self, comment: &str) {
        self.text.push_str("\n# ");
        self.text.push_str(comment);
        self.text.push('\n');
    }

    /// Append a job stanza ending in a `queue` directive
    pub fn queue(&mut self, job: &JobStanza) {
        let transfer = job
            .transfer_input_files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(",");

        self.comment(&job.label);
        self.text.push_str(&format!(
            "arguments = {}\n\
             transfer_input_files = {}\n\
             error = {}\n\
             output = {}\n\
             log = {}\n\
             queue\n",
            format_arguments(&job.arguments),
            transfer,
            job.logs.path("err"),
            job.logs.path("out"),
            job.logs.path("log"),
        ));
        self.jobs += 1;
    }

    /// Number of queued jobs
    pub fn job_count(&self) -> usize {
        self.jobs
    }

    /// The document text
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for SubmitDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Render an `arguments` value
///
/// Plain space separation unless an argument needs quoting, in which case the
/// double-quoted syntax is used: arguments with blanks are wrapped in single
/// quotes, embedded quotes are doubled.
pub fn format_arguments(arguments: &[String]) -> String {
    let needs_quoting = |arg: &String| {
        arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'')
    };

    if !arguments.iter().any(needs_quoting) {
        return arguments.join(" ");
    }

    let quoted: Vec<String> = arguments
        .iter()
        .map(|arg| {
            let escaped = arg.replace('"', "\"\"");
            if needs_quoting(arg) {
                format!("'{}'", escaped.replace('\'', "''"))
            } else {
                escaped
            }
        })
        .collect();
    format!("\"{}\"", quoted.join(" "))
}
