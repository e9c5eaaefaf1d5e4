//! HTCondor job submission
//!
//! Builds submit descriptions in the `condor_submit` stanza grammar and hands
//! them to the scheduler:
//! - [`SubmitDescription`]: global header followed by one stanza per queued job
//! - [`Submitter`]: delivery of a finished description, either to
//!   `condor_submit` ([`CondorSubmit`]) or to a file ([`SubmitFile`])

pub mod description;
pub mod submit;

pub use description::{GlobalSettings, JobStanza, LogFiles, SubmitDescription, format_arguments};
pub use submit::{CondorSubmit, SubmitError, SubmitFile, SubmitReceipt, Submitter, parse_cluster};
