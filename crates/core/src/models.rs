use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Prefix of the annotation GitHub Actions attaches to every failed job.
pub const DEFAULT_ERROR_MESSAGE_PREFIX: &str = "Process completed with exit code";

/// Path of the annotation GitHub Actions attaches to every failed job.
pub const DEFAULT_ERROR_PATH: &str = ".github";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RepositoryRef {
    pub full_name: String,
    pub html_url: String,
}

/// Snapshot of a workflow run, fetched once per invocation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkflowRun {
    pub id: u64,
    pub run_number: u64,
    pub name: String,
    pub actor: String,
    pub head_branch: String,
    pub event: String,
    pub html_url: String,
    pub repository: RepositoryRef,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Waiting,
    Requested,
    Pending,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Neutral,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    Stale,
    #[serde(other)]
    Unknown,
}

impl Conclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Neutral => "neutral",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
            Self::TimedOut => "timed_out",
            Self::ActionRequired => "action_required",
            Self::Stale => "stale",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub number: u64,
    #[serde(default)]
    pub status: Option<JobStatus>,
    pub conclusion: Option<Conclusion>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl Step {
    pub fn is_failed(&self) -> bool { self.conclusion == Some(Conclusion::Failure) }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub name: String,
    pub status: JobStatus,
    pub conclusion: Option<Conclusion>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Job {
    /// A job is failed once it has completed with a `failure` conclusion.
    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Completed && self.conclusion == Some(Conclusion::Failure)
    }

    /// Directory name of this job inside an extracted run log archive.
    pub fn log_dir_name(&self) -> String { self.name.replace('/', "") }

    pub fn failed_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.is_failed())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationLevel {
    Notice,
    Warning,
    Failure,
    #[serde(other)]
    Unknown,
}

/// A check-run annotation pinned to a source location.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub path: String,
    pub start_line: u64,
    pub end_line: u64,
    #[serde(default)]
    pub annotation_level: Option<AnnotationLevel>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Annotation {
    /// Whether this is the generic "Process completed with exit code N" annotation
    /// that the runner adds to every failed job.
    pub fn is_default_error(&self) -> bool {
        self.path == DEFAULT_ERROR_PATH
            && self.message.as_deref().is_some_and(|m| m.starts_with(DEFAULT_ERROR_MESSAGE_PREFIX))
    }
}

/// Formatted log tail of a single failed step.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StepLog {
    pub step_name: String,
    pub log: String,
}

/// Diagnostic context collected for a failed job.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Evidence {
    /// Non-empty, in the order returned by the check-runs API.
    Annotations(Vec<Annotation>),
    /// One entry per failed step, in step order.
    Logs(Vec<StepLog>),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct JobSummary {
    pub job: Job,
    pub evidence: Evidence,
}
