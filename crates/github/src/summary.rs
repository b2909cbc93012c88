use anyhow::{Context, Result};
use failed_log_core::models::{Annotation, Conclusion, Evidence, Job, JobSummary, StepLog};
use futures_util::{StreamExt, TryStreamExt, stream};

use crate::{
    AnnotationSource,
    logs::{LogSource, format_log},
};

/// Drop the generic "Process completed with exit code N" annotations.
pub fn exclude_default_errors(annotations: Vec<Annotation>) -> Vec<Annotation> {
    annotations.into_iter().filter(|a| !a.is_default_error()).collect()
}

/// Collect the formatted logs of every failed step of `job`, in step order.
pub fn collect_step_logs(job: &Job, logs: &impl LogSource) -> Result<Vec<StepLog>> {
    let job_dir = job.log_dir_name();
    let mut step_logs = Vec::new();
    for step in job.failed_steps() {
        let log = logs.read_step_log(&job_dir, step.number, &step.name)?;
        step_logs.push(StepLog { step_name: step.name.clone(), log: format_log(&log) });
    }
    tracing::debug!("get log from logfile");
    Ok(step_logs)
}

/// Choose the evidence reported for a failed job.
///
/// Annotations win when any remain after excluding the default error annotation.
/// Otherwise the logs of the failed steps are used. Without a log source (the run
/// log archive was not staged) the job is reported with no step logs.
pub async fn select_evidence<A, L>(job: &Job, annotations: &A, logs: Option<&L>) -> Result<Evidence>
where
    A: AnnotationSource,
    L: LogSource,
{
    let fetched = annotations
        .list_annotations(job.id)
        .await
        .with_context(|| format!("Failed to fetch annotations for job {}", job.id))?;
    let annotations = exclude_default_errors(fetched);
    tracing::debug!("exclude default error annotations: {}", annotations.len());

    if !annotations.is_empty() {
        tracing::debug!("jobId: {}, annotations: {}", job.id, annotations.len());
        return Ok(Evidence::Annotations(annotations));
    }
    let step_logs = match logs {
        Some(logs) => collect_step_logs(job, logs)?,
        None => Vec::new(),
    };
    tracing::debug!("jobId: {}, log: {}", job.id, step_logs.len());
    Ok(Evidence::Logs(step_logs))
}

/// Build the per-job summaries for every failed job, preserving the order of `jobs`.
///
/// Up to `concurrency` jobs are processed at once. The first error aborts the build.
pub async fn build_summary<A, L>(
    jobs: &[Job],
    annotations: &A,
    logs: Option<&L>,
    concurrency: usize,
) -> Result<Vec<JobSummary>>
where
    A: AnnotationSource,
    L: LogSource,
{
    tracing::debug!("jobs: {}", jobs.len());
    stream::iter(jobs.iter().filter(|job| job.conclusion == Some(Conclusion::Failure)))
        .map(|job| async move {
            let evidence = select_evidence(job, annotations, logs)
                .await
                .with_context(|| format!("Failed to summarize job {}", job.name))?;
            anyhow::Ok(JobSummary { job: job.clone(), evidence })
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}
