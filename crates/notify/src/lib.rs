use std::{fmt, path::PathBuf};

use anyhow::{Context, Result};
use failed_log_github::{CiProvider, list_failed_jobs, logs::LogDir, summary::build_summary};
use failed_log_slack::{DeliveryResult, MessageSink, generate_message};

/// Trigger event whose run has finished, so the run log archive can be downloaded.
pub const WORKFLOW_RUN_EVENT: &str = "workflow_run";

/// A single notification for one workflow run.
#[derive(Debug, Clone)]
pub struct NotifyRequest {
    /// The workflow run to report on.
    pub run_id: u64,
    /// The event that triggered this invocation ("workflow_run", "push", etc.).
    pub event: String,
    /// Where the run log archive is extracted.
    pub log_dir: PathBuf,
    /// Number of jobs summarized at the same time.
    pub concurrency: usize,
}

impl NotifyRequest {
    /// Logs of the current run are not downloadable until it finishes, so they are only
    /// available when reporting on another run from a `workflow_run` trigger.
    pub fn requires_archived_logs(&self) -> bool { self.event == WORKFLOW_RUN_EVENT }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Outcome {
    NoFailedJobs,
    Delivered(DeliveryResult),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFailedJobs => f.write_str("No failed jobs found."),
            Self::Delivered(result) => {
                let json = serde_json::to_string(result).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

/// Report the failed jobs of a workflow run to `sink`.
///
/// Nothing is delivered if any step fails.
pub async fn notify_failed_jobs<C, S>(ci: &C, sink: &S, request: &NotifyRequest) -> Result<Outcome>
where
    C: CiProvider,
    S: MessageSink,
{
    tracing::debug!("event: {}", request.event);
    tracing::debug!("runId: {}", request.run_id);

    let run = ci.get_workflow_run(request.run_id).await?;
    let failed_jobs = list_failed_jobs(ci, request.run_id).await?;
    if failed_jobs.is_empty() {
        tracing::info!("{}", Outcome::NoFailedJobs);
        return Ok(Outcome::NoFailedJobs);
    }

    let logs = if request.requires_archived_logs() {
        ci.stage_logs(request.run_id, &request.log_dir).await.context("Failed to stage run logs")?;
        Some(LogDir::new(&request.log_dir))
    } else {
        None
    };

    let summary = build_summary(&failed_jobs, ci, logs.as_ref(), request.concurrency).await?;
    let message = generate_message(&run, &summary);
    let result = sink.deliver(&message).await.context("Failed to deliver Slack message")?;
    Ok(Outcome::Delivered(result))
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        fs,
        path::Path,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use anyhow::bail;
    use failed_log_core::models::{
        Annotation, AnnotationLevel, Conclusion, Job, JobStatus, RepositoryRef, Step, WorkflowRun,
    };
    use failed_log_github::AnnotationSource;
    use failed_log_slack::{Block, Message};

    use super::*;

    #[derive(Default)]
    struct FakeCi {
        jobs: Vec<Job>,
        annotations: HashMap<u64, Vec<Annotation>>,
        /// Files written into the log directory when logs are staged.
        log_files: Vec<(String, String)>,
        missing_run: bool,
        staged: AtomicUsize,
    }

    impl AnnotationSource for FakeCi {
        async fn list_annotations(&self, job_id: u64) -> Result<Vec<Annotation>> {
            Ok(self.annotations.get(&job_id).cloned().unwrap_or_default())
        }
    }

    impl CiProvider for FakeCi {
        async fn get_workflow_run(&self, run_id: u64) -> Result<WorkflowRun> {
            if self.missing_run {
                bail!("Not Found");
            }
            Ok(WorkflowRun {
                id: run_id,
                run_number: 42,
                name: "CI".to_string(),
                actor: "octocat".to_string(),
                head_branch: "main".to_string(),
                event: "push".to_string(),
                html_url: format!("https://github.com/octocat/hello/actions/runs/{run_id}"),
                repository: RepositoryRef {
                    full_name: "octocat/hello".to_string(),
                    html_url: "https://github.com/octocat/hello".to_string(),
                },
            })
        }

        async fn list_jobs(&self, _run_id: u64) -> Result<Vec<Job>> { Ok(self.jobs.clone()) }

        async fn stage_logs(&self, _run_id: u64, dir: &Path) -> Result<()> {
            for (name, contents) in &self.log_files {
                let path = dir.join(name);
                fs::create_dir_all(path.parent().unwrap())?;
                fs::write(path, contents)?;
            }
            self.staged.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<Message>>,
    }

    impl MessageSink for RecordingSink {
        async fn deliver(&self, message: &Message) -> Result<DeliveryResult> {
            self.messages.lock().unwrap().push(message.clone());
            Ok(DeliveryResult { text: "ok".to_string() })
        }
    }

    impl RecordingSink {
        fn attachment_texts(&self) -> Vec<String> {
            let messages = self.messages.lock().unwrap();
            assert_eq!(messages.len(), 1);
            messages[0].attachments[0]
                .blocks
                .iter()
                .map(|b| match b {
                    Block::Divider => "---".to_string(),
                    other => other.text().unwrap_or_default().to_string(),
                })
                .collect()
        }
    }

    fn job(id: u64, name: &str, conclusion: Conclusion, steps: Vec<Step>) -> Job {
        Job {
            id,
            name: name.to_string(),
            status: JobStatus::Completed,
            conclusion: Some(conclusion),
            html_url: Some(format!("https://github.com/octocat/hello/actions/runs/1/job/{id}")),
            steps,
        }
    }

    fn failed_step(number: u64, name: &str) -> Step {
        Step {
            name: name.to_string(),
            number,
            status: Some(JobStatus::Completed),
            conclusion: Some(Conclusion::Failure),
            started_at: None,
            completed_at: None,
        }
    }

    fn annotation(path: &str, line: u64, message: &str) -> Annotation {
        Annotation {
            path: path.to_string(),
            start_line: line,
            end_line: line,
            annotation_level: Some(AnnotationLevel::Failure),
            title: None,
            message: Some(message.to_string()),
        }
    }

    fn request(event: &str, log_dir: &Path) -> NotifyRequest {
        NotifyRequest { run_id: 1, event: event.to_string(), log_dir: log_dir.to_path_buf(), concurrency: 2 }
    }

    #[tokio::test]
    async fn test_no_failed_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let ci = FakeCi {
            jobs: vec![
                job(1, "job1", Conclusion::Success, vec![]),
                job(2, "job2", Conclusion::Success, vec![]),
                job(3, "job3", Conclusion::Success, vec![]),
            ],
            ..Default::default()
        };
        let sink = RecordingSink::default();

        let outcome = notify_failed_jobs(&ci, &sink, &request(WORKFLOW_RUN_EVENT, dir.path())).await.unwrap();

        assert_eq!(outcome, Outcome::NoFailedJobs);
        assert_eq!(outcome.to_string(), "No failed jobs found.");
        assert!(sink.messages.lock().unwrap().is_empty());
        assert_eq!(ci.staged.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_annotation_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let ci = FakeCi {
            jobs: vec![job(1, "test", Conclusion::Failure, vec![failed_step(4, "test")])],
            annotations: HashMap::from([(
                1,
                vec![
                    annotation("hoge.tsx", 100, "tests in hoge"),
                    annotation(".github", 12, "Process completed with exit code 1."),
                ],
            )]),
            ..Default::default()
        };
        let sink = RecordingSink::default();

        let outcome = notify_failed_jobs(&ci, &sink, &request("push", dir.path())).await.unwrap();

        assert_eq!(outcome, Outcome::Delivered(DeliveryResult { text: "ok".to_string() }));
        assert_eq!(outcome.to_string(), r#"{"text":"ok"}"#);
        let texts = sink.attachment_texts();
        assert_eq!(texts.len(), 4);
        assert!(texts[0].contains("test"));
        assert_eq!(texts[1], "---");
        assert!(texts[2].contains("hoge.tsx: L100~L100"));
        assert!(texts[3].contains("tests in hoge"));
    }

    #[tokio::test]
    async fn test_log_evidence_from_staged_archive() {
        let dir = tempfile::tempdir().unwrap();
        let log = (1..=40)
            .map(|i| format!("2024-01-01T00:00:{:02}.0000000Z tsc line {i}", i % 60))
            .chain(["2024-01-01T00:01:00.0000000Z ##[error]Process completed with exit code 1.".to_string()])
            .collect::<Vec<_>>()
            .join("\n");
        let ci = FakeCi {
            jobs: vec![
                job(1, "lint", Conclusion::Success, vec![]),
                job(2, "typecheck", Conclusion::Failure, vec![failed_step(3, "typecheck")]),
            ],
            annotations: HashMap::from([(
                2,
                vec![annotation(".github", 1, "Process completed with exit code 1.")],
            )]),
            log_files: vec![("typecheck/3_typecheck.txt".to_string(), log)],
            ..Default::default()
        };
        let sink = RecordingSink::default();

        notify_failed_jobs(&ci, &sink, &request(WORKFLOW_RUN_EVENT, dir.path())).await.unwrap();

        assert_eq!(ci.staged.load(Ordering::SeqCst), 1);
        let texts = sink.attachment_texts();
        assert_eq!(texts.len(), 4);
        assert!(texts[0].contains("typecheck"));
        assert_eq!(texts[1], "---");
        assert!(texts[2].contains("typecheck"));
        assert!(texts[3].contains("Process completed with exit code"));
        assert_eq!(texts[3].lines().count(), 30);
        assert!(!texts[3].contains("2024-01-01T"));
    }

    #[tokio::test]
    async fn test_logs_not_staged_for_other_events() {
        let dir = tempfile::tempdir().unwrap();
        let ci = FakeCi {
            jobs: vec![job(1, "build", Conclusion::Failure, vec![failed_step(2, "build")])],
            ..Default::default()
        };
        let sink = RecordingSink::default();

        notify_failed_jobs(&ci, &sink, &request("push", dir.path())).await.unwrap();

        assert_eq!(ci.staged.load(Ordering::SeqCst), 0);
        let texts = sink.attachment_texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Job: <https://github.com/octocat/hello/actions/runs/1/job/1|build>"));
    }

    #[tokio::test]
    async fn test_missing_staged_log_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let ci = FakeCi {
            jobs: vec![job(1, "build", Conclusion::Failure, vec![failed_step(2, "build")])],
            ..Default::default()
        };
        let sink = RecordingSink::default();

        let result = notify_failed_jobs(&ci, &sink, &request(WORKFLOW_RUN_EVENT, dir.path())).await;

        assert!(result.is_err());
        assert!(sink.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_error_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let ci = FakeCi {
            jobs: vec![job(1, "build", Conclusion::Failure, vec![])],
            missing_run: true,
            ..Default::default()
        };
        let sink = RecordingSink::default();

        let err = notify_failed_jobs(&ci, &sink, &request("push", dir.path())).await.unwrap_err();

        assert!(err.to_string().contains("Not Found"));
        assert!(sink.messages.lock().unwrap().is_empty());
    }
}
