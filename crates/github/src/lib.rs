pub mod logs;
pub mod summary;

use std::path::Path;

use anyhow::{Context, Result};
use failed_log_core::{
    config::GitHubConfig,
    models::{Annotation, Job, RepositoryRef, WorkflowRun},
};
use octocrab::{Octocrab, models::RunId};
use serde::Deserialize;

/// Check-run annotations of a job. The check run ID of a job is its job ID.
pub trait AnnotationSource: Sync {
    fn list_annotations(&self, job_id: u64) -> impl Future<Output = Result<Vec<Annotation>>> + Send;
}

/// The CI API calls needed to summarize a failed workflow run.
pub trait CiProvider: AnnotationSource {
    fn get_workflow_run(&self, run_id: u64) -> impl Future<Output = Result<WorkflowRun>> + Send;

    /// All jobs of the run, in the order the API returns them.
    fn list_jobs(&self, run_id: u64) -> impl Future<Output = Result<Vec<Job>>> + Send;

    /// Download the run log archive and extract it into `dir`.
    fn stage_logs(&self, run_id: u64, dir: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// Jobs of the run that completed with a `failure` conclusion.
pub async fn list_failed_jobs(ci: &impl CiProvider, run_id: u64) -> Result<Vec<Job>> {
    let mut jobs = ci.list_jobs(run_id).await?;
    jobs.retain(Job::is_failed);
    Ok(jobs)
}

#[derive(Clone)]
pub struct GitHub {
    pub client: Octocrab,
    owner: String,
    repo: String,
}

#[derive(serde::Serialize)]
struct PageParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    per_page: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
}

const PER_PAGE: u8 = 100;

#[derive(Deserialize)]
struct RunResponse {
    id: u64,
    run_number: u64,
    name: Option<String>,
    actor: Option<ActorResponse>,
    head_branch: Option<String>,
    event: String,
    html_url: String,
    repository: RepositoryResponse,
}

#[derive(Deserialize)]
struct ActorResponse {
    login: String,
}

#[derive(Deserialize)]
struct RepositoryResponse {
    full_name: String,
    html_url: String,
}

impl From<RunResponse> for WorkflowRun {
    fn from(run: RunResponse) -> Self {
        Self {
            id: run.id,
            run_number: run.run_number,
            name: run.name.unwrap_or_default(),
            actor: run.actor.map(|a| a.login).unwrap_or_default(),
            head_branch: run.head_branch.unwrap_or_default(),
            event: run.event,
            html_url: run.html_url,
            repository: RepositoryRef {
                full_name: run.repository.full_name,
                html_url: run.repository.html_url,
            },
        }
    }
}

#[derive(Deserialize)]
struct JobsResponse {
    total_count: u64,
    jobs: Vec<Job>,
}

impl GitHub {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let (owner, repo) = config.owner_repo()?;
        let mut builder = Octocrab::builder().personal_token(config.token.clone());
        if let Some(api_url) = &config.api_url {
            builder = builder
                .base_uri(api_url.as_str())
                .with_context(|| format!("Invalid GitHub API URL {api_url}"))?;
        }
        let client = builder.build().context("Failed to create GitHub client")?;
        Ok(Self { client, owner: owner.to_string(), repo: repo.to_string() })
    }

    fn repo_route(&self, path: &str) -> String {
        format!("/repos/{}/{}/{}", self.owner, self.repo, path)
    }
}

impl AnnotationSource for GitHub {
    async fn list_annotations(&self, job_id: u64) -> Result<Vec<Annotation>> {
        let route = self.repo_route(&format!("check-runs/{job_id}/annotations"));
        let mut page = 1;
        let mut annotations = Vec::new();
        loop {
            let response: Vec<Annotation> = self
                .client
                .get(&route, Some(&PageParams { per_page: Some(PER_PAGE), page: Some(page) }))
                .await
                .with_context(|| format!("Failed to fetch annotations page {page}"))?;
            let done = response.len() < PER_PAGE as usize;
            annotations.extend(response);
            if done {
                break;
            }
            page += 1;
        }
        tracing::debug!("fetched annotations");
        Ok(annotations)
    }
}

impl CiProvider for GitHub {
    async fn get_workflow_run(&self, run_id: u64) -> Result<WorkflowRun> {
        let run: RunResponse = self
            .client
            .get(self.repo_route(&format!("actions/runs/{run_id}")), None::<&()>)
            .await
            .with_context(|| format!("Failed to fetch workflow run {run_id}"))?;
        tracing::debug!("fetched workflow run");
        Ok(run.into())
    }

    async fn list_jobs(&self, run_id: u64) -> Result<Vec<Job>> {
        let route = self.repo_route(&format!("actions/runs/{run_id}/jobs"));
        let mut page = 1;
        let mut response: JobsResponse = self
            .client
            .get(&route, Some(&PageParams { per_page: Some(PER_PAGE), page: Some(page) }))
            .await
            .with_context(|| format!("Failed to fetch jobs for workflow run {run_id}"))?;
        let mut jobs = response.jobs;
        while (jobs.len() as u64) < response.total_count {
            page += 1;
            response = self
                .client
                .get(&route, Some(&PageParams { per_page: Some(PER_PAGE), page: Some(page) }))
                .await
                .with_context(|| format!("Failed to fetch jobs page {page}"))?;
            if response.jobs.is_empty() {
                break;
            }
            jobs.extend(response.jobs);
        }
        tracing::debug!("fetched jobs for workflow run");
        Ok(jobs)
    }

    async fn stage_logs(&self, run_id: u64, dir: &Path) -> Result<()> {
        let data = self
            .client
            .actions()
            .download_workflow_run_logs(&self.owner, &self.repo, RunId(run_id))
            .await
            .with_context(|| format!("Failed to download logs for workflow run {run_id}"))?;
        tracing::debug!("fetched run logs");
        logs::extract_log_archive(&data, dir)?;
        Ok(())
    }
}
