use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub slack: SlackConfig,
    pub logs: LogsConfig,
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub token: String,
    /// `owner/repo`
    pub repository: String,
    pub api_url: Option<Url>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SlackConfig {
    pub webhook_url: String,
    pub timeout_secs: u64,
}

impl Default for SlackConfig {
    fn default() -> Self { Self { webhook_url: String::new(), timeout_secs: 30 } }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Directory the run log archive is extracted into.
    pub dir: PathBuf,
}

impl Default for LogsConfig {
    fn default() -> Self { Self { dir: PathBuf::from("logs") } }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Number of jobs whose evidence is fetched at the same time.
    pub concurrency: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self { Self { concurrency: 4 } }
}

const TOKEN_VARS: &[&str] = &["INPUT_GITHUB_TOKEN", "INPUT_GITHUB-TOKEN", "GITHUB_TOKEN"];
const WEBHOOK_URL_VARS: &[&str] = &["SLACK_WEBHOOK_URL", "INPUT_SLACK-WEBHOOK-URL"];

impl Config {
    /// Load the config file (if any), apply environment overrides and validate the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file {}", path.display()))?;
        serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Override values from the environment. Empty variables are ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        let first = |keys: &[&str]| {
            keys.iter().find_map(|key| var(key).filter(|v| !v.trim().is_empty()))
        };
        if let Some(token) = first(TOKEN_VARS) {
            self.github.token = token;
        }
        if let Some(repository) = first(&["GITHUB_REPOSITORY"]) {
            self.github.repository = repository;
        }
        if let Some(api_url) = first(&["GITHUB_API_URL"]) {
            self.github.api_url =
                Some(Url::parse(&api_url).with_context(|| format!("Invalid GITHUB_API_URL {api_url}"))?);
        }
        if let Some(webhook_url) = first(WEBHOOK_URL_VARS) {
            self.slack.webhook_url = webhook_url;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.github.token.is_empty() {
            bail!("Input required and not supplied: github-token");
        }
        if self.slack.webhook_url.is_empty() {
            bail!("Input required and not supplied: slack-webhook-url");
        }
        Url::parse(&self.slack.webhook_url).context("Invalid Slack webhook URL")?;
        self.github.owner_repo()?;
        Ok(())
    }
}

impl GitHubConfig {
    pub fn owner_repo(&self) -> Result<(&str, &str)> {
        match self.repository.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok((owner, repo))
            }
            _ => bail!("Repository must be in the form owner/repo, got '{}'", self.repository),
        }
    }
}
