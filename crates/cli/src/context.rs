use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, anyhow};
use failed_log_notify::WORKFLOW_RUN_EVENT;
use serde::Deserialize;

/// Which run to report on, and what triggered this invocation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TriggerContext {
    pub event: String,
    pub run_id: u64,
}

#[derive(Deserialize)]
struct EventPayload {
    workflow_run: Option<WorkflowRunPayload>,
}

#[derive(Deserialize)]
struct WorkflowRunPayload {
    id: u64,
}

impl TriggerContext {
    /// Resolve from the GitHub Actions environment. Explicit values take precedence.
    ///
    /// For `workflow_run` events the reported run is the one that triggered this
    /// workflow (from the event payload), otherwise it is the current run.
    pub fn resolve(
        var: impl Fn(&str) -> Option<String>,
        event: Option<String>,
        run_id: Option<u64>,
    ) -> Result<Self> {
        let event = event
            .or_else(|| var("GITHUB_EVENT_NAME"))
            .ok_or_else(|| anyhow!("GITHUB_EVENT_NAME is not set; pass --event"))?;
        if let Some(run_id) = run_id {
            return Ok(Self { event, run_id });
        }
        let run_id = if event == WORKFLOW_RUN_EVENT {
            let path = var("GITHUB_EVENT_PATH")
                .ok_or_else(|| anyhow!("GITHUB_EVENT_PATH is not set; pass --run-id"))?;
            workflow_run_id_from_payload(Path::new(&path))?
        } else {
            let value = var("GITHUB_RUN_ID")
                .ok_or_else(|| anyhow!("GITHUB_RUN_ID is not set; pass --run-id"))?;
            value.parse().with_context(|| format!("Invalid GITHUB_RUN_ID {value}"))?
        };
        Ok(Self { event, run_id })
    }
}

fn workflow_run_id_from_payload(path: &Path) -> Result<u64> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open event payload {}", path.display()))?;
    let payload: EventPayload = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse event payload {}", path.display()))?;
    payload
        .workflow_run
        .map(|run| run.id)
        .ok_or_else(|| anyhow!("Event payload has no workflow_run"))
}
