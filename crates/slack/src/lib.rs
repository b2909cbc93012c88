pub mod webhook;

use failed_log_core::models::{Annotation, Evidence, JobSummary, StepLog, WorkflowRun};
use serde::Serialize;

pub use webhook::{DeliveryResult, MessageSink, SlackWebhook};

/// Accent color of the failure attachment.
pub const ATTACHMENT_COLOR: &str = "#a30200";

pub const GITHUB_ICON_URL: &str = "https://github.githubassets.com/favicon.ico";

/// Slack `mrkdwn` text object.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Text {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl Text {
    pub fn mrkdwn(text: impl Into<String>) -> Self { Self { kind: "mrkdwn", text: text.into() } }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextElement {
    Image { image_url: String, alt_text: String },
    Mrkdwn { text: String },
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { text: Text },
    Context { elements: Vec<ContextElement> },
    Divider,
}

impl Block {
    pub fn section(text: impl Into<String>) -> Self { Self::Section { text: Text::mrkdwn(text) } }

    /// Text of a section block.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Section { text } => Some(&text.text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Attachment {
    pub color: String,
    pub blocks: Vec<Block>,
}

/// Incoming webhook payload.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Message {
    pub blocks: Vec<Block>,
    pub attachments: Vec<Attachment>,
}

fn link(url: &str, label: &str) -> String { format!("<{url}|{label}>") }

fn code_block(text: &str) -> String { format!("```{text}```") }

/// Run overview and repository context shown above the attachment.
pub fn generate_header_blocks(run: &WorkflowRun) -> [Block; 2] {
    let num = link(&run.html_url, &format!("#{}", run.run_number));
    let text = format!(
        "\nFailed: {}`s `{}` on `{}`\nWorkflow: {} {}\n",
        run.actor, run.event, run.head_branch, run.name, num
    );
    let repo = link(&run.repository.html_url, &run.repository.full_name);
    [
        Block::section(text),
        Block::Context {
            elements: vec![
                ContextElement::Image {
                    image_url: GITHUB_ICON_URL.to_string(),
                    alt_text: "GitHub".to_string(),
                },
                ContextElement::Mrkdwn { text: format!("*{repo}*") },
            ],
        },
    ]
}

fn annotation_blocks(annotations: &[Annotation]) -> impl Iterator<Item = Block> + '_ {
    annotations.iter().flat_map(|a| {
        [
            Block::Divider,
            Block::section(format!("*{}: L{}~L{}*", a.path, a.start_line, a.end_line)),
            Block::section(code_block(a.message.as_deref().unwrap_or_default())),
        ]
    })
}

fn step_log_blocks(logs: &[StepLog]) -> impl Iterator<Item = Block> + '_ {
    logs.iter().flat_map(|log| {
        [
            Block::Divider,
            Block::section(format!("Step: `{}`", log.step_name)),
            Block::section(code_block(&log.log)),
        ]
    })
}

/// Flat block list of the attachment: one job header followed by its evidence, per job.
pub fn generate_attachment_blocks(summary: &[JobSummary]) -> Vec<Block> {
    let mut blocks = Vec::new();
    for JobSummary { job, evidence } in summary {
        let conclusion = job.conclusion.map(|c| c.as_str()).unwrap_or_default();
        let html_url = job.html_url.as_deref().unwrap_or_default();
        blocks.push(Block::section(format!("Job: {} {}", link(html_url, &job.name), conclusion)));
        match evidence {
            Evidence::Annotations(annotations) => blocks.extend(annotation_blocks(annotations)),
            Evidence::Logs(logs) => blocks.extend(step_log_blocks(logs)),
        }
    }
    blocks
}

pub fn generate_message(run: &WorkflowRun, summary: &[JobSummary]) -> Message {
    Message {
        blocks: generate_header_blocks(run).into(),
        attachments: vec![Attachment {
            color: ATTACHMENT_COLOR.to_string(),
            blocks: generate_attachment_blocks(summary),
        }],
    }
}
