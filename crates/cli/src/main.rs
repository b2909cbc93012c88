mod actions;
mod context;

use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Result;
use argp::FromArgs;
use failed_log_core::config::Config;
use failed_log_github::GitHub;
use failed_log_notify::{NotifyRequest, Outcome, notify_failed_jobs};
use failed_log_slack::{DeliveryResult, Message, MessageSink, SlackWebhook};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::context::TriggerContext;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Send the failed jobs of a GitHub Actions workflow run to a Slack webhook.
struct Args {
    #[argp(option, short = 'c')]
    /// YAML config file (environment variables override its values)
    config: Option<PathBuf>,
    #[argp(option)]
    /// workflow run ID (default: taken from the Actions environment)
    run_id: Option<u64>,
    #[argp(option)]
    /// triggering event name (default: GITHUB_EVENT_NAME)
    event: Option<String>,
    #[argp(switch)]
    /// print the Slack payload instead of sending it
    dry_run: bool,
}

/// Prints the payload to stdout instead of delivering it.
struct PrintSink;

impl MessageSink for PrintSink {
    async fn deliver(&self, message: &Message) -> Result<DeliveryResult> {
        println!("{}", serde_json::to_string_pretty(message)?);
        Ok(DeliveryResult { text: "dry run".to_string() })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // RUNNER_DEBUG is set when a workflow is re-run with debug logging enabled
    let default_level = if std::env::var("RUNNER_DEBUG").is_ok_and(|v| v == "1") {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter =
        EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let args: Args = argp::parse_args_or_exit(argp::DEFAULT);
    match run(args).await {
        Ok(Outcome::NoFailedJobs) => ExitCode::SUCCESS,
        Ok(outcome @ Outcome::Delivered(_)) => {
            tracing::info!("{outcome}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e:?}");
            actions::set_failed(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<Outcome> {
    let config = Config::load(args.config.as_deref())?;
    actions::add_mask(&config.github.token);
    actions::add_mask(&config.slack.webhook_url);

    let trigger =
        TriggerContext::resolve(|key| std::env::var(key).ok(), args.event, args.run_id)?;
    let request = NotifyRequest {
        run_id: trigger.run_id,
        event: trigger.event,
        log_dir: config.logs.dir.clone(),
        concurrency: config.summary.concurrency,
    };
    let github = GitHub::new(&config.github)?;

    if args.dry_run {
        notify_failed_jobs(&github, &PrintSink, &request).await
    } else {
        let webhook = SlackWebhook::new(
            config.slack.webhook_url.clone(),
            Duration::from_secs(config.slack.timeout_secs),
        )?;
        notify_failed_jobs(&github, &webhook, &request).await
    }
}
