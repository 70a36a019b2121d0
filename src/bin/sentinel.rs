// src/bin/sentinel.rs

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use workflowmonit::config::load_monit_config;
use workflowmonit::data_model::{SiteIssue, WorkflowIssue};
use workflowmonit::error::{MonitError, Result};
use workflowmonit::escalation::{EscalationPolicy, JiraStore};

/// Issue sentinel: pulls the monitor's workflow and site issue feeds and
/// escalates every finding to the ticket tracker.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the monitor configuration YAML file.
    #[arg(short = 'c', long, default_value = "config/config.yml")]
    config: PathBuf,

    /// Base URL of the running monitor.
    #[arg(long, default_value = "http://localhost:8020")]
    monitor_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(filter).init();

    let config = load_monit_config(&args.config)?;
    let ticket = config
        .ticket
        .ok_or_else(|| MonitError::ConfigError("missing `ticket` section".to_string()))?;

    // Detection can take a while on the monitor side.
    let client = reqwest::Client::builder()
        .user_agent("workflowmonit-sentinel")
        .timeout(Duration::from_secs(480))
        .build()?;

    let workflows: Vec<WorkflowIssue> = client
        .get(format!("{}/issues/workflow", args.monitor_url))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let sites: Vec<SiteIssue> = client
        .get(format!("{}/issues/site", args.monitor_url))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    info!(
        workflows = workflows.len(),
        sites = sites.len(),
        "issue feeds fetched"
    );

    let store = JiraStore::new(ticket)?;
    let policy = EscalationPolicy::new(&store, args.monitor_url.clone());
    policy.escalate_workflows(&workflows).await?;
    policy.escalate_sites(&sites).await?;

    info!("escalation pass complete");
    Ok(())
}
