// src/bin/monitor.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use workflowmonit::classifier::ThresholdClassifier;
use workflowmonit::config::load_monit_config;
use workflowmonit::cycle::{run_forever, MonitorCycle};
use workflowmonit::detectors::{SiteIssueDetector, WorkflowIssueDetector};
use workflowmonit::error::Result;
use workflowmonit::publisher::DocumentPublisher;
use workflowmonit::server::{run_server, AppState};
use workflowmonit::storage::{DocumentStore, MemoryStore, PredictionStore};
use workflowmonit::telemetry::HttpTelemetry;

/// Workflow error monitor: polls running workflows, builds error documents,
/// scores them and serves the results over HTTP.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the monitor configuration YAML file.
    #[arg(short = 'c', long, default_value = "config/config.yml")]
    config: PathBuf,

    /// Minutes between two monitoring cycles.
    #[arg(long, default_value_t = 50)]
    interval_mins: u64,

    /// Run a single cycle and exit instead of looping.
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Write logs to a daily-rolled file in this directory instead of stderr.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // The guard flushes buffered log lines on shutdown.
    let _guard = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "monitor.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            fmt::Subscriber::builder().with_env_filter(filter).init();
            None
        }
    };

    let config = load_monit_config(&args.config)?;
    info!(config = %args.config.display(), "configuration loaded");

    let source = Arc::new(HttpTelemetry::new(
        config.wmstats_url.clone(),
        config.workflow_list_url.clone(),
    )?);
    let store = MemoryStore::new();
    let docs: Arc<dyn DocumentStore> = store.clone();
    let preds: Arc<dyn PredictionStore> = store.clone();

    let publisher = match &config.amqp {
        Some(amqp) => Some(DocumentPublisher::connect(amqp.clone()).await?),
        None => None,
    };

    let state = AppState {
        docs: Arc::clone(&docs),
        preds: Arc::clone(&preds),
        workflow_issues: Arc::new(WorkflowIssueDetector::new(
            Arc::clone(&docs),
            Arc::clone(&preds),
            config.workflow_issue.clone(),
        )),
        site_issues: Arc::new(SiteIssueDetector::new(
            Arc::clone(&docs),
            Arc::clone(&preds),
            config.site_issue.clone(),
        )),
    };
    let port = config.server_port;
    tokio::spawn(async move {
        if let Err(e) = run_server(state, port).await {
            error!(error = %e, "HTTP server exited");
        }
    });

    let cycle = MonitorCycle::new(
        source,
        docs,
        preds,
        store.clone(),
        Arc::new(ThresholdClassifier::default()),
        publisher,
        config,
    );

    if args.once {
        cycle.run_once().await?;
        return Ok(());
    }

    run_forever(cycle, Duration::from_secs(args.interval_mins * 60)).await;
    Ok(())
}
