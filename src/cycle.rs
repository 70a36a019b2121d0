use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tracing::{error, info, warn};

use crate::classifier::Classifier;
use crate::config::MonitConfig;
use crate::data_model::{PredictionRecord, WorkflowDocument};
use crate::error::Result;
use crate::executor::{BatchJob, FanOutExecutor};
use crate::pipeline::condenser::LogCondenser;
use crate::pipeline::document::DocumentBuilder;
use crate::pipeline::features;
use crate::pipeline::labels::update_label_archives;
use crate::publisher::DocumentPublisher;
use crate::storage::{DocumentStore, LabelStore, PredictionStore};
use crate::telemetry::{TelemetrySource, WorkflowHandle};
use crate::utils::common::unix_now;
use crate::utils::metrics;

/// One full monitoring pass: poll every running workflow, build and persist
/// its error document, publish, predict and label.
pub struct MonitorCycle {
    source: Arc<dyn TelemetrySource>,
    docs: Arc<dyn DocumentStore>,
    preds: Arc<dyn PredictionStore>,
    labels: Arc<dyn LabelStore>,
    classifier: Arc<dyn Classifier>,
    publisher: Option<DocumentPublisher>,
    builder: Arc<DocumentBuilder>,
    config: MonitConfig,
}

struct DocumentBuildJob {
    source: Arc<dyn TelemetrySource>,
    builder: Arc<DocumentBuilder>,
    min_failure_rate: f64,
}

#[async_trait]
impl BatchJob for DocumentBuildJob {
    type Item = String;
    type Output = WorkflowDocument;

    fn identity(item: &Self::Item) -> String {
        item.clone()
    }

    async fn run(&self, name: String) -> Result<WorkflowDocument> {
        // Small jitter spreads the burst of requests a batch start causes.
        let jitter = { rand::thread_rng().gen_range(0..100) };
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        let handle = WorkflowHandle::new(name, Arc::clone(&self.source));
        let failure_rate = handle.failure_rate().await?;
        if failure_rate > self.min_failure_rate {
            return self.builder.build(&handle).await;
        }

        // Below the rate gate only the status row is kept, so archived
        // workflows still drop out of future polling.
        let detail = handle.request_detail().await?;
        Ok(WorkflowDocument {
            name: handle.name().to_string(),
            status: detail.status.clone(),
            wf_type: detail.wf_type.clone(),
            failure_rate,
            ..WorkflowDocument::default()
        })
    }
}

impl MonitorCycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        docs: Arc<dyn DocumentStore>,
        preds: Arc<dyn PredictionStore>,
        labels: Arc<dyn LabelStore>,
        classifier: Arc<dyn Classifier>,
        publisher: Option<DocumentPublisher>,
        config: MonitConfig,
    ) -> Self {
        MonitorCycle {
            source,
            docs,
            preds,
            labels,
            classifier,
            publisher,
            builder: Arc::new(DocumentBuilder::new(LogCondenser::new(
                config.condenser.clone(),
            ))),
            config,
        }
    }

    /// Runs one complete cycle. Batch-level failures are isolated: a batch
    /// that errors is reported and skipped while the cycle continues.
    pub async fn run_once(&self) -> Result<()> {
        let started = Instant::now();

        let batches = self.prepare_batches().await?;
        let timestamp = unix_now();

        let mut total_docs: Vec<WorkflowDocument> = Vec::new();
        let executor = FanOutExecutor::new(Duration::from_secs(
            self.config.cycle.batch_timeout_secs,
        ));

        for (i, batch) in batches.into_iter().enumerate() {
            match self.process_batch(&executor, batch, timestamp).await {
                Ok(mut docs) => total_docs.append(&mut docs),
                Err(e) => {
                    error!(batch = i, error = %e, "batch failed, notifying operators");
                    metrics::OPERATOR_NOTIFICATIONS_TOTAL.inc();
                }
            }
        }
        info!(count = total_docs.len(), "workflow documents updated");
        metrics::DOCS_BUILT_TOTAL.inc_by(total_docs.len() as f64);

        self.make_predictions(&total_docs, timestamp).await?;
        self.label_archived().await?;

        metrics::CYCLES_TOTAL.inc();
        metrics::CYCLE_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());
        Ok(())
    }

    /// Running workflows minus those already archived, sliced into batches.
    async fn prepare_batches(&self) -> Result<Vec<Vec<String>>> {
        let running = self.source.running_workflows().await?;
        let statuses = self.docs.workflow_statuses().await?;

        let pending: Vec<String> = running
            .into_iter()
            .filter(|name| {
                statuses
                    .get(name)
                    .map(|status| !status.ends_with("archived"))
                    .unwrap_or(true)
            })
            .collect();
        metrics::RUNNING_WORKFLOWS.set(pending.len() as f64);

        let batch_size = self.config.cycle.batch_size;
        let batches: Vec<Vec<String>> = pending
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        info!(
            batches = batches.len(),
            batch_size, "workflows prepared for polling"
        );
        Ok(batches)
    }

    async fn process_batch(
        &self,
        executor: &FanOutExecutor,
        batch: Vec<String>,
        timestamp: i64,
    ) -> Result<Vec<WorkflowDocument>> {
        let job = Arc::new(DocumentBuildJob {
            source: Arc::clone(&self.source),
            builder: Arc::clone(&self.builder),
            min_failure_rate: self.config.cycle.min_failure_rate,
        });
        let docs = executor.run_batch(job, batch).await;

        self.docs.insert_documents(&docs, timestamp).await?;

        if let Some(publisher) = &self.publisher {
            let failures = publisher.publish(&docs).await?;
            if !failures.is_empty() {
                warn!(count = failures.len(), "documents failed to publish");
            }
        }

        Ok(docs)
    }

    /// Scores every updated document and appends the prediction records.
    async fn make_predictions(&self, docs: &[WorkflowDocument], timestamp: i64) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        info!(count = docs.len(), "making predictions");

        let now = unix_now();
        let records: Vec<PredictionRecord> = docs
            .iter()
            .map(|doc| {
                let row = features::extract(doc, now);
                let probs = self.classifier.score(&row);
                PredictionRecord {
                    name: doc.name.clone(),
                    good: round6(probs[0]),
                    acdc: round6(probs[1]),
                    resubmit: round6(probs[2]),
                    timestamp,
                }
            })
            .collect();

        self.preds.insert_predictions(&records).await?;
        metrics::PREDICTIONS_TOTAL.inc_by(records.len() as f64);
        Ok(())
    }

    /// Labels freshly archived workflows that have no label yet.
    async fn label_archived(&self) -> Result<()> {
        let statuses = self.docs.workflow_statuses().await?;
        let archived: Vec<String> = statuses
            .into_iter()
            .filter(|(_, status)| status.ends_with("archived"))
            .map(|(name, _)| name)
            .collect();
        if archived.is_empty() {
            return Ok(());
        }

        let executor = FanOutExecutor::with_max_workers(
            Duration::from_secs(self.config.cycle.batch_timeout_secs),
            self.config.cycle.label_max_workers,
        );
        let labeled = update_label_archives(
            Arc::clone(&self.source),
            self.labels.as_ref(),
            &executor,
            &archived,
        )
        .await?;
        info!(count = labeled, "labels updated");
        Ok(())
    }
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Runs cycles forever at the given interval, counting failures instead of
/// exiting on them.
pub async fn run_forever(cycle: MonitorCycle, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = cycle.run_once().await {
            error!(error = %e, "monitoring cycle failed");
            metrics::CYCLE_FAILURES_TOTAL.inc();
        }
    }
}
