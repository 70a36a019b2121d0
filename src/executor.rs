use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::Result;
use crate::utils::metrics;

/// One per-item job of a fan-out batch. Implementations are pure with
/// respect to shared state: each run computes a result keyed only by its
/// input item, and results are merged by the collecting task.
#[async_trait]
pub trait BatchJob: Send + Sync + 'static {
    type Item: Send + 'static;
    type Output: Send + 'static;

    /// Identity of an item, for logging dropped failures.
    fn identity(item: &Self::Item) -> String;

    async fn run(&self, item: Self::Item) -> Result<Self::Output>;
}

/// Bounded concurrent map over a batch of independent jobs.
///
/// Every item is spawned as its own task, gated by a semaphore (full
/// parallelism unless a worker cap is set). Failures and panics are logged
/// with the item identity and omitted from the results; when the batch
/// timeout elapses, still-pending jobs are abandoned and the results
/// collected so far are returned. One job's failure never aborts the batch.
#[derive(Debug, Clone)]
pub struct FanOutExecutor {
    timeout: Duration,
    max_workers: Option<usize>,
}

impl FanOutExecutor {
    pub fn new(timeout: Duration) -> Self {
        FanOutExecutor {
            timeout,
            max_workers: None,
        }
    }

    /// Caps the number of concurrently running jobs. Required for large
    /// batches (site-issue evaluation, label making) to bound resource use.
    pub fn with_max_workers(timeout: Duration, max_workers: usize) -> Self {
        FanOutExecutor {
            timeout,
            max_workers: Some(max_workers),
        }
    }

    pub async fn run_batch<J: BatchJob>(&self, job: Arc<J>, items: Vec<J::Item>) -> Vec<J::Output> {
        if items.is_empty() {
            return Vec::new();
        }

        let workers = self.max_workers.unwrap_or(items.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(workers));

        let mut in_flight = FuturesUnordered::new();
        for item in items {
            let identity = J::identity(&item);
            let job = Arc::clone(&job);
            let semaphore = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                job.run(item).await
            });
            in_flight.push(async move { (identity, handle.await) });
        }

        let mut results = Vec::new();
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    // Abandoned jobs may still complete; they are simply not
                    // awaited further.
                    warn!(
                        pending = in_flight.len(),
                        collected = results.len(),
                        "batch timeout elapsed, returning partial results"
                    );
                    metrics::BATCH_TIMEOUTS_TOTAL.inc();
                    break;
                }
                next = in_flight.next() => {
                    let Some((identity, joined)) = next else {
                        break;
                    };
                    match joined {
                        Ok(Ok(output)) => results.push(output),
                        Ok(Err(e)) => {
                            warn!(item = %identity, error = %e, "batch job failed, dropped from results");
                            metrics::BATCH_ITEM_FAILURES_TOTAL.inc();
                        }
                        Err(join_err) => {
                            warn!(item = %identity, error = %join_err, "batch job panicked, dropped from results");
                            metrics::BATCH_ITEM_FAILURES_TOTAL.inc();
                        }
                    }
                }
            }
        }

        debug!(collected = results.len(), "batch finished");
        results
    }
}
