use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::WorkflowIssueSettings;
use crate::data_model::{PredictionRecord, WorkflowIssue};
use crate::detectors::{argmax, sitecnt_percode, FLAG_TIMEOUT};
use crate::error::{MonitError, Result};
use crate::executor::{BatchJob, FanOutExecutor};
use crate::storage::{DocumentStore, PredictionStore};

const DAY_SECS: i64 = 86_400;

/// Flags long-running workflows the predictor keeps ranking as resubmission
/// candidates and whose latest report confirms heavy failure.
pub struct WorkflowIssueDetector {
    docs: Arc<dyn DocumentStore>,
    preds: Arc<dyn PredictionStore>,
    settings: WorkflowIssueSettings,
}

struct FlagJob {
    detector: WorkflowIssueDetector,
}

#[async_trait]
impl BatchJob for FlagJob {
    type Item = String;
    type Output = Option<WorkflowIssue>;

    fn identity(item: &Self::Item) -> String {
        item.clone()
    }

    async fn run(&self, workflow: String) -> Result<Option<WorkflowIssue>> {
        if !self.detector.is_flagged(&workflow).await? {
            return Ok(None);
        }
        self.detector.dress(&workflow).await.map(Some)
    }
}

impl Clone for WorkflowIssueDetector {
    fn clone(&self) -> Self {
        WorkflowIssueDetector {
            docs: Arc::clone(&self.docs),
            preds: Arc::clone(&self.preds),
            settings: self.settings.clone(),
        }
    }
}

impl WorkflowIssueDetector {
    pub fn new(
        docs: Arc<dyn DocumentStore>,
        preds: Arc<dyn PredictionStore>,
        settings: WorkflowIssueSettings,
    ) -> Self {
        WorkflowIssueDetector {
            docs,
            preds,
            settings,
        }
    }

    /// All currently flagged workflows, dressed for reporting.
    pub async fn detect(&self) -> Result<Vec<WorkflowIssue>> {
        let candidates: Vec<String> = self
            .preds
            .latest_predictions()
            .await?
            .into_iter()
            .filter(|r| r.resubmit > self.settings.resubmit_prob)
            .map(|r| r.name)
            .collect();
        debug!(count = candidates.len(), "workflow-issue candidates");
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let executor = FanOutExecutor::new(FLAG_TIMEOUT);
        let job = Arc::new(FlagJob {
            detector: self.clone(),
        });
        let mut issues: Vec<WorkflowIssue> = executor
            .run_batch(job, candidates)
            .await
            .into_iter()
            .flatten()
            .collect();
        issues.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(issues)
    }

    /// Confirmation checks against the candidate's own history:
    /// 1. observed for at least `running_days`,
    /// 2. resubmit ranked first in at least `resubmit_top_frac` of the
    ///    predictions inside that window,
    /// 3. latest report shows at least `total_error` failures,
    /// 4. and a failure rate of at least `failure_rate`.
    async fn is_flagged(&self, workflow: &str) -> Result<bool> {
        let history = self.preds.prediction_history(workflow).await?;
        let Some(period) = running_period_secs(&history) else {
            return Ok(false);
        };
        if period < self.settings.running_days as i64 * DAY_SECS {
            return Ok(false);
        }

        let window = self.settings.running_days as i64 * DAY_SECS;
        if first_rank_fraction(&history, 2, window) < self.settings.resubmit_top_frac {
            return Ok(false);
        }

        let doc = self
            .docs
            .latest_document(workflow)
            .await?
            .ok_or_else(|| MonitError::StorageError(format!("no document history for {workflow}")))?;
        Ok(doc.total_error >= self.settings.total_error && doc.failure_rate >= self.settings.failure_rate)
    }

    async fn dress(&self, workflow: &str) -> Result<WorkflowIssue> {
        let history = self.preds.prediction_history(workflow).await?;
        let last = history
            .last()
            .ok_or_else(|| MonitError::StorageError(format!("no prediction history for {workflow}")))?;
        let doc = self
            .docs
            .latest_document(workflow)
            .await?
            .ok_or_else(|| MonitError::StorageError(format!("no document history for {workflow}")))?;

        Ok(WorkflowIssue {
            name: workflow.to_string(),
            running_time: running_period_secs(&history).unwrap_or(0) as f64 / 3600.0,
            prob_prediction_last: [last.good, last.acdc, last.resubmit],
            prob_firstrank_pastday: [
                first_rank_fraction(&history, 0, DAY_SECS),
                first_rank_fraction(&history, 1, DAY_SECS),
                first_rank_fraction(&history, 2, DAY_SECS),
            ],
            total_error: doc.total_error,
            failure_rate: doc.failure_rate,
            errorcnt_percode: sitecnt_percode(&doc),
        })
    }
}

fn running_period_secs(history: &[PredictionRecord]) -> Option<i64> {
    let first = history.first()?;
    let last = history.last()?;
    Some(last.timestamp - first.timestamp)
}

/// Fraction of predictions inside the trailing window whose top-ranked class
/// is `class_index`. History must be ascending by timestamp.
fn first_rank_fraction(history: &[PredictionRecord], class_index: usize, window_secs: i64) -> f64 {
    let Some(last) = history.last() else {
        return 0.0;
    };
    let cutoff = last.timestamp - window_secs;
    let in_window: Vec<&PredictionRecord> =
        history.iter().filter(|r| r.timestamp > cutoff).collect();
    if in_window.is_empty() {
        return 0.0;
    }
    let hits = in_window
        .iter()
        .filter(|r| argmax(&[r.good, r.acdc, r.resubmit]) == class_index)
        .count();
    hits as f64 / in_window.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: i64, good: f64, acdc: f64, resubmit: f64) -> PredictionRecord {
        PredictionRecord {
            name: "wf".to_string(),
            good,
            acdc,
            resubmit,
            timestamp: ts,
        }
    }

    #[test]
    fn fraction_counts_only_the_trailing_window() {
        let history = vec![
            record(0, 0.9, 0.05, 0.05),
            record(80_000, 0.1, 0.1, 0.8),
            record(86_400 * 2, 0.1, 0.1, 0.8),
            record(86_400 * 2 + 100, 0.8, 0.1, 0.1),
        ];
        // Window of one day covers the last two records only.
        assert_eq!(first_rank_fraction(&history, 2, DAY_SECS), 0.5);
        assert_eq!(first_rank_fraction(&history, 0, DAY_SECS), 0.5);
    }

    #[test]
    fn empty_history_has_no_period() {
        assert_eq!(running_period_secs(&[]), None);
        assert_eq!(first_rank_fraction(&[], 2, DAY_SECS), 0.0);
    }
}
