use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::SiteIssueSettings;
use crate::data_model::{SiteIssue, WorkflowDocument};
use crate::detectors::{codecnt_persite, site_errors_of, FLAG_TIMEOUT};
use crate::error::Result;
use crate::executor::{BatchJob, FanOutExecutor};
use crate::storage::{DocumentStore, PredictionStore};

const HOUR_SECS: i64 = 3_600;

/// Flags sites whose error counts grew sharply across the recent ACDC
/// candidates: for each candidate workflow the per-site error delta over the
/// configured window is computed, deltas are summed per site, and sites
/// above the increase threshold are dressed with the per-workflow breakdown.
pub struct SiteIssueDetector {
    docs: Arc<dyn DocumentStore>,
    preds: Arc<dyn PredictionStore>,
    settings: SiteIssueSettings,
}

struct DeltaJob {
    detector: SiteIssueDetector,
}

#[async_trait]
impl BatchJob for DeltaJob {
    type Item = String;
    type Output = BTreeMap<String, i64>;

    fn identity(item: &Self::Item) -> String {
        item.clone()
    }

    async fn run(&self, workflow: String) -> Result<BTreeMap<String, i64>> {
        self.detector.site_error_increase(&workflow).await
    }
}

impl Clone for SiteIssueDetector {
    fn clone(&self) -> Self {
        SiteIssueDetector {
            docs: Arc::clone(&self.docs),
            preds: Arc::clone(&self.preds),
            settings: self.settings.clone(),
        }
    }
}

impl SiteIssueDetector {
    pub fn new(
        docs: Arc<dyn DocumentStore>,
        preds: Arc<dyn PredictionStore>,
        settings: SiteIssueSettings,
    ) -> Self {
        SiteIssueDetector {
            docs,
            preds,
            settings,
        }
    }

    pub async fn detect(&self) -> Result<Vec<SiteIssue>> {
        let candidates: Vec<String> = self
            .preds
            .latest_predictions()
            .await?
            .into_iter()
            .filter(|r| r.acdc > self.settings.acdc_prob)
            .map(|r| r.name)
            .collect();
        debug!(count = candidates.len(), "site-issue candidates");
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let executor =
            FanOutExecutor::with_max_workers(FLAG_TIMEOUT, self.settings.max_workers);
        let job = Arc::new(DeltaJob {
            detector: self.clone(),
        });
        let increases = executor.run_batch(job, candidates).await;

        let mut per_site: BTreeMap<String, i64> = BTreeMap::new();
        for delta in increases {
            for (site, inc) in delta {
                *per_site.entry(site).or_insert(0) += inc;
            }
        }

        let latest_docs = self.docs.latest_documents().await?;
        let mut issues = Vec::new();
        for (site, errorinc) in per_site {
            if errorinc > self.settings.error_count_inc {
                issues.push(dress_site_issue(&site, errorinc, &latest_docs));
            }
        }
        Ok(issues)
    }

    /// Per-site error delta of one workflow over the configured window.
    /// Workflows observed for less than the window contribute nothing.
    async fn site_error_increase(&self, workflow: &str) -> Result<BTreeMap<String, i64>> {
        let pred_history = self.preds.prediction_history(workflow).await?;
        let observed = match (pred_history.first(), pred_history.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0,
        };
        if observed < self.settings.running_hours as i64 * HOUR_SECS {
            return Ok(BTreeMap::new());
        }

        let history = self.docs.document_history(workflow).await?;
        let Some((_, present)) = history.last() else {
            return Ok(BTreeMap::new());
        };
        let Some(latest_ts) = self.docs.latest_timestamp().await? else {
            return Ok(BTreeMap::new());
        };

        // Past report: the one written closest to latest - window, the
        // first on ties.
        let target = latest_ts - self.settings.running_hours as i64 * HOUR_SECS;
        let Some((_, past)) = history
            .iter()
            .min_by_key(|(ts, _)| (ts - target).abs())
        else {
            return Ok(BTreeMap::new());
        };

        Ok(site_error_delta(past, present))
    }
}

/// Present-minus-past error counts per site. Sites present only in the past
/// report show up negative, recording the recovery.
pub fn site_error_delta(
    past: &WorkflowDocument,
    present: &WorkflowDocument,
) -> BTreeMap<String, i64> {
    let cnt_past = site_errors_of(past);
    let cnt_present = site_errors_of(present);

    let mut delta = BTreeMap::new();
    for (site, count) in &cnt_present {
        delta.insert(site.clone(), count - cnt_past.get(site).copied().unwrap_or(0));
    }
    for (site, count) in &cnt_past {
        if !cnt_present.contains_key(site) {
            delta.insert(site.clone(), -count);
        }
    }
    delta
}

fn dress_site_issue(site: &str, errorinc: i64, latest_docs: &[WorkflowDocument]) -> SiteIssue {
    let mut errorcnt_perworkflow: BTreeMap<String, BTreeMap<i64, i64>> = BTreeMap::new();
    for doc in latest_docs {
        if let Some(codes) = codecnt_persite(doc).remove(site) {
            errorcnt_perworkflow.insert(doc.name.clone(), codes);
        }
    }

    let mut total_errorcodes: Vec<i64> = Vec::new();
    let mut total_errorcnts: i64 = 0;
    for codes in errorcnt_perworkflow.values() {
        for (code, count) in codes {
            total_errorcnts += count;
            if !total_errorcodes.contains(code) {
                total_errorcodes.push(*code);
            }
        }
    }

    SiteIssue {
        site: site.to_string(),
        errorinc,
        errorcnt_perworkflow,
        total_errorcodes,
        total_errorcnts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::{SiteErrorCount, TaskDocument};

    fn doc_with_sites(counts: &[(&str, i64)]) -> WorkflowDocument {
        WorkflowDocument {
            tasks: vec![TaskDocument {
                site_errors: counts
                    .iter()
                    .map(|(site, c)| SiteErrorCount {
                        site: site.to_string(),
                        counts: *c,
                    })
                    .collect(),
                ..TaskDocument::default()
            }],
            ..WorkflowDocument::default()
        }
    }

    #[test]
    fn delta_is_present_minus_past() {
        let past = doc_with_sites(&[("T1_A", 10)]);
        let present = doc_with_sites(&[("T1_A", 15), ("T2_B", 5)]);
        let delta = site_error_delta(&past, &present);
        assert_eq!(delta["T1_A"], 5);
        assert_eq!(delta["T2_B"], 5);
    }

    #[test]
    fn vanished_site_counts_as_recovery() {
        let past = doc_with_sites(&[("T1_A", 10)]);
        let present = doc_with_sites(&[]);
        let delta = site_error_delta(&past, &present);
        assert_eq!(delta["T1_A"], -10);
    }
}
