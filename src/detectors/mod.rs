//! Threshold detectors over the stored prediction and document history.
//!
//! Both detectors start from the most recent prediction batch, narrow the
//! candidates by a probability cut, then confirm each candidate against its
//! own history before dressing the flagged entries with report details.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::data_model::WorkflowDocument;

pub mod site;
pub mod workflow;

pub use site::SiteIssueDetector;
pub use workflow::WorkflowIssueDetector;

/// Per-candidate confirmation checks run concurrently under this deadline.
pub(crate) const FLAG_TIMEOUT: Duration = Duration::from_secs(300);

/// Error counts grouped code -> site from one report.
pub(crate) fn sitecnt_percode(doc: &WorkflowDocument) -> BTreeMap<i64, BTreeMap<String, i64>> {
    let mut out: BTreeMap<i64, BTreeMap<String, i64>> = BTreeMap::new();
    for task in &doc.tasks {
        for err in &task.errors {
            *out.entry(err.error_code)
                .or_default()
                .entry(err.site_name.clone())
                .or_insert(0) += err.counts;
        }
    }
    out
}

/// Error counts grouped site -> code from one report.
pub(crate) fn codecnt_persite(doc: &WorkflowDocument) -> BTreeMap<String, BTreeMap<i64, i64>> {
    let mut out: BTreeMap<String, BTreeMap<i64, i64>> = BTreeMap::new();
    for task in &doc.tasks {
        for err in &task.errors {
            *out.entry(err.site_name.clone())
                .or_default()
                .entry(err.error_code)
                .or_insert(0) += err.counts;
        }
    }
    out
}

/// Total error count per site from one report's siteErrors.
pub(crate) fn site_errors_of(doc: &WorkflowDocument) -> BTreeMap<String, i64> {
    let mut out: BTreeMap<String, i64> = BTreeMap::new();
    for task in &doc.tasks {
        for se in &task.site_errors {
            *out.entry(se.site.clone()).or_insert(0) += se.counts;
        }
    }
    out
}

/// Index of the largest probability; the first maximum wins on ties.
pub(crate) fn argmax(probs: &[f64; 3]) -> usize {
    let mut best = 0;
    for (i, p) in probs.iter().enumerate().skip(1) {
        if *p > probs[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::{SiteErrorCount, TaskDocument, TaskErrorEntry};

    #[test]
    fn argmax_first_maximum_wins() {
        assert_eq!(argmax(&[0.5, 0.5, 0.0]), 0);
        assert_eq!(argmax(&[0.1, 0.2, 0.7]), 2);
        assert_eq!(argmax(&[0.0, 0.6, 0.6]), 1);
    }

    #[test]
    fn groupings_sum_across_tasks() {
        let doc = WorkflowDocument {
            tasks: vec![
                TaskDocument {
                    errors: vec![TaskErrorEntry {
                        error_code: 8021,
                        site_name: "T2_US_MIT".to_string(),
                        counts: 5,
                        ..TaskErrorEntry::default()
                    }],
                    site_errors: vec![SiteErrorCount {
                        site: "T2_US_MIT".to_string(),
                        counts: 5,
                    }],
                    ..TaskDocument::default()
                },
                TaskDocument {
                    errors: vec![TaskErrorEntry {
                        error_code: 8021,
                        site_name: "T2_US_MIT".to_string(),
                        counts: 3,
                        ..TaskErrorEntry::default()
                    }],
                    site_errors: vec![SiteErrorCount {
                        site: "T2_US_MIT".to_string(),
                        counts: 3,
                    }],
                    ..TaskDocument::default()
                },
            ],
            ..WorkflowDocument::default()
        };

        assert_eq!(sitecnt_percode(&doc)[&8021]["T2_US_MIT"], 8);
        assert_eq!(codecnt_persite(&doc)["T2_US_MIT"][&8021], 8);
        assert_eq!(site_errors_of(&doc)["T2_US_MIT"], 8);
    }
}
