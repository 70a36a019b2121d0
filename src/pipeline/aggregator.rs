use std::collections::BTreeMap;

use crate::data_model::{ErrorChainLink, ErrorSample, TaskErrorEntry};
use crate::pipeline::condenser::LogCondenser;
use crate::telemetry::{CodeSiteErrors, FlatErrorCounts, JobDetail, NOT_REPORTED};
use crate::utils::common::task_basename;

/// Condensed log samples keyed by task -> errorCode -> site.
pub type SampleTree = BTreeMap<String, BTreeMap<i64, BTreeMap<String, Vec<ErrorSample>>>>;

/// Per-task merge result: the flat summary rows (enriched where samples
/// exist) plus the sites that never reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskErrorSummary {
    pub errors: Vec<TaskErrorEntry>,
    pub site_not_reported: Vec<String>,
}

/// Merges a workflow's nested job-failure tree with its flat error-count
/// summary into one per-task, per-site, per-error-code structure.
#[derive(Debug, Clone, Default)]
pub struct ErrorAggregator {
    condenser: LogCondenser,
}

impl ErrorAggregator {
    pub fn new(condenser: LogCondenser) -> Self {
        ErrorAggregator { condenser }
    }

    /// Walks the nested job-failure tree and condenses every log sample
    /// into an [`ErrorSample`]: one per (task, errorCode, site, sample),
    /// combining all unique error cells of that sample.
    pub fn error_logs(&self, jobdetail: &JobDetail) -> SampleTree {
        let mut tree: SampleTree = BTreeMap::new();

        for (full_task, step) in jobdetail {
            let task = task_basename(full_task);

            for status_errors in [&step.jobfailed, &step.submitfailed] {
                self.collect_status_errors(&mut tree, task, status_errors);
            }
        }

        tree
    }

    fn collect_status_errors(
        &self,
        tree: &mut SampleTree,
        task: &str,
        status_errors: &CodeSiteErrors,
    ) {
        for (code_str, sites) in status_errors {
            if code_str == "0" {
                continue;
            }
            // A non-numeric code is a malformed payload; treat as no data.
            let Ok(error_code) = code_str.parse::<i64>() else {
                continue;
            };

            for (site, detail) in sites {
                let samples: Vec<ErrorSample> = detail
                    .samples
                    .iter()
                    .map(|sample| {
                        // Flatten all category cells, then drop exact
                        // structural duplicates preserving order.
                        let mut unique_cells = Vec::new();
                        for cell in sample.errors.values().flatten() {
                            if !unique_cells.contains(&cell) {
                                unique_cells.push(cell);
                            }
                        }

                        let mut condensed = ErrorSample {
                            timestamp: sample.timestamp,
                            ..ErrorSample::default()
                        };
                        for cell in unique_cells {
                            let shortdetail = self.condenser.shorten(&cell.details);

                            if cell.exit_code != error_code {
                                condensed.secondary_error_codes.insert(cell.exit_code);
                            }
                            condensed.error_keywords.extend(
                                self.condenser
                                    .keywords(&format!("{} {}", cell.error_type, shortdetail)),
                            );
                            condensed.error_chain.push(ErrorChainLink {
                                error_type: cell.error_type.clone(),
                                exit_code: cell.exit_code,
                                description: shortdetail,
                            });
                        }
                        condensed
                    })
                    .collect();

                tree.entry(task.to_string())
                    .or_default()
                    .entry(error_code)
                    .or_default()
                    .insert(site.clone(), samples);
            }
        }
    }

    /// Turns the flat error-count summary into per-task rows. The flat
    /// summary is authoritative for existence: zero-count rows are never
    /// emitted, and the `NotReported` pseudo-code becomes the
    /// `site_not_reported` list.
    pub fn error_summary(flat: &FlatErrorCounts) -> BTreeMap<String, TaskErrorSummary> {
        let mut summary: BTreeMap<String, TaskErrorSummary> = BTreeMap::new();

        for (full_task, codes) in flat {
            let task = task_basename(full_task);
            if task.is_empty() {
                continue;
            }

            let mut entry = TaskErrorSummary::default();
            for (code_str, site_counts) in codes {
                if code_str == NOT_REPORTED {
                    entry.site_not_reported = site_counts.keys().cloned().collect();
                    continue;
                }
                let Ok(error_code) = code_str.parse::<i64>() else {
                    continue;
                };
                for (site, counts) in site_counts {
                    if *counts == 0 {
                        continue;
                    }
                    entry.errors.push(TaskErrorEntry {
                        error_code,
                        site_name: site.clone(),
                        counts: *counts,
                        ..TaskErrorEntry::default()
                    });
                }
            }

            summary.insert(task.to_string(), entry);
        }

        summary
    }

    /// Enriches the flat summary rows with the condensed sample fields,
    /// matching on (task, errorCode, siteName). When a key holds several
    /// samples the last one wins; earlier samples only contributed keywords
    /// during condensation and are not individually exposed.
    pub fn merge(
        summary: &mut BTreeMap<String, TaskErrorSummary>,
        samples: &SampleTree,
    ) {
        for (task, entry) in summary.iter_mut() {
            let Some(per_code) = samples.get(task) else {
                continue;
            };
            for error in entry.errors.iter_mut() {
                let enriched = per_code
                    .get(&error.error_code)
                    .and_then(|per_site| per_site.get(&error.site_name))
                    .and_then(|samples| samples.last());
                if let Some(sample) = enriched {
                    error.secondary_error_codes = sample.secondary_error_codes.clone();
                    error.error_keywords = sample.error_keywords.clone();
                    error.error_chain = sample.error_chain.clone();
                }
            }
        }
    }

    /// Full aggregation: condense the nested tree, build the flat rows and
    /// merge. Keys present only in the nested tree are not emitted.
    pub fn aggregate(
        &self,
        jobdetail: &JobDetail,
        flat: &FlatErrorCounts,
    ) -> BTreeMap<String, TaskErrorSummary> {
        let samples = self.error_logs(jobdetail);
        let mut summary = Self::error_summary(flat);
        Self::merge(&mut summary, &samples);
        summary
    }
}
