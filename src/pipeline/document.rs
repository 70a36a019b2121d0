use std::collections::BTreeMap;

use crate::data_model::{SiteErrorCount, TaskDocument, WorkflowDocument};
use crate::error::Result;
use crate::pipeline::aggregator::ErrorAggregator;
use crate::pipeline::condenser::LogCondenser;
use crate::telemetry::WorkflowHandle;
use crate::utils::common::{input_task, task_basename};

#[derive(Debug, Clone, Default)]
struct TaskAccumulator {
    input_task: Option<String>,
    job_type: Option<String>,
    site_errors: BTreeMap<String, i64>,
}

/// Assembles the per-workflow error document from request metadata,
/// per-agent job counts and the aggregated error summary.
#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder {
    aggregator: ErrorAggregator,
}

impl DocumentBuilder {
    pub fn new(condenser: LogCondenser) -> Self {
        DocumentBuilder {
            aggregator: ErrorAggregator::new(condenser),
        }
    }

    /// Builds one [`WorkflowDocument`]. Missing request detail degrades to a
    /// metadata-only document rather than failing.
    pub async fn build(&self, workflow: &WorkflowHandle) -> Result<WorkflowDocument> {
        let mut doc = WorkflowDocument {
            name: workflow.name().to_string(),
            ..WorkflowDocument::default()
        };

        doc.failure_rate = workflow.failure_rate().await?;

        let detail = workflow.request_detail().await?;
        let (Some(status), Some(wf_type)) = (&detail.status, &detail.wf_type) else {
            return Ok(doc);
        };
        if detail.agent_job_info.is_empty() {
            return Ok(doc);
        }

        doc.status = Some(status.clone());
        doc.wf_type = Some(wf_type.clone());
        doc.transitions = detail.transitions.clone();

        // Total error is the sum of all failure-type counts across agents;
        // per-task site errors are summed across agents for the same site.
        let mut nfailure: i64 = 0;
        let mut tasks: BTreeMap<String, TaskAccumulator> = BTreeMap::new();

        for agent in detail.agent_job_info.values() {
            let Some(agent_status) = &agent.status else {
                continue;
            };
            if agent.tasks.is_empty() {
                continue;
            }

            nfailure += agent_status.failure.values().sum::<i64>();

            for (full_task, task_data) in &agent.tasks {
                let task_name = task_basename(full_task).to_string();

                let mut site_errors: BTreeMap<String, i64> = BTreeMap::new();
                let has_failures = task_data
                    .status
                    .as_ref()
                    .map(|s| !s.failure.is_empty())
                    .unwrap_or(false);
                if has_failures {
                    for (site, site_status) in &task_data.sites {
                        if site_status.failure.is_empty() {
                            continue;
                        }
                        let err_cnt: i64 = site_status.failure.values().sum();
                        site_errors.insert(site.clone(), err_cnt);
                    }
                }

                let entry = tasks.entry(task_name).or_default();
                if entry.job_type.is_none() {
                    entry.job_type = task_data.jobtype.clone();
                }
                if entry.input_task.is_none() {
                    entry.input_task = input_task(full_task);
                }
                for (site, errors) in site_errors {
                    *entry.site_errors.entry(site).or_insert(0) += errors;
                }
            }
        }

        doc.total_error = nfailure;

        // Tasks without any site error carry nothing actionable.
        tasks.retain(|_, acc| !acc.site_errors.is_empty());

        let mut task_docs: BTreeMap<String, TaskDocument> = tasks
            .into_iter()
            .map(|(name, acc)| {
                (
                    name.clone(),
                    TaskDocument {
                        name,
                        input_task: acc.input_task,
                        job_type: acc.job_type,
                        site_errors: acc
                            .site_errors
                            .into_iter()
                            .map(|(site, counts)| SiteErrorCount { site, counts })
                            .collect(),
                        ..TaskDocument::default()
                    },
                )
            })
            .collect();

        // Rejected workflows carry only counts; skip the expensive
        // error-summary and error-log enrichment for them.
        if status != "rejected" {
            let flat = workflow.error_counts().await?;
            let jobdetail = workflow.job_detail().await?;
            let merged = self.aggregator.aggregate(jobdetail, &flat);

            for (task_name, summary) in merged {
                if let Some(task_doc) = task_docs.get_mut(&task_name) {
                    task_doc.errors = summary.errors;
                    task_doc.site_not_reported = summary.site_not_reported;
                }
            }

            doc.failure_keywords = task_docs
                .values()
                .flat_map(|task| task.errors.iter())
                .flat_map(|error| error.error_keywords.iter().cloned())
                .collect();
        }

        doc.tasks = task_docs.into_values().collect();

        Ok(doc)
    }
}
