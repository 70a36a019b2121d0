use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::data_model::{Label, WorkflowLabel};
use crate::error::Result;
use crate::executor::{BatchJob, FanOutExecutor};
use crate::storage::LabelStore;
use crate::telemetry::TelemetrySource;

/// Infers the label of a finished workflow from its resubmission family,
/// the set of workflow names sharing its PrepID.
///
/// Exactly the workflow itself means nobody intervened. A larger family
/// containing an ACDC name means operators recovered it; a larger family
/// without one means it was resubmitted from scratch.
pub fn create_label(workflow: &str, family: &[String]) -> WorkflowLabel {
    if family.len() == 1 && family[0] == workflow {
        return WorkflowLabel::Good;
    }
    if family.len() > 1 {
        if family.iter().any(|name| name.contains("ACDC")) {
            return WorkflowLabel::Acdc;
        }
        return WorkflowLabel::Resubmitted;
    }
    WorkflowLabel::Unknown
}

struct FamilyLookupJob {
    source: Arc<dyn TelemetrySource>,
}

#[async_trait]
impl BatchJob for FamilyLookupJob {
    type Item = String;
    type Output = Label;

    fn identity(item: &Self::Item) -> String {
        item.clone()
    }

    async fn run(&self, workflow: String) -> Result<Label> {
        let family = self.family_of(&workflow).await?;
        Ok(Label {
            label: create_label(&workflow, &family),
            name: workflow,
        })
    }
}

impl FamilyLookupJob {
    /// Resubmission family of one workflow. Empty until the request reaches
    /// a completed or archived status, so premature lookups label Unknown
    /// and get retried on a later pass.
    async fn family_of(&self, workflow: &str) -> Result<Vec<String>> {
        let params = self.source.request_params(workflow).await?;
        let (Some(prep_id), Some(status)) = (&params.prep_id, &params.request_status) else {
            return Ok(Vec::new());
        };
        if prep_id.is_empty() {
            return Ok(Vec::new());
        }
        if !(status.contains("completed") || status.contains("archived")) {
            return Ok(Vec::new());
        }
        self.source.prep_id_workflows(prep_id).await
    }
}

/// Labels every workflow in `candidates` that the store has not labeled yet
/// and persists the results. Family lookups fan out concurrently under
/// `executor`; individual lookup failures drop that workflow from this pass.
pub async fn update_label_archives(
    source: Arc<dyn TelemetrySource>,
    store: &dyn LabelStore,
    executor: &FanOutExecutor,
    candidates: &[String],
) -> Result<usize> {
    let labeled = store.labeled_workflows().await?;
    let pending: Vec<String> = candidates
        .iter()
        .filter(|name| !labeled.contains(*name))
        .cloned()
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    info!(count = pending.len(), "making labels");
    let job = Arc::new(FamilyLookupJob { source });
    let labels = executor.run_batch(job, pending).await;

    store.upsert_labels(&labels).await?;
    Ok(labels.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lone_workflow_is_good() {
        let family = vec!["wf_a".to_string()];
        assert_eq!(create_label("wf_a", &family), WorkflowLabel::Good);
    }

    #[test]
    fn family_with_acdc_name_is_acdced() {
        let family = vec![
            "wf_a".to_string(),
            "operator_ACDC_wf_a_190101".to_string(),
        ];
        assert_eq!(create_label("wf_a", &family), WorkflowLabel::Acdc);
    }

    #[test]
    fn family_without_acdc_name_is_resubmitted() {
        let family = vec!["wf_a".to_string(), "wf_a_v2".to_string()];
        assert_eq!(create_label("wf_a", &family), WorkflowLabel::Resubmitted);
    }

    #[test]
    fn empty_or_foreign_family_is_unknown() {
        assert_eq!(create_label("wf_a", &[]), WorkflowLabel::Unknown);
        let foreign = vec!["wf_b".to_string()];
        assert_eq!(create_label("wf_a", &foreign), WorkflowLabel::Unknown);
    }
}
