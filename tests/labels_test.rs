// tests/labels_test.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use workflowmonit::data_model::{Label, WorkflowLabel};
use workflowmonit::error::Result;
use workflowmonit::executor::FanOutExecutor;
use workflowmonit::pipeline::labels::update_label_archives;
use workflowmonit::storage::{LabelStore, MemoryStore};
use workflowmonit::telemetry::{
    JobDetail, RequestDetail, RequestParams, TelemetrySource,
};

struct FamilyTelemetry {
    params: BTreeMap<String, RequestParams>,
    families: BTreeMap<String, Vec<String>>,
}

#[async_trait]
impl TelemetrySource for FamilyTelemetry {
    async fn job_detail(&self, _workflow: &str) -> Result<JobDetail> {
        Ok(JobDetail::new())
    }

    async fn request_detail(&self, _workflow: &str) -> Result<RequestDetail> {
        Ok(RequestDetail::default())
    }

    async fn not_reported_sites(
        &self,
        _workflow: &str,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        Ok(BTreeMap::new())
    }

    async fn request_params(&self, workflow: &str) -> Result<RequestParams> {
        Ok(self.params.get(workflow).cloned().unwrap_or_default())
    }

    async fn prep_id_workflows(&self, prep_id: &str) -> Result<Vec<String>> {
        Ok(self.families.get(prep_id).cloned().unwrap_or_default())
    }

    async fn running_workflows(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

fn params(prep_id: &str, status: &str) -> RequestParams {
    RequestParams {
        prep_id: Some(prep_id.to_string()),
        request_status: Some(status.to_string()),
    }
}

#[tokio::test]
async fn labels_archived_workflows_from_their_families() {
    let mut families = BTreeMap::new();
    families.insert("PREP-1".to_string(), vec!["wf_lone".to_string()]);
    families.insert(
        "PREP-2".to_string(),
        vec![
            "wf_recovered".to_string(),
            "op_ACDC_wf_recovered_200101".to_string(),
        ],
    );
    families.insert(
        "PREP-3".to_string(),
        vec!["wf_redo".to_string(), "wf_redo_v2".to_string()],
    );

    let mut by_name = BTreeMap::new();
    by_name.insert("wf_lone".to_string(), params("PREP-1", "normal-archived"));
    by_name.insert(
        "wf_recovered".to_string(),
        params("PREP-2", "announced-archived"),
    );
    by_name.insert("wf_redo".to_string(), params("PREP-3", "completed"));
    // Still running: family lookup is skipped, so the label stays unknown.
    by_name.insert("wf_open".to_string(), params("PREP-4", "running-open"));

    let source = Arc::new(FamilyTelemetry {
        params: by_name,
        families,
    });
    let store = MemoryStore::new();
    let executor = FanOutExecutor::with_max_workers(Duration::from_secs(5), 4);

    let candidates = vec![
        "wf_lone".to_string(),
        "wf_recovered".to_string(),
        "wf_redo".to_string(),
        "wf_open".to_string(),
    ];
    let labeled = update_label_archives(source, store.as_ref(), &executor, &candidates)
        .await
        .unwrap();

    assert_eq!(labeled, 4);
    assert_eq!(store.label("wf_lone").await.unwrap(), Some(WorkflowLabel::Good));
    assert_eq!(
        store.label("wf_recovered").await.unwrap(),
        Some(WorkflowLabel::Acdc)
    );
    assert_eq!(
        store.label("wf_redo").await.unwrap(),
        Some(WorkflowLabel::Resubmitted)
    );
    assert_eq!(
        store.label("wf_open").await.unwrap(),
        Some(WorkflowLabel::Unknown)
    );
}

#[tokio::test]
async fn already_labeled_workflows_are_not_queried_again() {
    let source = Arc::new(FamilyTelemetry {
        params: BTreeMap::new(),
        families: BTreeMap::new(),
    });
    let store = MemoryStore::new();
    store
        .upsert_labels(&[Label {
            name: "wf_done".to_string(),
            label: WorkflowLabel::Good,
        }])
        .await
        .unwrap();

    let executor = FanOutExecutor::new(Duration::from_secs(5));
    let labeled = update_label_archives(
        source,
        store.as_ref(),
        &executor,
        &["wf_done".to_string()],
    )
    .await
    .unwrap();

    assert_eq!(labeled, 0);
    // The stored label is untouched.
    assert_eq!(store.label("wf_done").await.unwrap(), Some(WorkflowLabel::Good));
}

#[tokio::test]
async fn unknown_labels_stay_eligible_for_a_later_pass() {
    // First pass: the workflow is still running, so the family lookup comes
    // back empty and the label is unknown.
    let mut by_name = BTreeMap::new();
    by_name.insert("wf_late".to_string(), params("PREP-9", "running-open"));
    let source = Arc::new(FamilyTelemetry {
        params: by_name,
        families: BTreeMap::new(),
    });
    let store = MemoryStore::new();
    let executor = FanOutExecutor::new(Duration::from_secs(5));
    let candidates = vec!["wf_late".to_string()];

    update_label_archives(
        Arc::clone(&source) as Arc<dyn TelemetrySource>,
        store.as_ref(),
        &executor,
        &candidates,
    )
        .await
        .unwrap();
    assert_eq!(
        store.label("wf_late").await.unwrap(),
        Some(WorkflowLabel::Unknown)
    );

    // Second pass: the request has been archived in the meantime.
    let mut by_name = BTreeMap::new();
    by_name.insert("wf_late".to_string(), params("PREP-9", "normal-archived"));
    let mut families = BTreeMap::new();
    families.insert("PREP-9".to_string(), vec!["wf_late".to_string()]);
    let source = Arc::new(FamilyTelemetry {
        params: by_name,
        families,
    });

    let labeled = update_label_archives(source, store.as_ref(), &executor, &candidates)
        .await
        .unwrap();
    assert_eq!(labeled, 1);
    assert_eq!(store.label("wf_late").await.unwrap(), Some(WorkflowLabel::Good));
}
