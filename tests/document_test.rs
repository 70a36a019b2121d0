// tests/document_test.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use workflowmonit::data_model::StatusTransition;
use workflowmonit::error::Result;
use workflowmonit::pipeline::condenser::LogCondenser;
use workflowmonit::pipeline::document::DocumentBuilder;
use workflowmonit::telemetry::{
    AgentInfo, AgentTask, ErrorCell, JobDetail, JobStatusCounts, LogSample, RequestDetail,
    RequestParams, SiteErrorDetail, SiteJobStatus, StepErrors, TelemetrySource, WorkflowHandle,
};

struct MockTelemetry {
    request_detail: RequestDetail,
    job_detail: JobDetail,
    not_reported: BTreeMap<String, Vec<String>>,
}

#[async_trait]
impl TelemetrySource for MockTelemetry {
    async fn job_detail(&self, _workflow: &str) -> Result<JobDetail> {
        Ok(self.job_detail.clone())
    }

    async fn request_detail(&self, _workflow: &str) -> Result<RequestDetail> {
        Ok(self.request_detail.clone())
    }

    async fn not_reported_sites(&self, _workflow: &str) -> Result<BTreeMap<String, Vec<String>>> {
        Ok(self.not_reported.clone())
    }

    async fn request_params(&self, _workflow: &str) -> Result<RequestParams> {
        Ok(RequestParams::default())
    }

    async fn prep_id_workflows(&self, _prep_id: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn running_workflows(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

fn status_counts(success: i64, jobfailed: i64) -> JobStatusCounts {
    let mut failure = BTreeMap::new();
    if jobfailed > 0 {
        failure.insert("jobfailed".to_string(), jobfailed);
    }
    JobStatusCounts { success, failure }
}

fn agent_task(jobtype: &str, jobfailed: i64, site: &str) -> AgentTask {
    let mut sites = BTreeMap::new();
    if jobfailed > 0 {
        let mut failure = BTreeMap::new();
        failure.insert("jobfailed".to_string(), jobfailed);
        sites.insert(site.to_string(), SiteJobStatus { failure });
    }
    AgentTask {
        jobtype: Some(jobtype.to_string()),
        status: Some(status_counts(0, jobfailed)),
        sites,
    }
}

fn running_request_detail() -> RequestDetail {
    let mut tasks = BTreeMap::new();
    tasks.insert(
        "/wf1/Task1".to_string(),
        agent_task("Processing", 10, "T1_DE_KIT"),
    );
    tasks.insert("/wf1/Task2".to_string(), agent_task("Merge", 0, "T1_DE_KIT"));
    let agent1 = AgentInfo {
        status: Some(status_counts(90, 10)),
        tasks,
    };

    let mut tasks2 = BTreeMap::new();
    tasks2.insert(
        "/wf1/Task1".to_string(),
        agent_task("Processing", 5, "T1_DE_KIT"),
    );
    let agent2 = AgentInfo {
        status: Some(status_counts(0, 5)),
        tasks: tasks2,
    };

    let mut agent_job_info = BTreeMap::new();
    agent_job_info.insert("agent1".to_string(), agent1);
    agent_job_info.insert("agent2".to_string(), agent2);

    RequestDetail {
        status: Some("running-closed".to_string()),
        wf_type: Some("TaskChain".to_string()),
        transitions: vec![StatusTransition {
            status: "running-open".to_string(),
            update_time: 1_700_000_000,
        }],
        agent_job_info,
    }
}

fn failing_job_detail() -> JobDetail {
    let mut errors = BTreeMap::new();
    errors.insert(
        "details".to_string(),
        vec![ErrorCell {
            error_type: "Fatal Exception".to_string(),
            exit_code: 8021,
            details: "cmsRun timeout while reading input".to_string(),
        }],
    );
    let sample = LogSample {
        timestamp: 1,
        errors,
    };

    let mut sites = BTreeMap::new();
    sites.insert(
        "T1_DE_KIT".to_string(),
        SiteErrorDetail {
            samples: vec![sample],
            error_count: 15,
        },
    );
    let mut jobfailed = BTreeMap::new();
    jobfailed.insert("8021".to_string(), sites);

    let mut detail = JobDetail::new();
    detail.insert(
        "/wf1/Task1".to_string(),
        StepErrors {
            jobfailed,
            submitfailed: BTreeMap::new(),
        },
    );
    detail
}

fn handle_over(source: MockTelemetry) -> WorkflowHandle {
    WorkflowHandle::new("wf1", Arc::new(source))
}

#[tokio::test]
async fn builds_full_document_for_running_workflow() {
    let mut not_reported = BTreeMap::new();
    not_reported.insert("/wf1/Task1".to_string(), vec!["T3_US_OSG".to_string()]);

    let source = MockTelemetry {
        request_detail: running_request_detail(),
        job_detail: failing_job_detail(),
        not_reported,
    };
    let builder = DocumentBuilder::new(LogCondenser::default());
    let doc = builder.build(&handle_over(source)).await.unwrap();

    assert_eq!(doc.name, "wf1");
    assert_eq!(doc.status.as_deref(), Some("running-closed"));
    assert_eq!(doc.wf_type.as_deref(), Some("TaskChain"));
    // Sum of failure counts across both agents.
    assert_eq!(doc.total_error, 15);
    assert!((doc.failure_rate - 15.0 / 105.0).abs() < 1e-9);

    // Task2 had no site errors and is dropped.
    assert_eq!(doc.tasks.len(), 1);
    let task = &doc.tasks[0];
    assert_eq!(task.name, "Task1");
    assert_eq!(task.input_task, None);
    assert_eq!(task.job_type.as_deref(), Some("Processing"));
    assert_eq!(task.site_errors.len(), 1);
    assert_eq!(task.site_errors[0].counts, 15);
    assert_eq!(task.site_not_reported, vec!["T3_US_OSG".to_string()]);

    assert_eq!(task.errors.len(), 1);
    let entry = &task.errors[0];
    assert_eq!(entry.error_code, 8021);
    assert_eq!(entry.counts, 15);
    assert!(entry.error_keywords.iter().any(|kw| kw.contains("timeout")));

    // Document keywords are the union over all entries.
    assert_eq!(doc.failure_keywords, entry.error_keywords);
}

#[tokio::test]
async fn rejected_workflow_skips_log_enrichment() {
    let mut detail = running_request_detail();
    detail.status = Some("rejected".to_string());

    let source = MockTelemetry {
        request_detail: detail,
        job_detail: failing_job_detail(),
        not_reported: BTreeMap::new(),
    };
    let builder = DocumentBuilder::new(LogCondenser::default());
    let doc = builder.build(&handle_over(source)).await.unwrap();

    assert_eq!(doc.total_error, 15);
    assert_eq!(doc.tasks.len(), 1);
    assert!(doc.tasks[0].errors.is_empty());
    assert!(doc.failure_keywords.is_empty());
}

#[tokio::test]
async fn missing_metadata_degrades_to_counts_only_document() {
    let source = MockTelemetry {
        request_detail: RequestDetail::default(),
        job_detail: JobDetail::new(),
        not_reported: BTreeMap::new(),
    };
    let builder = DocumentBuilder::new(LogCondenser::default());
    let doc = builder.build(&handle_over(source)).await.unwrap();

    assert_eq!(doc.name, "wf1");
    assert_eq!(doc.status, None);
    assert_eq!(doc.failure_rate, 0.0);
    assert!(doc.tasks.is_empty());
}
