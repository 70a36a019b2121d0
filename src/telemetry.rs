use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::data_model::StatusTransition;
use crate::error::Result;

/// Pseudo error code used in flat summaries for sites that have not
/// reported.
pub const NOT_REPORTED: &str = "NotReported";

// --- Wire payloads ---------------------------------------------------------
//
// Missing keys anywhere in these payloads are valid "empty" responses, not
// errors; every field defaults so a partially-available source degrades the
// document instead of discarding it. Maps are BTreeMaps so aggregation walks
// them in a stable order.

/// One error cell of a log sample. Structural equality is used to
/// deduplicate exact-duplicate cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorCell {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(rename = "exitCode", default)]
    pub exit_code: i64,
    #[serde(default)]
    pub details: String,
}

/// One sampled job failure: a timestamp and error cells grouped by category.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogSample {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<ErrorCell>>,
}

/// Per-site slice of a failed error code: raw log samples plus the flat
/// error count.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteErrorDetail {
    #[serde(default)]
    pub samples: Vec<LogSample>,
    #[serde(rename = "errorCount", default)]
    pub error_count: i64,
}

/// errorCode -> site -> detail.
pub type CodeSiteErrors = BTreeMap<String, BTreeMap<String, SiteErrorDetail>>;

/// Failure details of one task, split by failure status kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepErrors {
    #[serde(default)]
    pub jobfailed: CodeSiteErrors,
    #[serde(default)]
    pub submitfailed: CodeSiteErrors,
}

/// The nested job-failure tree: full task path -> step errors.
pub type JobDetail = BTreeMap<String, StepErrors>;

/// Job status counts reported by one agent (or one task within an agent).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobStatusCounts {
    #[serde(default)]
    pub success: i64,
    #[serde(default)]
    pub failure: BTreeMap<String, i64>,
}

/// Per-site job status within a task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteJobStatus {
    #[serde(default)]
    pub failure: BTreeMap<String, i64>,
}

/// Per-task job info reported by one agent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentTask {
    #[serde(default)]
    pub jobtype: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatusCounts>,
    #[serde(default)]
    pub sites: BTreeMap<String, SiteJobStatus>,
}

/// Everything one agent reports about a workflow.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentInfo {
    #[serde(default)]
    pub status: Option<JobStatusCounts>,
    #[serde(default)]
    pub tasks: BTreeMap<String, AgentTask>,
}

/// Request metadata plus per-agent job counts from the request detail
/// endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestDetail {
    #[serde(rename = "RequestStatus", default)]
    pub status: Option<String>,
    #[serde(rename = "RequestType", default)]
    pub wf_type: Option<String>,
    #[serde(rename = "RequestTransition", default)]
    pub transitions: Vec<StatusTransition>,
    #[serde(rename = "AgentJobInfo", default)]
    pub agent_job_info: BTreeMap<String, AgentInfo>,
}

/// Request parameters from the request manager, used for labeling.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestParams {
    #[serde(rename = "PrepID", default)]
    pub prep_id: Option<String>,
    #[serde(rename = "RequestStatus", default)]
    pub request_status: Option<String>,
}

/// Flat error-count summary: task -> errorCode (string, including the
/// `NotReported` pseudo-code) -> site -> count.
pub type FlatErrorCounts = BTreeMap<String, BTreeMap<String, BTreeMap<String, i64>>>;

// --- Source trait -----------------------------------------------------------

/// The remote status services, at their interface boundary. Each call may
/// fail or time out per item; callers isolate those failures per workflow.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// The nested job-failure tree for one workflow.
    async fn job_detail(&self, workflow: &str) -> Result<JobDetail>;

    /// Request status/type/transitions and per-agent job counts.
    async fn request_detail(&self, workflow: &str) -> Result<RequestDetail>;

    /// Sites that have not reported, keyed by full task path.
    async fn not_reported_sites(&self, workflow: &str) -> Result<BTreeMap<String, Vec<String>>>;

    /// Request parameters (PrepID, status) for one workflow.
    async fn request_params(&self, workflow: &str) -> Result<RequestParams>;

    /// All workflow names sharing one PrepID (the resubmission family).
    async fn prep_id_workflows(&self, prep_id: &str) -> Result<Vec<String>>;

    /// Names of all currently running workflows.
    async fn running_workflows(&self) -> Result<Vec<String>>;
}

// --- HTTP client -------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ResultEnvelope<T> {
    #[serde(default = "Vec::new")]
    result: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct AcdcFile {
    #[serde(default)]
    locations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AcdcDoc {
    #[serde(default)]
    fileset_name: String,
    #[serde(default)]
    files: BTreeMap<String, AcdcFile>,
}

#[derive(Debug, Deserialize)]
struct AcdcRow {
    doc: AcdcDoc,
}

#[derive(Debug, Default, Deserialize)]
struct AcdcView {
    #[serde(default)]
    rows: Vec<AcdcRow>,
}

/// HTTP implementation of [`TelemetrySource`] against the workflow status
/// services.
#[derive(Debug, Clone)]
pub struct HttpTelemetry {
    client: reqwest::Client,
    base_url: String,
    workflow_list_url: String,
}

impl HttpTelemetry {
    pub fn new(base_url: impl Into<String>, workflow_list_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("workflowmonit")
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        Ok(HttpTelemetry {
            client,
            base_url: base_url.into(),
            workflow_list_url: workflow_list_url.into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url, "telemetry fetch");
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetry {
    async fn job_detail(&self, workflow: &str) -> Result<JobDetail> {
        let url = format!(
            "{}/wmstatsserver/data/jobdetail/{}",
            self.base_url, workflow
        );
        let mut envelope: ResultEnvelope<BTreeMap<String, JobDetail>> =
            self.get_json(&url).await?;
        if envelope.result.is_empty() {
            return Ok(JobDetail::new());
        }
        Ok(envelope.result.remove(0).remove(workflow).unwrap_or_default())
    }

    async fn request_detail(&self, workflow: &str) -> Result<RequestDetail> {
        let url = format!("{}/wmstatsserver/data/request/{}", self.base_url, workflow);
        let mut envelope: ResultEnvelope<BTreeMap<String, RequestDetail>> =
            self.get_json(&url).await?;
        if envelope.result.is_empty() {
            return Ok(RequestDetail::default());
        }
        Ok(envelope.result.remove(0).remove(workflow).unwrap_or_default())
    }

    async fn not_reported_sites(&self, workflow: &str) -> Result<BTreeMap<String, Vec<String>>> {
        let url = format!(
            "{}/couchdb/acdcserver/_design/ACDC/_view/byCollectionName?key=\"{}\"&include_docs=true&reduce=false",
            self.base_url, workflow
        );
        let view: AcdcView = self.get_json(&url).await?;

        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in view.rows {
            let entry = out.entry(row.doc.fileset_name).or_default();
            for file in row.doc.files.values() {
                for site in &file.locations {
                    if !entry.contains(site) {
                        entry.push(site.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    async fn request_params(&self, workflow: &str) -> Result<RequestParams> {
        let url = format!("{}/reqmgr2/data/request?name={}", self.base_url, workflow);
        let envelope: ResultEnvelope<BTreeMap<String, RequestParams>> =
            self.get_json(&url).await?;
        for mut params in envelope.result {
            if let Some(found) = params.remove(workflow) {
                return Ok(found);
            }
        }
        Ok(RequestParams::default())
    }

    async fn prep_id_workflows(&self, prep_id: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/reqmgr2/data/request?prep_id={}&detail=true",
            self.base_url, prep_id
        );
        let envelope: ResultEnvelope<BTreeMap<String, serde_json::Value>> =
            self.get_json(&url).await?;
        Ok(envelope
            .result
            .first()
            .map(|family| family.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn running_workflows(&self) -> Result<Vec<String>> {
        self.get_json(&self.workflow_list_url).await
    }
}

// --- Per-workflow handle -----------------------------------------------------

/// Per-workflow view over a [`TelemetrySource`], caching each fetched payload
/// for the lifetime of the handle (one document build).
pub struct WorkflowHandle {
    name: String,
    source: Arc<dyn TelemetrySource>,
    jobdetail: OnceCell<JobDetail>,
    reqdetail: OnceCell<RequestDetail>,
}

impl WorkflowHandle {
    pub fn new(name: impl Into<String>, source: Arc<dyn TelemetrySource>) -> Self {
        WorkflowHandle {
            name: name.into(),
            source,
            jobdetail: OnceCell::new(),
            reqdetail: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn job_detail(&self) -> Result<&JobDetail> {
        self.jobdetail
            .get_or_try_init(|| self.source.job_detail(&self.name))
            .await
    }

    pub async fn request_detail(&self) -> Result<&RequestDetail> {
        self.reqdetail
            .get_or_try_init(|| self.source.request_detail(&self.name))
            .await
    }

    /// failures / (failures + successes) summed across agents; 0 when the
    /// workflow has no jobs yet.
    pub async fn failure_rate(&self) -> Result<f64> {
        let detail = self.request_detail().await?;

        let mut nsuccess: i64 = 0;
        let mut nfailure: i64 = 0;
        for agent in detail.agent_job_info.values() {
            let Some(status) = &agent.status else {
                continue;
            };
            nsuccess += status.success;
            nfailure += status.failure.values().sum::<i64>();
        }

        if nfailure + nsuccess == 0 {
            return Ok(0.0);
        }
        Ok(nfailure as f64 / (nfailure + nsuccess) as f64)
    }

    /// The flat error-count summary: non-zero `jobfailed` counts per
    /// (task, code, site), plus `NotReported` pseudo-code entries for sites
    /// with no report. Utility tasks (LogCollect/Cleanup) are excluded.
    pub async fn error_counts(&self) -> Result<FlatErrorCounts> {
        let mut output: FlatErrorCounts = BTreeMap::new();

        let jobdetail = self.job_detail().await?;
        for (task, step) in jobdetail {
            let mut errors: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
            for (code, sites) in &step.jobfailed {
                let mut counts: BTreeMap<String, i64> = BTreeMap::new();
                for (site, detail) in sites {
                    if detail.error_count != 0 {
                        counts.insert(site.clone(), detail.error_count);
                    }
                }
                if !counts.is_empty() {
                    errors.insert(code.clone(), counts);
                }
            }
            if !errors.is_empty() {
                output.insert(task.clone(), errors);
            }
        }

        let not_reported = self.source.not_reported_sites(&self.name).await?;
        for (task, sites) in not_reported {
            let codes = output.entry(task).or_default();
            let entry = codes.entry(NOT_REPORTED.to_string()).or_default();
            for site in sites {
                entry.insert(site, 0);
            }
        }

        output.retain(|task, _| !task.contains("LogCollect") && !task.contains("Cleanup"));

        Ok(output)
    }
}
