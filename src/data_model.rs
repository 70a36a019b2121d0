use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// One status change in a workflow's lifecycle, as reported by the request
/// detail endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "UpdateTime", default)]
    pub update_time: i64,
}

/// One link of an error chain: the raw failure type, its exit code and the
/// condensed one-line description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorChainLink {
    #[serde(rename = "errorType")]
    pub error_type: String,
    #[serde(rename = "exitCode")]
    pub exit_code: i64,
    pub description: String,
}

/// One observed failure instance, condensed from a raw log sample.
/// Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSample {
    #[serde(rename = "secondaryErrorCodes")]
    pub secondary_error_codes: BTreeSet<i64>,
    #[serde(rename = "errorKeywords")]
    pub error_keywords: BTreeSet<String>,
    #[serde(rename = "errorChain")]
    pub error_chain: Vec<ErrorChainLink>,
    #[serde(rename = "timeStamp")]
    pub timestamp: i64,
}

/// One (errorCode, siteName) row of a task's flat error summary, enriched —
/// when a matching log sample exists — with that sample's condensed fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskErrorEntry {
    #[serde(rename = "errorCode")]
    pub error_code: i64,
    #[serde(rename = "siteName")]
    pub site_name: String,
    pub counts: i64,
    #[serde(rename = "secondaryErrorCodes", default)]
    pub secondary_error_codes: BTreeSet<i64>,
    #[serde(rename = "errorKeywords", default)]
    pub error_keywords: BTreeSet<String>,
    #[serde(rename = "errorChain", default)]
    pub error_chain: Vec<ErrorChainLink>,
}

/// Total failure count for one site within a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteErrorCount {
    pub site: String,
    pub counts: i64,
}

/// Per-task slice of a workflow document. A task with no site errors after
/// aggregation is dropped from the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDocument {
    pub name: String,
    #[serde(rename = "inputTask")]
    pub input_task: Option<String>,
    #[serde(rename = "jobType")]
    pub job_type: Option<String>,
    #[serde(rename = "siteErrors")]
    pub site_errors: Vec<SiteErrorCount>,
    pub errors: Vec<TaskErrorEntry>,
    #[serde(rename = "siteNotReported")]
    pub site_not_reported: Vec<String>,
}

/// The canonical per-workflow error document, built once per poll cycle and
/// persisted append-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub name: String,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub wf_type: Option<String>,
    #[serde(rename = "failureRate")]
    pub failure_rate: f64,
    #[serde(rename = "totalError")]
    pub total_error: i64,
    #[serde(rename = "failureKeywords")]
    pub failure_keywords: BTreeSet<String>,
    pub transitions: Vec<StatusTransition>,
    pub tasks: Vec<TaskDocument>,
}

/// Classifier output for one document. The three probabilities come from one
/// softmax-like output but no sum-to-one invariant is enforced in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub name: String,
    pub good: f64,
    pub acdc: f64,
    pub resubmit: f64,
    pub timestamp: i64,
}

/// Post-mortem category of an archived workflow, inferred from its
/// resubmission family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum WorkflowLabel {
    Unknown,
    Good,
    Acdc,
    Resubmitted,
}

impl WorkflowLabel {
    pub fn code(self) -> i32 {
        match self {
            WorkflowLabel::Unknown => -1,
            WorkflowLabel::Good => 0,
            WorkflowLabel::Acdc => 1,
            WorkflowLabel::Resubmitted => 2,
        }
    }
}

impl From<WorkflowLabel> for i32 {
    fn from(label: WorkflowLabel) -> i32 {
        label.code()
    }
}

impl TryFrom<i32> for WorkflowLabel {
    type Error = String;

    fn try_from(code: i32) -> std::result::Result<Self, String> {
        match code {
            -1 => Ok(WorkflowLabel::Unknown),
            0 => Ok(WorkflowLabel::Good),
            1 => Ok(WorkflowLabel::Acdc),
            2 => Ok(WorkflowLabel::Resubmitted),
            other => Err(format!("unknown label code {}", other)),
        }
    }
}

/// Label row, upserted keyed by workflow name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub label: WorkflowLabel,
}

/// A workflow flagged by the workflow-issue detector, dressed with the
/// context the alert payload carries. Request-scoped, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowIssue {
    pub name: String,
    /// Running period in hours.
    pub running_time: f64,
    pub prob_prediction_last: [f64; 3],
    pub prob_firstrank_pastday: [f64; 3],
    pub total_error: i64,
    pub failure_rate: f64,
    /// errorCode -> site -> count, from the latest document.
    pub errorcnt_percode: BTreeMap<i64, BTreeMap<String, i64>>,
}

/// A site flagged by the site-issue detector. Request-scoped, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteIssue {
    pub site: String,
    /// Summed error-count increase across evaluated workflows.
    pub errorinc: i64,
    /// workflow -> errorCode -> count on this site, from the latest
    /// documents of all running workflows.
    pub errorcnt_perworkflow: BTreeMap<String, BTreeMap<i64, i64>>,
    pub total_errorcodes: Vec<i64>,
    pub total_errorcnts: i64,
}
