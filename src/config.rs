use crate::error::{MonitError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

fn default_buzzwords() -> Vec<String> {
    ["error", "fail", "exception", "maxrss", "timeout"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_ignore_words() -> Vec<String> {
    ["start", "begin", "end", "above", "below"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_keyword_buzzwords() -> Vec<String> {
    [
        "error", "errors", "errormsg", "fail", "failed", "failure", "kill", "killed", "exception",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_whitelist_words() -> Vec<String> {
    ["timeout", "maxrss", "nojobreport"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Word lists driving the log condenser. All matching is lowercase
/// substring matching; the lists are expected to be lowercase.
#[derive(Deserialize, Debug, Clone)]
pub struct CondenserSettings {
    /// Words that make a log piece worth surfacing in `shorten`.
    #[serde(default = "default_buzzwords")]
    pub buzzwords: Vec<String>,
    /// Pieces containing any of these are skipped entirely.
    #[serde(default = "default_ignore_words")]
    pub ignore_words: Vec<String>,
    /// Substrings that flag a token as a keyword (unless the whole token is
    /// exactly one of them).
    #[serde(default = "default_keyword_buzzwords")]
    pub keyword_buzzwords: Vec<String>,
    /// Tokens containing any of these are always kept as keywords.
    #[serde(default = "default_whitelist_words")]
    pub whitelist_words: Vec<String>,
    /// Keywords removed from the final set.
    #[serde(default = "default_ignore_words")]
    pub blacklist_words: Vec<String>,
}

impl Default for CondenserSettings {
    fn default() -> Self {
        CondenserSettings {
            buzzwords: default_buzzwords(),
            ignore_words: default_ignore_words(),
            keyword_buzzwords: default_keyword_buzzwords(),
            whitelist_words: default_whitelist_words(),
            blacklist_words: default_ignore_words(),
        }
    }
}

fn default_resubmit_prob() -> f64 {
    0.3
}
fn default_running_days() -> i64 {
    1
}
fn default_resubmit_top_frac() -> f64 {
    0.75
}
fn default_total_error() -> i64 {
    100
}
fn default_failure_rate() -> f64 {
    0.5
}

/// Thresholds for flagging a workflow as needing attention.
#[derive(Deserialize, Debug, Clone)]
pub struct WorkflowIssueSettings {
    /// Minimum latest resubmit probability for candidacy.
    #[serde(default = "default_resubmit_prob")]
    pub resubmit_prob: f64,
    /// Minimum running period, in days.
    #[serde(default = "default_running_days")]
    pub running_days: i64,
    /// Minimum fraction of records ranking resubmit first in the trailing
    /// window.
    #[serde(default = "default_resubmit_top_frac")]
    pub resubmit_top_frac: f64,
    /// Minimum totalError in the latest document.
    #[serde(default = "default_total_error")]
    pub total_error: i64,
    /// Minimum failureRate in the latest document.
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
}

impl Default for WorkflowIssueSettings {
    fn default() -> Self {
        WorkflowIssueSettings {
            resubmit_prob: default_resubmit_prob(),
            running_days: default_running_days(),
            resubmit_top_frac: default_resubmit_top_frac(),
            total_error: default_total_error(),
            failure_rate: default_failure_rate(),
        }
    }
}

impl WorkflowIssueSettings {
    pub fn validate(&self) -> Result<()> {
        for (name, val) in [
            ("resubmit_prob", self.resubmit_prob),
            ("resubmit_top_frac", self.resubmit_top_frac),
            ("failure_rate", self.failure_rate),
        ] {
            if !(0.0..=1.0).contains(&val) {
                return Err(MonitError::ConfigValidationError(format!(
                    "WorkflowIssueSettings: {} must be between 0.0 and 1.0, got {}",
                    name, val
                )));
            }
        }
        if self.running_days < 0 {
            return Err(MonitError::ConfigValidationError(
                "WorkflowIssueSettings: running_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_acdc_prob() -> f64 {
    0.5
}
fn default_running_hours() -> i64 {
    4
}
fn default_error_count_inc() -> i64 {
    500
}
fn default_max_workers() -> usize {
    50
}

/// Thresholds for flagging a site as needing attention.
#[derive(Deserialize, Debug, Clone)]
pub struct SiteIssueSettings {
    /// Minimum latest acdc probability for a workflow to be evaluated.
    #[serde(default = "default_acdc_prob")]
    pub acdc_prob: f64,
    /// Look-back span, in hours, for the past document.
    #[serde(default = "default_running_hours")]
    pub running_hours: i64,
    /// Minimum summed per-site error increase to flag.
    #[serde(default = "default_error_count_inc")]
    pub error_count_inc: i64,
    /// Worker cap for the per-workflow evaluation batch.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for SiteIssueSettings {
    fn default() -> Self {
        SiteIssueSettings {
            acdc_prob: default_acdc_prob(),
            running_hours: default_running_hours(),
            error_count_inc: default_error_count_inc(),
            max_workers: default_max_workers(),
        }
    }
}

impl SiteIssueSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.acdc_prob) {
            return Err(MonitError::ConfigValidationError(format!(
                "SiteIssueSettings: acdc_prob must be between 0.0 and 1.0, got {}",
                self.acdc_prob
            )));
        }
        if self.running_hours <= 0 {
            return Err(MonitError::ConfigValidationError(
                "SiteIssueSettings: running_hours must be greater than 0".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(MonitError::ConfigValidationError(
                "SiteIssueSettings: max_workers must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_batch_size() -> usize {
    15
}
fn default_batch_timeout_secs() -> u64 {
    300
}
fn default_min_failure_rate() -> f64 {
    0.0
}
fn default_label_max_workers() -> usize {
    50
}

/// Settings for one monitoring cycle.
#[derive(Deserialize, Debug, Clone)]
pub struct CycleSettings {
    /// Number of workflows queried concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Per-batch timeout, in seconds.
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
    /// Documents are only fully aggregated above this failure rate.
    #[serde(default = "default_min_failure_rate")]
    pub min_failure_rate: f64,
    /// Worker cap for the label-making batch.
    #[serde(default = "default_label_max_workers")]
    pub label_max_workers: usize,
}

impl Default for CycleSettings {
    fn default() -> Self {
        CycleSettings {
            batch_size: default_batch_size(),
            batch_timeout_secs: default_batch_timeout_secs(),
            min_failure_rate: default_min_failure_rate(),
            label_max_workers: default_label_max_workers(),
        }
    }
}

impl CycleSettings {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(MonitError::ConfigValidationError(
                "CycleSettings: batch_size must be greater than 0".to_string(),
            ));
        }
        if self.batch_timeout_secs == 0 {
            return Err(MonitError::ConfigValidationError(
                "CycleSettings: batch_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_failure_rate) {
            return Err(MonitError::ConfigValidationError(format!(
                "CycleSettings: min_failure_rate must be between 0.0 and 1.0, got {}",
                self.min_failure_rate
            )));
        }
        if self.label_max_workers == 0 {
            return Err(MonitError::ConfigValidationError(
                "CycleSettings: label_max_workers must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Connection details for the AMQP document publisher. Optional: with no
/// `amqp` section the cycle skips publishing.
#[derive(Deserialize, Debug, Clone)]
pub struct AmqpSettings {
    pub addr: String,
    pub queue: String,
    /// Document type tag attached to each notification.
    #[serde(default)]
    pub producer: Option<String>,
}

/// Ticket store (Jira) connection for the sentinel.
#[derive(Deserialize, Debug, Clone)]
pub struct TicketSettings {
    pub base_url: String,
    pub project: String,
    /// Value of the Authorization header (e.g. "Bearer ...").
    #[serde(default)]
    pub auth_header: Option<String>,
}

fn default_server_port() -> u16 {
    8020
}

/// The overall monitor configuration, read from YAML. Loaded once per cycle
/// and immutable during it.
#[derive(Deserialize, Debug, Clone)]
pub struct MonitConfig {
    /// Base URL of the workflow status service (request/job detail).
    #[serde(default)]
    pub wmstats_url: String,
    /// Endpoint returning the JSON list of running workflow names.
    #[serde(default)]
    pub workflow_list_url: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default)]
    pub condenser: CondenserSettings,
    #[serde(default)]
    pub cycle: CycleSettings,
    #[serde(default)]
    pub workflow_issue: WorkflowIssueSettings,
    #[serde(default)]
    pub site_issue: SiteIssueSettings,
    #[serde(default)]
    pub amqp: Option<AmqpSettings>,
    #[serde(default)]
    pub ticket: Option<TicketSettings>,
}

impl Default for MonitConfig {
    fn default() -> Self {
        MonitConfig {
            wmstats_url: String::new(),
            workflow_list_url: String::new(),
            server_port: default_server_port(),
            condenser: CondenserSettings::default(),
            cycle: CycleSettings::default(),
            workflow_issue: WorkflowIssueSettings::default(),
            site_issue: SiteIssueSettings::default(),
            amqp: None,
            ticket: None,
        }
    }
}

impl MonitConfig {
    pub fn validate(&self) -> Result<()> {
        self.cycle.validate()?;
        self.workflow_issue.validate()?;
        self.site_issue.validate()?;
        Ok(())
    }
}

/// Loads, parses and validates the monitor configuration from a YAML file.
pub fn load_monit_config(path: &Path) -> Result<MonitConfig> {
    let contents = fs::read_to_string(path).map_err(|e| {
        MonitError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: MonitConfig = serde_yaml::from_str(&contents).map_err(|e| {
        MonitError::ConfigError(format!(
            "Failed to parse YAML from '{}': {}",
            path.display(),
            e
        ))
    })?;

    config.validate()?;
    Ok(config)
}
