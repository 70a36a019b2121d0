use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::config::TicketSettings;
use crate::data_model::{SiteIssue, WorkflowIssue};
use crate::error::{MonitError, Result};
use crate::utils::common::{fmttime, unix_now};

/// Issue-tracker label marking workflow escalations.
pub const WORKFLOW_ISSUE_LABEL: &str = "WorkflowIssue";
/// Issue-tracker label marking site escalations.
pub const SITE_ISSUE_LABEL: &str = "SiteIssue";

/// Reference to an existing tracker ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRef {
    pub key: String,
}

/// Fields of a ticket to be created.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub label: String,
    pub summary: String,
    pub description: String,
}

/// Ticket-tracker seam: search by label and free-text identifier, create,
/// comment. Backed by Jira in production and by in-memory fakes in tests.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn search(&self, label: &str, identifier: &str) -> Result<Vec<TicketRef>>;

    async fn create(&self, ticket: NewTicket) -> Result<TicketRef>;

    async fn comment(&self, ticket: &TicketRef, body: &str) -> Result<()>;
}

/// Creates one ticket per flagged subject and appends a detection comment on
/// every later sighting, keyed by the tracker label plus the subject name.
pub struct EscalationPolicy<'a> {
    store: &'a dyn TicketStore,
    dashboard_url: String,
}

impl<'a> EscalationPolicy<'a> {
    pub fn new(store: &'a dyn TicketStore, dashboard_url: impl Into<String>) -> Self {
        EscalationPolicy {
            store,
            dashboard_url: dashboard_url.into(),
        }
    }

    pub async fn escalate_workflows(&self, issues: &[WorkflowIssue]) -> Result<()> {
        let time_str = fmttime(unix_now());
        for issue in issues {
            let existing = self.store.search(WORKFLOW_ISSUE_LABEL, &issue.name).await?;
            if let Some(ticket) = existing.first() {
                let comment = format!("<sentinel> detected on {time_str}");
                self.store.comment(ticket, &comment).await?;
                info!(workflow = %issue.name, ticket = %ticket.key, "commented existing ticket");
            } else {
                let description = format!(
                    "* [unified|https://cms-unified.web.cern.ch/cms-unified//report/{0}]\n\
                     * [report|{1}/errorreport/{0}]",
                    issue.name, self.dashboard_url
                );
                let ticket = self
                    .store
                    .create(NewTicket {
                        label: WORKFLOW_ISSUE_LABEL.to_string(),
                        summary: format!("<Workflow> - {} needs attention", issue.name),
                        description,
                    })
                    .await?;
                info!(workflow = %issue.name, ticket = %ticket.key, "opened ticket");
            }
        }
        Ok(())
    }

    pub async fn escalate_sites(&self, issues: &[SiteIssue]) -> Result<()> {
        let time_str = fmttime(unix_now());
        for issue in issues {
            let detail = format!(
                "site: {}, error increased: {}, detected on {}",
                issue.site, issue.errorinc, time_str
            );
            let existing = self.store.search(SITE_ISSUE_LABEL, &issue.site).await?;
            if let Some(ticket) = existing.first() {
                self.store
                    .comment(ticket, &format!("<sentinel> {detail}"))
                    .await?;
                info!(site = %issue.site, ticket = %ticket.key, "commented existing ticket");
            } else {
                let ticket = self
                    .store
                    .create(NewTicket {
                        label: SITE_ISSUE_LABEL.to_string(),
                        summary: format!("<Site> - {} needs attention", issue.site),
                        description: detail,
                    })
                    .await?;
                info!(site = %issue.site, ticket = %ticket.key, "opened ticket");
            }
        }
        Ok(())
    }
}

// --- Jira REST backend ---------------------------------------------------

#[derive(Debug, Deserialize)]
struct JiraSearchResponse {
    #[serde(default)]
    issues: Vec<JiraIssue>,
}

#[derive(Debug, Deserialize)]
struct JiraIssue {
    key: String,
}

#[derive(Debug, Deserialize)]
struct JiraCreateResponse {
    key: String,
}

/// [`TicketStore`] over the Jira REST v2 API.
pub struct JiraStore {
    client: reqwest::Client,
    settings: TicketSettings,
}

impl JiraStore {
    pub fn new(settings: TicketSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("workflowmonit")
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(JiraStore { client, settings })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.settings.base_url, path));
        if let Some(auth) = &self.settings.auth_header {
            builder = builder.header(reqwest::header::AUTHORIZATION, auth);
        }
        builder
    }
}

#[async_trait]
impl TicketStore for JiraStore {
    async fn search(&self, label: &str, identifier: &str) -> Result<Vec<TicketRef>> {
        let jql = format!(
            "project={} AND labels={} AND summary~\"{}\"",
            self.settings.project, label, identifier
        );
        let mut query = BTreeMap::new();
        query.insert("jql", jql);

        let response: JiraSearchResponse = self
            .request(reqwest::Method::GET, "/rest/api/2/search")
            .query(&query)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| MonitError::TicketError(e.to_string()))?
            .json()
            .await?;

        Ok(response
            .issues
            .into_iter()
            .map(|issue| TicketRef { key: issue.key })
            .collect())
    }

    async fn create(&self, ticket: NewTicket) -> Result<TicketRef> {
        let fields = json!({
            "fields": {
                "project": { "key": self.settings.project },
                "issuetype": { "name": "Task" },
                "labels": [ticket.label],
                "summary": ticket.summary,
                "description": ticket.description,
            }
        });

        let response: JiraCreateResponse = self
            .request(reqwest::Method::POST, "/rest/api/2/issue")
            .json(&fields)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| MonitError::TicketError(e.to_string()))?
            .json()
            .await?;

        Ok(TicketRef { key: response.key })
    }

    async fn comment(&self, ticket: &TicketRef, body: &str) -> Result<()> {
        self.request(
            reqwest::Method::POST,
            &format!("/rest/api/2/issue/{}/comment", ticket.key),
        )
        .json(&json!({ "body": body }))
        .send()
        .await?
        .error_for_status()
        .map_err(|e| MonitError::TicketError(e.to_string()))?;
        Ok(())
    }
}
