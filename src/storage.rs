use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::data_model::{Label, PredictionRecord, WorkflowDocument, WorkflowLabel};
use crate::error::Result;

/// Append-only store of workflow documents, one row per poll cycle.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_documents(&self, docs: &[WorkflowDocument], timestamp: i64) -> Result<()>;

    /// All documents written at the most recent poll timestamp.
    async fn latest_documents(&self) -> Result<Vec<WorkflowDocument>>;

    /// The most recent document of one workflow.
    async fn latest_document(&self, workflow: &str) -> Result<Option<WorkflowDocument>>;

    /// Full (timestamp, document) history of one workflow, ascending.
    async fn document_history(&self, workflow: &str) -> Result<Vec<(i64, WorkflowDocument)>>;

    /// Timestamp of the last completed cycle, if any.
    async fn latest_timestamp(&self) -> Result<Option<i64>>;

    /// Latest known status per workflow, for filtering archived ones out of
    /// further polling.
    async fn workflow_statuses(&self) -> Result<BTreeMap<String, String>>;
}

/// Append-only store of prediction records, one row per poll cycle per
/// workflow.
#[async_trait]
pub trait PredictionStore: Send + Sync {
    async fn insert_predictions(&self, records: &[PredictionRecord]) -> Result<()>;

    /// All records written at the most recent poll timestamp.
    async fn latest_predictions(&self) -> Result<Vec<PredictionRecord>>;

    /// Full record history of one workflow, ascending by timestamp.
    async fn prediction_history(&self, workflow: &str) -> Result<Vec<PredictionRecord>>;

    async fn latest_timestamp(&self) -> Result<Option<i64>>;
}

/// Upsert store of workflow labels, keyed by name. Semantically write-once
/// after the first non-unknown write.
#[async_trait]
pub trait LabelStore: Send + Sync {
    async fn upsert_labels(&self, labels: &[Label]) -> Result<()>;

    /// Workflows that already carry a known (non-unknown) label. Unknown
    /// rows stay eligible for relabeling on a later pass.
    async fn labeled_workflows(&self) -> Result<HashSet<String>>;

    async fn label(&self, workflow: &str) -> Result<Option<WorkflowLabel>>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    docs: BTreeMap<String, Vec<(i64, WorkflowDocument)>>,
    preds: BTreeMap<String, Vec<PredictionRecord>>,
    labels: BTreeMap<String, WorkflowLabel>,
}

/// In-memory implementation of all three stores, shared behind an `Arc`.
/// Backs the dashboard endpoints of a single monitor process and the
/// integration tests; durable backends plug in through the same traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryStore::default())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_documents(&self, docs: &[WorkflowDocument], timestamp: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        for doc in docs {
            inner
                .docs
                .entry(doc.name.clone())
                .or_default()
                .push((timestamp, doc.clone()));
        }
        Ok(())
    }

    async fn latest_documents(&self) -> Result<Vec<WorkflowDocument>> {
        let inner = self.inner.read().await;
        let Some(max_ts) = inner
            .docs
            .values()
            .flat_map(|rows| rows.iter().map(|(ts, _)| *ts))
            .max()
        else {
            return Ok(Vec::new());
        };
        Ok(inner
            .docs
            .values()
            .flat_map(|rows| rows.iter())
            .filter(|(ts, _)| *ts == max_ts)
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn latest_document(&self, workflow: &str) -> Result<Option<WorkflowDocument>> {
        let inner = self.inner.read().await;
        Ok(inner
            .docs
            .get(workflow)
            .and_then(|rows| rows.iter().max_by_key(|(ts, _)| *ts))
            .map(|(_, doc)| doc.clone()))
    }

    async fn document_history(&self, workflow: &str) -> Result<Vec<(i64, WorkflowDocument)>> {
        let inner = self.inner.read().await;
        let mut rows = inner.docs.get(workflow).cloned().unwrap_or_default();
        rows.sort_by_key(|(ts, _)| *ts);
        Ok(rows)
    }

    async fn latest_timestamp(&self) -> Result<Option<i64>> {
        let inner = self.inner.read().await;
        Ok(inner
            .docs
            .values()
            .flat_map(|rows| rows.iter().map(|(ts, _)| *ts))
            .max())
    }

    async fn workflow_statuses(&self) -> Result<BTreeMap<String, String>> {
        let inner = self.inner.read().await;
        let mut statuses = BTreeMap::new();
        for (name, rows) in &inner.docs {
            let latest = rows
                .iter()
                .max_by_key(|(ts, _)| *ts)
                .and_then(|(_, doc)| doc.status.clone());
            if let Some(status) = latest {
                statuses.insert(name.clone(), status);
            }
        }
        Ok(statuses)
    }
}

#[async_trait]
impl PredictionStore for MemoryStore {
    async fn insert_predictions(&self, records: &[PredictionRecord]) -> Result<()> {
        let mut inner = self.inner.write().await;
        for record in records {
            inner
                .preds
                .entry(record.name.clone())
                .or_default()
                .push(record.clone());
        }
        Ok(())
    }

    async fn latest_predictions(&self) -> Result<Vec<PredictionRecord>> {
        let inner = self.inner.read().await;
        let Some(max_ts) = inner
            .preds
            .values()
            .flat_map(|rows| rows.iter().map(|r| r.timestamp))
            .max()
        else {
            return Ok(Vec::new());
        };
        Ok(inner
            .preds
            .values()
            .flat_map(|rows| rows.iter())
            .filter(|r| r.timestamp == max_ts)
            .cloned()
            .collect())
    }

    async fn prediction_history(&self, workflow: &str) -> Result<Vec<PredictionRecord>> {
        let inner = self.inner.read().await;
        let mut rows = inner.preds.get(workflow).cloned().unwrap_or_default();
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }

    async fn latest_timestamp(&self) -> Result<Option<i64>> {
        let inner = self.inner.read().await;
        Ok(inner
            .preds
            .values()
            .flat_map(|rows| rows.iter().map(|r| r.timestamp))
            .max())
    }
}

#[async_trait]
impl LabelStore for MemoryStore {
    async fn upsert_labels(&self, labels: &[Label]) -> Result<()> {
        let mut inner = self.inner.write().await;
        for label in labels {
            inner.labels.insert(label.name.clone(), label.label);
        }
        Ok(())
    }

    async fn labeled_workflows(&self) -> Result<HashSet<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .labels
            .iter()
            .filter(|(_, label)| **label != WorkflowLabel::Unknown)
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn label(&self, workflow: &str) -> Result<Option<WorkflowLabel>> {
        let inner = self.inner.read().await;
        Ok(inner.labels.get(workflow).copied())
    }
}
