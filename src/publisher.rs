use lapin::{
    options::{BasicPublishOptions, QueueDeclareOptions},
    protocol::basic::AMQPProperties,
    types::FieldTable,
    Channel, Connection, ConnectionProperties,
};
use serde_json::json;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::config::AmqpSettings;
use crate::data_model::WorkflowDocument;
use crate::error::Result;
use crate::utils::common::unix_now;
use crate::utils::metrics;

/// Connects to the message broker, retrying a few times before giving up.
pub async fn connect_amqp(addr: &str) -> lapin::Result<Connection> {
    let options = ConnectionProperties::default()
        .with_executor(tokio_executor_trait::Tokio::current())
        .with_reactor(tokio_reactor_trait::Tokio);

    let mut attempts = 0;
    loop {
        match Connection::connect(addr, options.clone()).await {
            Ok(conn) => {
                info!("Connected to AMQP broker at {}", addr);
                return Ok(conn);
            }
            Err(e) => {
                attempts += 1;
                error!(
                    attempt = attempts,
                    error = %e,
                    "Failed to connect to AMQP broker. Retrying in 5 seconds..."
                );
                if attempts >= 5 {
                    return Err(e);
                }
                sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

/// Publishes workflow documents to a durable queue as persistent JSON
/// notifications. Per-document failures are collected and returned so the
/// caller can archive them for later replay.
pub struct DocumentPublisher {
    channel: Channel,
    settings: AmqpSettings,
}

impl DocumentPublisher {
    pub async fn connect(settings: AmqpSettings) -> Result<Self> {
        let conn = connect_amqp(&settings.addr).await?;
        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                &settings.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(DocumentPublisher { channel, settings })
    }

    fn doc_type(&self) -> String {
        match &self.settings.producer {
            Some(producer) => format!("workflowmonit_{producer}"),
            None => "workflowmonit".to_string(),
        }
    }

    /// Sends each document as one confirmed notification. Returns the
    /// documents that could not be delivered.
    pub async fn publish(&self, docs: &[WorkflowDocument]) -> Result<Vec<WorkflowDocument>> {
        if docs.is_empty() {
            info!("No documents to publish");
            return Ok(Vec::new());
        }

        let doc_type = self.doc_type();
        let mut failures = Vec::new();

        for doc in docs {
            let notification = json!({
                "payload": doc,
                "metadata": {
                    "timestamp": unix_now(),
                    "producer": self.settings.producer,
                    "type": doc_type,
                },
            });
            let payload = serde_json::to_vec(&notification)?;

            let outcome = self
                .channel
                .basic_publish(
                    "",
                    &self.settings.queue,
                    BasicPublishOptions::default(),
                    &payload,
                    AMQPProperties::default().with_delivery_mode(2),
                )
                .await;

            let confirmed = match outcome {
                Ok(confirm) => confirm.await.is_ok(),
                Err(_) => false,
            };
            if !confirmed {
                warn!(workflow = %doc.name, "failed to publish document");
                metrics::PUBLISH_FAILURES_TOTAL.inc();
                failures.push(doc.clone());
            }
        }

        info!(
            sent = docs.len() - failures.len(),
            total = docs.len(),
            "documents published"
        );
        Ok(failures)
    }
}
