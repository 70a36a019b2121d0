use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use tracing::{error, info};

use crate::detectors::{SiteIssueDetector, WorkflowIssueDetector};
use crate::error::Result;
use crate::storage::{DocumentStore, PredictionStore};
use crate::utils::metrics::metrics_handler;

/// Shared handler state: the two history stores plus the detectors built
/// over them.
#[derive(Clone)]
pub struct AppState {
    pub docs: Arc<dyn DocumentStore>,
    pub preds: Arc<dyn PredictionStore>,
    pub workflow_issues: Arc<WorkflowIssueDetector>,
    pub site_issues: Arc<SiteIssueDetector>,
}

async fn workflow_issues_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.workflow_issues.detect().await {
        Ok(issues) => Json(issues).into_response(),
        Err(e) => {
            error!(error = %e, "workflow-issue detection failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn site_issues_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.site_issues.detect().await {
        Ok(issues) => Json(issues).into_response(),
        Err(e) => {
            error!(error = %e, "site-issue detection failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn error_report_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.docs.latest_document(&name).await {
        Ok(Some(doc)) => Json(doc).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Workflow not found").into_response(),
        Err(e) => {
            error!(error = %e, workflow = %name, "error report lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn predictions_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.preds.prediction_history(&name).await {
        Ok(history) if history.is_empty() => {
            (StatusCode::NOT_FOUND, "Workflow not found").into_response()
        }
        Ok(history) => Json(history).into_response(),
        Err(e) => {
            error!(error = %e, workflow = %name, "prediction lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(metrics_handler))
        .route("/issues/workflow", get(workflow_issues_handler))
        .route("/issues/site", get(site_issues_handler))
        .route("/errorreport/:name", get(error_report_handler))
        .route("/predictions/:name", get(predictions_handler))
        .with_state(state)
}

pub async fn run_server(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
