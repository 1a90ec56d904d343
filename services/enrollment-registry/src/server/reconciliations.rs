//! Reconciliation endpoints.

use super::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
};
use enrollment_coordinator::ReconciliationReport;
use enrollment_core::reconciliation::{ReconciliationRecord, ReconciliationStatus};
use enrollment_web::WebResult;
use serde::Deserialize;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Query of `GET /reconciliations`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// `pending` or `resolved`; both when absent
    pub status: Option<ReconciliationStatus>,
    /// Page size, at most 1000
    pub limit: Option<usize>,
}

/// `GET /reconciliations?status=&limit=`, oldest first.
pub async fn list_reconciliations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> WebResult<Json<Vec<ReconciliationRecord>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    Ok(Json(state.reconciliations.list(query.status, limit).await?))
}

/// `POST /reconciliations/run`: one replay pass, now.
pub async fn run_reconciliation(
    State(state): State<AppState>,
) -> WebResult<Json<ReconciliationReport>> {
    let report = state.reconciler.run_once().await?;
    tracing::info!(
        attempted = report.attempted,
        resolved = report.resolved,
        "Manual reconciliation pass finished"
    );
    Ok(Json(report))
}
