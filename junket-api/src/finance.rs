use axum::{
    extract::{Path, State},
    routing::get,
    Extension, Json, Router,
};
use junket_booking::FinanceReport;
use uuid::Uuid;

use crate::{
    error::{ApiResponse, AppError},
    middleware::auth::{require_finance, Claims},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/events/{event_id}/finance/report", get(event_report))
}

/// GET /v1/events/{event_id}/finance/report
async fn event_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<ApiResponse<FinanceReport>>, AppError> {
    require_finance(&state, &claims, event_id).await?;

    let report = state.orchestrator.finance_report(event_id).await?;
    tracing::debug!(
        event_id = %event_id,
        lines = report.lines.len(),
        over_budget = report.totals.over_budget_count,
        "Finance report generated"
    );

    Ok(ApiResponse::ok("Finance report generated", report))
}
