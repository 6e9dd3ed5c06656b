//! Reporting handlers for summaries and data export

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};

use shared::FaultSummary;

use crate::error::AppResult;
use crate::handlers::transfer::LocationQuery;
use crate::middleware::{Action, CurrentUser, Module};
use crate::services::ReportingService;
use crate::AppState;

/// Fault/repair totals for a location
pub async fn get_fault_summary(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<LocationQuery>,
) -> AppResult<Json<FaultSummary>> {
    state.capabilities.require(&current_user.0, Module::Report, Action::Read)?;
    let service = ReportingService::new(state.db.clone());
    let summary = service.fault_summary(query.location_id).await?;
    Ok(Json(summary))
}

/// Stock counters of a location as CSV
pub async fn export_stock_csv(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<LocationQuery>,
) -> AppResult<impl IntoResponse> {
    state.capabilities.require(&current_user.0, Module::Report, Action::Read)?;
    let service = ReportingService::new(state.db.clone());
    let rows = service.stock_rows(query.location_id).await?;
    let csv = ReportingService::export_to_csv(&rows)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"stock.csv\""),
        ],
        csv,
    ))
}
