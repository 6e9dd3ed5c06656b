//! HTTP handlers for stock account endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use shared::AccountSummary;

use crate::error::AppResult;
use crate::middleware::{Action, CurrentUser, Module};
use crate::services::stock::{ConsumeInput, ReceiveInput};
use crate::services::StockService;
use crate::AppState;

/// Receive units into a location's stock
pub async fn receive(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ReceiveInput>,
) -> AppResult<Json<AccountSummary>> {
    state.capabilities.require(&current_user.0, Module::Stock, Action::Create)?;
    input.validate()?;
    let service = StockService::new(state.db);
    let summary = service.receive(current_user.0.user_id, input).await?;
    Ok(Json(summary))
}

/// Consume available units
pub async fn consume(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ConsumeInput>,
) -> AppResult<Json<AccountSummary>> {
    state.capabilities.require(&current_user.0, Module::Stock, Action::Create)?;
    input.validate()?;
    let service = StockService::new(state.db);
    let summary = service.consume(current_user.0.user_id, input).await?;
    Ok(Json(summary))
}

pub async fn get_account(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((location_id, product_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<AccountSummary>> {
    state.capabilities.require(&current_user.0, Module::Stock, Action::Read)?;
    let service = StockService::new(state.db);
    let summary = service.account_summary(location_id, product_id).await?;
    Ok(Json(summary))
}

/// Counters for every product held at a location
pub async fn get_location_summary(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(location_id): Path<Uuid>,
) -> AppResult<Json<Vec<AccountSummary>>> {
    state.capabilities.require(&current_user.0, Module::Stock, Action::Read)?;
    let service = StockService::new(state.db);
    let summaries = service.location_summary(location_id).await?;
    Ok(Json(summaries))
}
