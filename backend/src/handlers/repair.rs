//! HTTP handlers for repair transfer endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::{Action, CurrentUser, Module};
use crate::services::fault::SelectionInput;
use crate::services::repair::{CompleteRepairInput, RepairCompleted, RepairStep};
use crate::services::RepairService;
use crate::AppState;

/// Repair centre takes the units in
pub async fn accept_repair_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(repair_id): Path<Uuid>,
    Json(input): Json<SelectionInput>,
) -> AppResult<Json<RepairStep>> {
    state.capabilities.require(&current_user.0, Module::Repair, Action::Approve)?;
    input.validate()?;
    let service = RepairService::new(state.db);
    let step = service.accept(current_user.0.user_id, repair_id, input).await?;
    Ok(Json(step))
}

/// Repair centre turns the units away
pub async fn reject_repair_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(repair_id): Path<Uuid>,
    Json(input): Json<SelectionInput>,
) -> AppResult<Json<RepairStep>> {
    state.capabilities.require(&current_user.0, Module::Repair, Action::Approve)?;
    input.validate()?;
    let service = RepairService::new(state.db);
    let step = service.reject(current_user.0.user_id, repair_id, input).await?;
    Ok(Json(step))
}

pub async fn complete_repair(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(repair_id): Path<Uuid>,
    Json(input): Json<CompleteRepairInput>,
) -> AppResult<Json<RepairCompleted>> {
    state.capabilities.require(&current_user.0, Module::Repair, Action::Approve)?;
    input.validate()?;
    let service = RepairService::new(state.db);
    let completed = service
        .complete(current_user.0.user_id, repair_id, input)
        .await?;
    Ok(Json(completed))
}

pub async fn scrap_repaired(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(repair_id): Path<Uuid>,
    Json(input): Json<SelectionInput>,
) -> AppResult<Json<RepairStep>> {
    state.capabilities.require(&current_user.0, Module::Repair, Action::Approve)?;
    input.validate()?;
    let service = RepairService::new(state.db);
    let step = service.scrap(current_user.0.user_id, repair_id, input).await?;
    Ok(Json(step))
}
