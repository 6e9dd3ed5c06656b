//! HTTP handlers for fault/repair record endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use shared::FaultRecord;

use crate::error::AppResult;
use crate::middleware::{Action, CurrentUser, Module};
use crate::services::fault::{DamageDecision, DamageDecisionInput, RepairReport, ReportDamageInput, ReportForRepairInput};
use crate::services::repair::{RepairStep, SendToRepairInput};
use crate::services::{FaultService, RepairService};
use crate::AppState;

/// Report damaged units, opening or extending a fault record
pub async fn report_damage(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ReportDamageInput>,
) -> AppResult<Json<FaultRecord>> {
    state.capabilities.require(&current_user.0, Module::Fault, Action::Create)?;
    input.validate()?;
    let service = FaultService::new(state.db);
    let fault = service.report_damage(current_user.0.user_id, input).await?;
    Ok(Json(fault))
}

/// Report units as needing repair straight away
pub async fn report_for_repair(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ReportForRepairInput>,
) -> AppResult<Json<RepairReport>> {
    state.capabilities.require(&current_user.0, Module::Fault, Action::Create)?;
    input.validate()?;
    let service = FaultService::new(state.db);
    let report = service.report_for_repair(current_user.0.user_id, input).await?;
    Ok(Json(report))
}

pub async fn get_fault(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(fault_id): Path<Uuid>,
) -> AppResult<Json<FaultRecord>> {
    state.capabilities.require(&current_user.0, Module::Fault, Action::Read)?;
    let service = FaultService::new(state.db);
    let fault = service.get(fault_id).await?;
    Ok(Json(fault))
}

pub async fn accept_damage(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(fault_id): Path<Uuid>,
    Json(input): Json<DamageDecisionInput>,
) -> AppResult<Json<DamageDecision>> {
    state.capabilities.require(&current_user.0, Module::Fault, Action::Approve)?;
    input.validate()?;
    let service = FaultService::new(state.db);
    let decision = service
        .accept_pending_damage(current_user.0.user_id, fault_id, input)
        .await?;
    Ok(Json(decision))
}

pub async fn reject_damage(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(fault_id): Path<Uuid>,
    Json(input): Json<DamageDecisionInput>,
) -> AppResult<Json<DamageDecision>> {
    state.capabilities.require(&current_user.0, Module::Fault, Action::Approve)?;
    input.validate()?;
    let service = FaultService::new(state.db);
    let decision = service
        .reject_pending_damage(current_user.0.user_id, fault_id, input)
        .await?;
    Ok(Json(decision))
}

/// Hand damaged units to a repair centre
pub async fn send_to_repair(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(fault_id): Path<Uuid>,
    Json(input): Json<SendToRepairInput>,
) -> AppResult<Json<RepairStep>> {
    state.capabilities.require(&current_user.0, Module::Repair, Action::Create)?;
    input.validate()?;
    let service = RepairService::new(state.db);
    let step = service
        .send_to_repair(current_user.0.user_id, fault_id, input)
        .await?;
    Ok(Json(step))
}
