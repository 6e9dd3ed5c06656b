//! HTTP handlers for transfer proposal endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use shared::{BatchSummary, ResolveOutcome, TransferProposal};

use crate::error::AppResult;
use crate::middleware::{Action, CurrentUser, Module};
use crate::services::transfer::{AttachDocumentInput, BatchInput, ProposeTransferInput, ResolveTransferInput};
use crate::services::TransferService;
use crate::AppState;

#[derive(Deserialize)]
pub struct LocationQuery {
    pub location_id: Uuid,
}

fn service(state: AppState) -> TransferService {
    TransferService::new(
        state.db,
        state.config.ledger.policy(),
        state.config.ledger.max_batch_items,
    )
}

/// Propose moving units to another location
pub async fn propose_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ProposeTransferInput>,
) -> AppResult<Json<TransferProposal>> {
    state.capabilities.require(&current_user.0, Module::Transfer, Action::Create)?;
    input.validate()?;
    let proposal = service(state).propose(current_user.0.user_id, input).await?;
    Ok(Json(proposal))
}

/// Accept or reject a pending proposal at the destination
pub async fn resolve_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(proposal_id): Path<Uuid>,
    Json(input): Json<ResolveTransferInput>,
) -> AppResult<Json<ResolveOutcome>> {
    state.capabilities.require(&current_user.0, Module::Transfer, Action::Approve)?;
    input.validate()?;
    let outcome = service(state)
        .resolve(current_user.0.user_id, proposal_id, input)
        .await?;
    Ok(Json(outcome))
}

pub async fn attach_document(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(proposal_id): Path<Uuid>,
    Json(input): Json<AttachDocumentInput>,
) -> AppResult<Json<TransferProposal>> {
    state.capabilities.require(&current_user.0, Module::Transfer, Action::Create)?;
    input.validate()?;
    let proposal = service(state)
        .attach_document(current_user.0.user_id, proposal_id, input)
        .await?;
    Ok(Json(proposal))
}

/// Resolve several proposals; failures are reported per item
pub async fn resolve_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<BatchInput>,
) -> AppResult<Json<BatchSummary>> {
    state.capabilities.require(&current_user.0, Module::Transfer, Action::Approve)?;
    let summary = service(state)
        .resolve_batch(current_user.0.user_id, input)
        .await?;
    Ok(Json(summary))
}

pub async fn list_pending(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<LocationQuery>,
) -> AppResult<Json<Vec<TransferProposal>>> {
    state.capabilities.require(&current_user.0, Module::Transfer, Action::Read)?;
    let pending = service(state).pending_for_location(query.location_id).await?;
    Ok(Json(pending))
}
