//! Proposing and resolving transfers between stock accounts
//!
//! A proposal moves units out of the source's origin bucket into
//! `pending_outgoing` and raises `pending_incoming` at the destination in
//! the same step. Resolution clears both sides together. Repaired-origin
//! proposals also earmark the units on their fault record and repair
//! transfer until the destination decides.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::stock::validate_stamp;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Bucket, FaultAction, FaultEvent, FaultRecord, LedgerNote, ProposalItems, ProposalStatus, RepairTransfer,
    StockAccount, TransferKind, TransferPolicy, TransferProposal, TransferRecord, UnitStatus,
};
use crate::types::{Decision, Selection, Stamp, StockPayload};
use crate::validation::{check, validate_document_ref, validate_payload, validate_remark};

/// Caller input for a new proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalDraft {
    pub kind: TransferKind,
    pub product_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub payload: StockPayload,
    /// Required for repaired-origin kinds
    pub repair_transfer_id: Option<Uuid>,
    pub document_ref: Option<String>,
}

/// Repair records a repaired-origin proposal draws from
pub struct Upstream<'a> {
    pub fault: &'a mut FaultRecord,
    pub repair: &'a mut RepairTransfer,
}

/// Result of resolving part or all of a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOutcome {
    pub proposal_id: Uuid,
    pub decision: Decision,
    pub quantity: i64,
    pub serials: Vec<String>,
    pub status: ProposalStatus,
    pub remaining: i64,
}

/// Check that the accounts handed in are the ones the transfer names.
/// `destination` is `None` exactly when the transfer stays at the source location.
fn check_accounts(
    source: &StockAccount,
    destination: Option<&StockAccount>,
    product_id: Uuid,
    from_location_id: Uuid,
    to_location_id: Uuid,
) -> LedgerResult<()> {
    if source.product_id != product_id || source.location_id != from_location_id {
        return Err(LedgerError::Validation(format!(
            "Source account {} does not match the transfer",
            source.key()
        )));
    }
    match destination {
        Some(dest) => {
            if dest.product_id != product_id || dest.location_id != to_location_id {
                return Err(LedgerError::Validation(format!(
                    "Destination account {} does not match the transfer",
                    dest.key()
                )));
            }
            if dest.location_id == source.location_id {
                return Err(LedgerError::Validation(
                    "Same-location transfers use the source account as destination".to_string(),
                ));
            }
        }
        None if to_location_id != from_location_id => {
            return Err(LedgerError::Validation(
                "Destination account is required".to_string(),
            ))
        }
        None => {}
    }
    Ok(())
}

fn check_upstream(
    kind: TransferKind,
    source: &StockAccount,
    upstream: Option<&Upstream<'_>>,
    fault_record_id: Option<Uuid>,
    repair_transfer_id: Option<Uuid>,
) -> LedgerResult<()> {
    match (kind.is_repaired_origin(), upstream) {
        (false, None) => Ok(()),
        (false, Some(_)) => Err(LedgerError::Validation(format!(
            "{} transfers do not draw on repair records",
            kind
        ))),
        (true, None) => Err(LedgerError::Validation(format!(
            "{} transfers need a repair transfer",
            kind
        ))),
        (true, Some(up)) => {
            up.repair.ensure_belongs(&*up.fault)?;
            up.fault.ensure_open(source)?;
            if repair_transfer_id != Some(up.repair.id) {
                return Err(LedgerError::Validation(format!(
                    "Repair transfer {} is not the one named by the transfer",
                    up.repair.id
                )));
            }
            if let Some(fault_id) = fault_record_id {
                if fault_id != up.fault.id {
                    return Err(LedgerError::Validation(format!(
                        "Fault record {} is not the one named by the transfer",
                        up.fault.id
                    )));
                }
            }
            Ok(())
        }
    }
}

fn transfer_note(
    proposal: &TransferProposal,
    status: ProposalStatus,
    quantity: i64,
    remark: Option<String>,
    stamp: &Stamp,
) -> LedgerNote {
    LedgerNote::Transfer(TransferRecord {
        proposal_id: proposal.id,
        transfer_type: proposal.kind,
        from_location: proposal.from_location_id,
        to_location: proposal.to_location_id,
        transfer_status: status,
        quantity,
        actor: stamp.actor,
        recorded_at: stamp.at,
        remark,
    })
}

/// Open a proposal and reserve its units on both sides.
///
/// `destination` is `None` for a repair return to the location already
/// holding the units.
pub fn propose_transfer(
    source: &mut StockAccount,
    destination: Option<&mut StockAccount>,
    upstream: Option<Upstream<'_>>,
    draft: &ProposalDraft,
    stamp: &Stamp,
) -> LedgerResult<TransferProposal> {
    validate_payload(&draft.payload)?;
    validate_stamp(stamp)?;
    if let Some(reference) = &draft.document_ref {
        check(validate_document_ref(reference))?;
    }
    source.check_payload(&draft.payload)?;
    check_accounts(
        source,
        destination.as_deref(),
        draft.product_id,
        draft.from_location_id,
        draft.to_location_id,
    )?;
    let destination_kind = destination
        .as_ref()
        .map(|dest| dest.location_kind)
        .unwrap_or(source.location_kind);
    let same_location = destination.is_none();
    if !draft.kind.allows(source.location_kind, destination_kind, same_location) {
        return Err(LedgerError::Validation(format!(
            "A {} transfer cannot run from a {} to a {}",
            draft.kind, source.location_kind, destination_kind
        )));
    }
    check_upstream(
        draft.kind,
        source,
        upstream.as_ref(),
        None,
        draft.repair_transfer_id,
    )?;

    let quantity = draft.payload.count();
    let proposal = TransferProposal {
        id: Uuid::new_v4(),
        kind: draft.kind,
        product_id: draft.product_id,
        from_location_id: draft.from_location_id,
        to_location_id: draft.to_location_id,
        is_serialized: source.tracks_serial_number,
        fault_record_id: upstream.as_ref().map(|up| up.fault.id),
        repair_transfer_id: upstream.as_ref().map(|up| up.repair.id),
        quantity,
        pending: ProposalItems::from_payload(&draft.payload),
        accepted: ProposalItems::default(),
        rejected: ProposalItems::default(),
        status: ProposalStatus::Pending,
        document_ref: draft.document_ref.clone(),
        remark: stamp.remark.clone(),
        rejection_reason: None,
        transferred_by: stamp.actor,
        transfer_date: stamp.at,
        accepted_by: None,
        rejected_by: None,
        resolved_at: None,
        updated_at: stamp.at,
    };

    let mut next_source = source.clone();
    let mut next_destination = destination.as_deref().cloned();
    let mut next_upstream = upstream
        .as_ref()
        .map(|up| (up.fault.clone(), up.repair.clone()));

    let origin = draft.kind.origin_status();
    let note = transfer_note(&proposal, ProposalStatus::Pending, quantity, stamp.remark.clone(), stamp);
    next_source.transition_units(&draft.payload, origin, UnitStatus::PendingTransfer, &note, stamp)?;
    next_source.track_proposal(proposal.id);

    if let Some((fault, repair)) = next_upstream.as_mut() {
        let selection = Selection::from(draft.payload.clone());
        fault.select(UnitStatus::Repaired, &selection, UnitStatus::PendingTransfer)?;
        repair.select(UnitStatus::Repaired, &selection, UnitStatus::PendingTransfer)?;
        fault.shift(UnitStatus::Repaired, UnitStatus::PendingTransfer, &draft.payload)?;
        repair.shift(UnitStatus::Repaired, UnitStatus::PendingTransfer, &draft.payload)?;
        let event = FaultEvent::new(FaultAction::TransferProposed, &draft.payload, stamp).with_reference(proposal.id);
        repair.history.push(event.clone());
        fault.log(event);
        fault.refresh_status(stamp.at);
        repair.refresh_status(stamp.at);
    }

    let target = next_destination.as_mut().unwrap_or(&mut next_source);
    target.counters.pending_incoming += quantity;
    target.track_proposal(proposal.id);
    target.touch(stamp.at);

    *source = next_source;
    if let (Some(dest), Some(next)) = (destination, next_destination) {
        *dest = next;
    }
    if let (Some(up), Some((fault, repair))) = (upstream, next_upstream) {
        *up.fault = fault;
        *up.repair = repair;
    }

    info!(
        proposal_id = %proposal.id,
        kind = proposal.kind.as_str(),
        from_location_id = %proposal.from_location_id,
        to_location_id = %proposal.to_location_id,
        quantity,
        "Transfer proposed"
    );
    Ok(proposal)
}

/// Accept or reject part or all of a pending proposal.
///
/// Accepting moves the units out of the source and credits them as
/// available at the destination; a same-location return makes them
/// available in place. Rejecting returns them to the status they left from. Either way both pending counters drop by the resolved
/// quantity. A proposal that is no longer pending fails with
/// `ProposalNotPending`.
#[allow(clippy::too_many_arguments)]
pub fn resolve_transfer(
    proposal: &mut TransferProposal,
    source: &mut StockAccount,
    destination: Option<&mut StockAccount>,
    upstream: Option<Upstream<'_>>,
    decision: Decision,
    selection: &Selection,
    reason: Option<&str>,
    policy: &TransferPolicy,
    stamp: &Stamp,
) -> LedgerResult<ResolveOutcome> {
    proposal.ensure_pending()?;
    validate_stamp(stamp)?;
    if let Some(reason) = reason {
        check(validate_remark(reason))?;
    }
    check_accounts(
        source,
        destination.as_deref(),
        proposal.product_id,
        proposal.from_location_id,
        proposal.to_location_id,
    )?;
    check_upstream(
        proposal.kind,
        source,
        upstream.as_ref(),
        proposal.fault_record_id,
        proposal.repair_transfer_id,
    )?;
    if decision == Decision::Accept
        && policy.requires_document(proposal.kind)
        && proposal.document_ref.is_none()
    {
        return Err(LedgerError::MissingDocument {
            proposal_id: proposal.id,
        });
    }

    let payload = proposal.select(selection)?;
    let quantity = payload.count();

    let mut next_proposal = proposal.clone();
    let mut next_source = source.clone();
    let mut next_destination = destination.as_deref().cloned();
    let mut next_upstream = upstream
        .as_ref()
        .map(|up| (up.fault.clone(), up.repair.clone()));

    // A return to the holding outlet never leaves the account
    let in_place = next_destination.is_none();
    let (status, unit_target, stage_target, action) = match decision {
        Decision::Accept => (
            ProposalStatus::Accepted,
            if in_place { UnitStatus::Available } else { UnitStatus::Transferred },
            UnitStatus::Transferred,
            FaultAction::Delivered,
        ),
        Decision::Reject => (
            ProposalStatus::Rejected,
            proposal.kind.origin_status(),
            UnitStatus::Repaired,
            FaultAction::TransferReleased,
        ),
    };
    let remark = reason.map(str::to_string).or_else(|| stamp.remark.clone());
    let note = transfer_note(proposal, status, quantity, remark, stamp);

    next_source.transition_units(&payload, UnitStatus::PendingTransfer, unit_target, &note, stamp)?;

    if let Some((fault, repair)) = next_upstream.as_mut() {
        fault.shift(UnitStatus::PendingTransfer, stage_target, &payload)?;
        repair.shift(UnitStatus::PendingTransfer, stage_target, &payload)?;
        let event = FaultEvent::new(action, &payload, stamp).with_reference(proposal.id);
        repair.history.push(event.clone());
        fault.log(event);
        fault.refresh_status(stamp.at);
        repair.refresh_status(stamp.at);
    }

    {
        let target = next_destination.as_mut().unwrap_or(&mut next_source);
        target.counters.take(Bucket::PendingIncoming, quantity)?;
        if decision == Decision::Accept && !in_place {
            target.receive(&payload, proposal.kind.destination_class(), &note, stamp)?;
        }
        target.touch(stamp.at);
    }

    next_proposal.settle(decision, &payload, reason, stamp);
    if next_proposal.status != ProposalStatus::Pending {
        next_source.untrack_proposal(proposal.id);
        if let Some(dest) = next_destination.as_mut() {
            dest.untrack_proposal(proposal.id);
        }
    }

    *proposal = next_proposal;
    *source = next_source;
    if let (Some(dest), Some(next)) = (destination, next_destination) {
        *dest = next;
    }
    if let (Some(up), Some((fault, repair))) = (upstream, next_upstream) {
        *up.fault = fault;
        *up.repair = repair;
    }

    info!(
        proposal_id = %proposal.id,
        decision = decision.as_str(),
        quantity,
        status = proposal.status.as_str(),
        remaining = proposal.pending.quantity,
        "Transfer resolved"
    );
    Ok(ResolveOutcome {
        proposal_id: proposal.id,
        decision,
        quantity,
        serials: payload.serials().to_vec(),
        status: proposal.status,
        remaining: proposal.pending.quantity,
    })
}

/// Attach the challan/document reference required before acceptance
pub fn attach_document(proposal: &mut TransferProposal, reference: &str, stamp: &Stamp) -> LedgerResult<()> {
    proposal.ensure_pending()?;
    check(validate_document_ref(reference))?;
    proposal.document_ref = Some(reference.trim().to_string());
    proposal.updated_at = stamp.at;

    info!(proposal_id = %proposal.id, "Transfer document attached");
    Ok(())
}
