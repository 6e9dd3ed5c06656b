//! Accepting or rejecting pending damage claims

use tracing::info;
use uuid::Uuid;

use super::stock::validate_stamp;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{FaultAction, FaultEvent, FaultRecord, LedgerNote, StockAccount, UnitStatus};
use crate::types::{Selection, Stamp, StockPayload};

/// Confirm pending damage claims: `pending_damage -> damaged`.
///
/// Returns the units that moved. A repeated `request_id`, or a decision on
/// all pending units when none are left, fails with `AlreadyApplied` and
/// changes nothing.
pub fn accept_pending_damage(
    account: &mut StockAccount,
    fault: &mut FaultRecord,
    selection: &Selection,
    request_id: Uuid,
    stamp: &Stamp,
) -> LedgerResult<StockPayload> {
    validate_stamp(stamp)?;
    fault.ensure_open(account)?;
    ensure_pending(fault, selection, request_id)?;

    let mut next_fault = fault.clone();
    let mut next_account = account.clone();

    next_fault.claim_request(request_id)?;
    let payload = next_fault.select(UnitStatus::PendingDamage, selection, UnitStatus::Damaged)?;
    next_fault.shift(UnitStatus::PendingDamage, UnitStatus::Damaged, &payload)?;
    next_fault.log(FaultEvent::new(FaultAction::DamageAccepted, &payload, stamp));
    next_fault.refresh_status(stamp.at);

    let note = LedgerNote::repair(UnitStatus::Damaged, fault.id, payload.count(), stamp);
    next_account.transition_units(&payload, UnitStatus::PendingDamage, UnitStatus::Damaged, &note, stamp)?;

    *fault = next_fault;
    *account = next_account;

    info!(
        fault_record_id = %fault.id,
        quantity = payload.count(),
        status = fault.status.as_str(),
        "Pending damage accepted"
    );
    Ok(payload)
}

/// Deny pending damage claims: the units leave the record and return to
/// `available` at the account. A record left empty is archived.
pub fn reject_pending_damage(
    account: &mut StockAccount,
    fault: &mut FaultRecord,
    selection: &Selection,
    request_id: Uuid,
    stamp: &Stamp,
) -> LedgerResult<StockPayload> {
    validate_stamp(stamp)?;
    fault.ensure_open(account)?;
    ensure_pending(fault, selection, request_id)?;

    let mut next_fault = fault.clone();
    let mut next_account = account.clone();

    next_fault.claim_request(request_id)?;
    let payload = next_fault.select(UnitStatus::PendingDamage, selection, UnitStatus::Available)?;
    next_fault.release(UnitStatus::PendingDamage, &payload)?;
    next_fault.log(FaultEvent::new(FaultAction::DamageRejected, &payload, stamp));
    next_fault.refresh_status(stamp.at);

    let note = LedgerNote::repair(UnitStatus::Available, fault.id, payload.count(), stamp);
    next_account.transition_units(&payload, UnitStatus::PendingDamage, UnitStatus::Available, &note, stamp)?;

    *fault = next_fault;
    *account = next_account;

    info!(
        fault_record_id = %fault.id,
        quantity = payload.count(),
        status = fault.status.as_str(),
        archived = fault.archived_at.is_some(),
        "Pending damage rejected"
    );
    Ok(payload)
}

/// An all-units decision on a record with nothing pending repeats one
/// that already went through
fn ensure_pending(fault: &FaultRecord, selection: &Selection, request_id: Uuid) -> LedgerResult<()> {
    if *selection == Selection::All && fault.count(UnitStatus::PendingDamage) == 0 {
        return Err(LedgerError::AlreadyApplied { request_id });
    }
    Ok(())
}
