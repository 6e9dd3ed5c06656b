//! Intake, consumption and damage reports against a stock account

use tracing::info;

use crate::error::LedgerResult;
use crate::models::{
    FaultAction, FaultEvent, FaultRecord, LedgerNote, RepairTransfer, SourceClass, StockAccount,
    UnitStatus,
};
use crate::types::{Stamp, StockPayload};
use crate::validation::{check, validate_payload, validate_remark};

pub(crate) fn validate_stamp(stamp: &Stamp) -> LedgerResult<()> {
    match &stamp.remark {
        Some(remark) => check(validate_remark(remark)),
        None => Ok(()),
    }
}

/// Credit received stock as available
pub fn receive(
    account: &mut StockAccount,
    payload: &StockPayload,
    class: SourceClass,
    stamp: &Stamp,
) -> LedgerResult<()> {
    validate_payload(payload)?;
    validate_stamp(stamp)?;
    account.receive(payload, class, &LedgerNote::None, stamp)?;

    info!(
        account_id = %account.id,
        location_id = %account.location_id,
        product_id = %account.product_id,
        quantity = payload.count(),
        source_class = class.as_str(),
        "Stock received"
    );
    Ok(())
}

/// Book available units as consumed in the field
pub fn consume(account: &mut StockAccount, payload: &StockPayload, stamp: &Stamp) -> LedgerResult<()> {
    validate_payload(payload)?;
    validate_stamp(stamp)?;
    account.transition_units(
        payload,
        UnitStatus::Available,
        UnitStatus::Consumed,
        &LedgerNote::None,
        stamp,
    )?;

    info!(
        account_id = %account.id,
        quantity = payload.count(),
        "Stock consumed"
    );
    Ok(())
}

/// Move available units into a damage claim on `fault`.
///
/// `fault` is either a record freshly opened for the account or an open
/// record of the same account being extended.
pub fn report_damage(
    account: &mut StockAccount,
    fault: &mut FaultRecord,
    payload: &StockPayload,
    stamp: &Stamp,
) -> LedgerResult<()> {
    validate_payload(payload)?;
    validate_stamp(stamp)?;
    fault.ensure_open(account)?;

    let mut next_fault = fault.clone();
    let mut next_account = account.clone();

    next_fault.admit(UnitStatus::PendingDamage, payload)?;
    next_fault.log(FaultEvent::new(FaultAction::Reported, payload, stamp));
    next_fault.refresh_status(stamp.at);

    let note = LedgerNote::repair(UnitStatus::PendingDamage, fault.id, payload.count(), stamp);
    next_account.transition_units(payload, UnitStatus::Available, UnitStatus::PendingDamage, &note, stamp)?;

    *fault = next_fault;
    *account = next_account;

    info!(
        fault_record_id = %fault.id,
        account_id = %account.id,
        quantity = payload.count(),
        damage_qty = fault.damage_qty,
        "Damage reported"
    );
    Ok(())
}

/// Report available units straight for repair: the record starts in
/// `pending_under_repair` with a repair transfer awaiting the centre
pub fn report_for_repair(
    account: &mut StockAccount,
    fault: &mut FaultRecord,
    repair: &mut RepairTransfer,
    payload: &StockPayload,
    stamp: &Stamp,
) -> LedgerResult<()> {
    validate_payload(payload)?;
    validate_stamp(stamp)?;
    fault.ensure_open(account)?;
    repair.ensure_belongs(fault)?;

    let mut next_fault = fault.clone();
    let mut next_repair = repair.clone();
    let mut next_account = account.clone();

    next_fault.admit(UnitStatus::PendingUnderRepair, payload)?;
    next_fault.log(FaultEvent::new(FaultAction::RepairReported, payload, stamp).with_reference(repair.id));
    next_fault.refresh_status(stamp.at);

    next_repair.admit(payload)?;
    next_repair
        .history
        .push(FaultEvent::new(FaultAction::SentToRepair, payload, stamp));
    next_repair.refresh_status(stamp.at);

    let note = LedgerNote::repair(UnitStatus::PendingUnderRepair, fault.id, payload.count(), stamp);
    next_account.transition_units(
        payload,
        UnitStatus::Available,
        UnitStatus::PendingUnderRepair,
        &note,
        stamp,
    )?;

    *fault = next_fault;
    *repair = next_repair;
    *account = next_account;

    info!(
        fault_record_id = %fault.id,
        repair_transfer_id = %repair.id,
        account_id = %account.id,
        quantity = payload.count(),
        "Units reported for repair"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FaultStatus, Location, LocationKind, Product};
    use uuid::Uuid;

    fn serial_account() -> StockAccount {
        let stamp = Stamp::new(Uuid::new_v4(), None);
        let mut account = StockAccount::open(
            &Location::new(LocationKind::Outlet, "Outlet"),
            &Product::serialized("ONT-1", "ONT"),
            stamp.at,
        );
        receive(
            &mut account,
            &StockPayload::Serials(vec!["SN-1".into(), "SN-2".into()]),
            SourceClass::DirectPurchase,
            &stamp,
        )
        .unwrap();
        account
    }

    #[test]
    fn test_report_damage_moves_serial() {
        let mut account = serial_account();
        let stamp = Stamp::new(Uuid::new_v4(), Some("cracked casing".into()));
        let mut fault = FaultRecord::open(&account, &stamp);

        report_damage(&mut account, &mut fault, &StockPayload::Serials(vec!["SN-1".into()]), &stamp)
            .unwrap();

        assert_eq!(account.unit("SN-1").unwrap().status, UnitStatus::PendingDamage);
        assert_eq!(account.counters.available, 1);
        assert_eq!(account.counters.damaged, 1);
        assert_eq!(fault.status, FaultStatus::PendingDamage);
        assert_eq!(fault.damage_qty, 1);
        assert_eq!(fault.pending_damage_history.len(), 1);
    }

    #[test]
    fn test_report_damage_failure_leaves_records() {
        let mut account = serial_account();
        let stamp = Stamp::new(Uuid::new_v4(), None);
        let mut fault = FaultRecord::open(&account, &stamp);
        let (account_before, fault_before) = (account.clone(), fault.clone());

        let err = report_damage(
            &mut account,
            &mut fault,
            &StockPayload::Serials(vec!["SN-1".into(), "SN-404".into()]),
            &stamp,
        )
        .unwrap_err();
        assert_eq!(err.code(), "RECORD_NOT_FOUND");
        assert_eq!(account, account_before);
        assert_eq!(fault, fault_before);
    }

    #[test]
    fn test_consume_bulk_insufficient() {
        let stamp = Stamp::new(Uuid::new_v4(), None);
        let mut account = StockAccount::open(
            &Location::new(LocationKind::Center, "Center"),
            &Product::bulk("CBL", "Cable"),
            stamp.at,
        );
        receive(&mut account, &StockPayload::Quantity(3), SourceClass::DirectPurchase, &stamp).unwrap();
        let err = consume(&mut account, &StockPayload::Quantity(4), &stamp).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_AVAILABLE");
        consume(&mut account, &StockPayload::Quantity(3), &stamp).unwrap();
        assert_eq!(account.counters.consumed, 3);
        assert!(account.counters.is_balanced());
    }

    #[test]
    fn test_report_for_repair_starts_pending_under_repair() {
        let mut account = serial_account();
        let stamp = Stamp::new(Uuid::new_v4(), None);
        let mut fault = FaultRecord::open(&account, &stamp);
        let mut repair = RepairTransfer::open(&fault, Uuid::new_v4(), stamp.actor, stamp.at);

        report_for_repair(
            &mut account,
            &mut fault,
            &mut repair,
            &StockPayload::Serials(vec!["SN-2".into()]),
            &stamp,
        )
        .unwrap();
        assert_eq!(fault.status, FaultStatus::PendingUnderRepair);
        assert_eq!(repair.pending(), 1);
        assert_eq!(account.counters.repair, 1);
        assert_eq!(account.unit("SN-2").unwrap().status, UnitStatus::PendingUnderRepair);
    }
}
