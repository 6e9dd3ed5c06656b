//! Repair-centre handoff, repair outcome and scrapping

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::stock::validate_stamp;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    FaultAction, FaultEvent, FaultRecord, LedgerNote, RepairTransfer, StockAccount, UnitStatus,
};
use crate::types::{Selection, Stamp, StockPayload};
use crate::validation::{check, validate_payload, validate_repair_cost};

/// Result reported by the repair centre for units under repair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub repaired: Option<StockPayload>,
    pub irreparable: Option<StockPayload>,
    pub cost: Option<Decimal>,
}

/// Units moved by a repair completion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairCompletion {
    pub repaired: Option<StockPayload>,
    pub irreparable: Option<StockPayload>,
}

/// Optional return of freshly repaired units to an outlet, proposed in the
/// same operation as the repair completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub to_location_id: Uuid,
    pub document_ref: Option<String>,
}

/// Records touched by every repair-stage operation
pub struct RepairScope<'a> {
    pub account: &'a mut StockAccount,
    pub fault: &'a mut FaultRecord,
    pub repair: &'a mut RepairTransfer,
}

impl RepairScope<'_> {
    fn check(&self) -> LedgerResult<()> {
        self.fault.ensure_open(&*self.account)?;
        self.repair.ensure_belongs(&*self.fault)
    }
}

/// Working copies of a scope, written back only on success
struct Draft {
    account: StockAccount,
    fault: FaultRecord,
    repair: RepairTransfer,
}

impl Draft {
    fn of(scope: &RepairScope<'_>) -> Self {
        Self {
            account: scope.account.clone(),
            fault: scope.fault.clone(),
            repair: scope.repair.clone(),
        }
    }

    /// Move units through all three records in step
    fn step(
        &mut self,
        from: UnitStatus,
        to: UnitStatus,
        payload: &StockPayload,
        note: &LedgerNote,
        stamp: &Stamp,
    ) -> LedgerResult<()> {
        self.fault.shift(from, to, payload)?;
        self.repair.shift(from, to, payload)?;
        self.account.transition_units(payload, from, to, note, stamp)
    }

    fn log(&mut self, event: FaultEvent, stamp: &Stamp) {
        self.repair.history.push(event.clone());
        self.fault.log(event);
        self.fault.refresh_status(stamp.at);
        self.repair.refresh_status(stamp.at);
    }

    fn commit(self, scope: &mut RepairScope<'_>) {
        *scope.account = self.account;
        *scope.fault = self.fault;
        *scope.repair = self.repair;
    }
}

/// Hand accepted damage to a repair centre: `damaged -> pending_under_repair`.
///
/// `scope.repair` is a transfer freshly opened for the fault record.
pub fn send_to_repair(scope: &mut RepairScope<'_>, selection: &Selection, stamp: &Stamp) -> LedgerResult<StockPayload> {
    validate_stamp(stamp)?;
    scope.check()?;

    let mut draft = Draft::of(scope);
    let payload = draft
        .fault
        .select(UnitStatus::Damaged, selection, UnitStatus::PendingUnderRepair)?;
    draft
        .fault
        .shift(UnitStatus::Damaged, UnitStatus::PendingUnderRepair, &payload)?;
    draft.repair.admit(&payload)?;
    let note = LedgerNote::repair(UnitStatus::PendingUnderRepair, draft.fault.id, payload.count(), stamp);
    draft
        .account
        .transition_units(&payload, UnitStatus::Damaged, UnitStatus::PendingUnderRepair, &note, stamp)?;
    let event = FaultEvent::new(FaultAction::SentToRepair, &payload, stamp).with_reference(draft.repair.id);
    draft.log(event, stamp);
    draft.commit(scope);

    info!(
        fault_record_id = %scope.fault.id,
        repair_transfer_id = %scope.repair.id,
        repair_center_id = %scope.repair.repair_center_id,
        quantity = payload.count(),
        "Units sent to repair"
    );
    Ok(payload)
}

/// The repair centre takes the units in: `pending_under_repair -> under_repair`
pub fn accept_repair_transfer(
    scope: &mut RepairScope<'_>,
    selection: &Selection,
    stamp: &Stamp,
) -> LedgerResult<StockPayload> {
    validate_stamp(stamp)?;
    scope.check()?;

    let mut draft = Draft::of(scope);
    let payload = draft
        .repair
        .select(UnitStatus::PendingUnderRepair, selection, UnitStatus::UnderRepair)?;
    let note = LedgerNote::repair(UnitStatus::UnderRepair, draft.fault.id, payload.count(), stamp);
    draft.step(UnitStatus::PendingUnderRepair, UnitStatus::UnderRepair, &payload, &note, stamp)?;
    let event = FaultEvent::new(FaultAction::RepairAccepted, &payload, stamp).with_reference(draft.repair.id);
    draft.log(event, stamp);
    draft.commit(scope);

    info!(
        repair_transfer_id = %scope.repair.id,
        quantity = payload.count(),
        status = scope.repair.status.as_str(),
        "Repair transfer accepted"
    );
    Ok(payload)
}

/// The repair centre refuses the units: `pending_under_repair -> damaged`
pub fn reject_repair_transfer(
    scope: &mut RepairScope<'_>,
    selection: &Selection,
    stamp: &Stamp,
) -> LedgerResult<StockPayload> {
    validate_stamp(stamp)?;
    scope.check()?;

    let mut draft = Draft::of(scope);
    let payload = draft
        .repair
        .select(UnitStatus::PendingUnderRepair, selection, UnitStatus::Damaged)?;
    let note = LedgerNote::repair(UnitStatus::Damaged, draft.fault.id, payload.count(), stamp);
    draft.step(UnitStatus::PendingUnderRepair, UnitStatus::Damaged, &payload, &note, stamp)?;
    let event = FaultEvent::new(FaultAction::RepairRejected, &payload, stamp).with_reference(draft.repair.id);
    draft.log(event, stamp);
    draft.commit(scope);

    info!(
        repair_transfer_id = %scope.repair.id,
        quantity = payload.count(),
        status = scope.repair.status.as_str(),
        "Repair transfer rejected"
    );
    Ok(payload)
}

/// Record the repair result, splitting units under repair into repaired
/// and irreparable
pub fn complete_repair(
    scope: &mut RepairScope<'_>,
    outcome: &RepairOutcome,
    stamp: &Stamp,
) -> LedgerResult<RepairCompletion> {
    validate_stamp(stamp)?;
    scope.check()?;
    if outcome.repaired.is_none() && outcome.irreparable.is_none() {
        return Err(LedgerError::Validation(
            "Repair outcome needs repaired or irreparable units".to_string(),
        ));
    }
    if let Some(cost) = outcome.cost {
        check(validate_repair_cost(cost))?;
    }

    let mut draft = Draft::of(scope);
    let parts = [
        (&outcome.repaired, UnitStatus::Repaired, FaultAction::Repaired),
        (&outcome.irreparable, UnitStatus::Irreparable, FaultAction::Irreparable),
    ];
    for (part, to, action) in parts {
        let Some(requested) = part else { continue };
        validate_payload(requested)?;
        let payload = draft
            .repair
            .select(UnitStatus::UnderRepair, &Selection::from(requested.clone()), to)?;
        let note = LedgerNote::repair(to, draft.fault.id, payload.count(), stamp).with_cost(outcome.cost);
        draft.step(UnitStatus::UnderRepair, to, &payload, &note, stamp)?;
        let event = FaultEvent::new(action, &payload, stamp)
            .with_reference(draft.repair.id)
            .with_cost(outcome.cost);
        draft.log(event, stamp);
    }
    if let Some(cost) = outcome.cost {
        draft.repair.total_cost += cost;
    }
    draft.commit(scope);

    info!(
        repair_transfer_id = %scope.repair.id,
        repaired = outcome.repaired.as_ref().map(|p| p.count()).unwrap_or(0),
        irreparable = outcome.irreparable.as_ref().map(|p| p.count()).unwrap_or(0),
        status = scope.repair.status.as_str(),
        "Repair completed"
    );
    Ok(RepairCompletion {
        repaired: outcome.repaired.clone(),
        irreparable: outcome.irreparable.clone(),
    })
}

/// Write off repaired units not earmarked by a transfer: `repaired -> irreparable`
pub fn scrap_repaired(scope: &mut RepairScope<'_>, selection: &Selection, stamp: &Stamp) -> LedgerResult<StockPayload> {
    validate_stamp(stamp)?;
    scope.check()?;

    let mut draft = Draft::of(scope);
    let payload = draft
        .repair
        .select(UnitStatus::Repaired, selection, UnitStatus::Irreparable)?;
    let note = LedgerNote::repair(UnitStatus::Irreparable, draft.fault.id, payload.count(), stamp);
    draft.step(UnitStatus::Repaired, UnitStatus::Irreparable, &payload, &note, stamp)?;
    let event = FaultEvent::new(FaultAction::Scrapped, &payload, stamp).with_reference(draft.repair.id);
    draft.log(event, stamp);
    draft.commit(scope);

    info!(
        repair_transfer_id = %scope.repair.id,
        quantity = payload.count(),
        "Repaired units scrapped"
    );
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::damage::accept_pending_damage;
    use crate::engine::stock::{receive, report_damage};
    use crate::models::{FaultStatus, Location, LocationKind, Product, RepairTransferStatus, SourceClass};
    use uuid::Uuid;

    struct Fixture {
        account: StockAccount,
        fault: FaultRecord,
        repair: RepairTransfer,
    }

    impl Fixture {
        fn scope(&mut self) -> RepairScope<'_> {
            RepairScope {
                account: &mut self.account,
                fault: &mut self.fault,
                repair: &mut self.repair,
            }
        }
    }

    fn serial_fixture() -> Fixture {
        let stamp = Stamp::new(Uuid::new_v4(), None);
        let mut account = StockAccount::open(
            &Location::new(LocationKind::Outlet, "Outlet"),
            &Product::serialized("ONT", "ONT"),
            stamp.at,
        );
        let serials = StockPayload::Serials(vec!["A".into(), "B".into(), "C".into()]);
        receive(&mut account, &serials, SourceClass::DirectPurchase, &stamp).unwrap();
        let mut fault = FaultRecord::open(&account, &stamp);
        report_damage(&mut account, &mut fault, &serials, &stamp).unwrap();
        accept_pending_damage(&mut account, &mut fault, &Selection::All, Uuid::new_v4(), &stamp).unwrap();
        let repair = RepairTransfer::open(&fault, Uuid::new_v4(), stamp.actor, stamp.at);
        Fixture { account, fault, repair }
    }

    #[test]
    fn test_full_repair_cycle() {
        let mut fx = serial_fixture();
        let stamp = Stamp::new(Uuid::new_v4(), None);

        send_to_repair(&mut fx.scope(), &Selection::All, &stamp).unwrap();
        assert_eq!(fx.fault.status, FaultStatus::PendingUnderRepair);
        assert_eq!(fx.account.counters.repair, 3);
        assert_eq!(fx.account.counters.damaged, 0);

        accept_repair_transfer(&mut fx.scope(), &Selection::Serials(vec!["A".into(), "B".into()]), &stamp)
            .unwrap();
        reject_repair_transfer(&mut fx.scope(), &Selection::Serials(vec!["C".into()]), &stamp).unwrap();
        assert_eq!(fx.repair.under_repair(), 2);
        assert_eq!(fx.repair.rejected(), 1);
        assert_eq!(fx.fault.status, FaultStatus::Damaged);
        assert_eq!(fx.account.unit("C").unwrap().status, UnitStatus::Damaged);

        let outcome = RepairOutcome {
            repaired: Some(StockPayload::Serials(vec!["A".into()])),
            irreparable: Some(StockPayload::Serials(vec!["B".into()])),
            cost: Some(Decimal::from(250)),
        };
        complete_repair(&mut fx.scope(), &outcome, &stamp).unwrap();
        assert_eq!(fx.repair.status, RepairTransferStatus::Repaired);
        assert_eq!(fx.repair.total_cost, Decimal::from(250));
        assert_eq!(fx.account.counters.repaired, 1);
        assert_eq!(fx.account.counters.irreparable, 1);
        assert!(fx.fault.check_conservation());
        assert!(fx.repair.check_conservation());
        assert!(fx.account.counters.is_balanced());

        let history = &fx.account.unit("A").unwrap().repair_history;
        assert_eq!(history.last().map(|e| e.repaired_qty), Some(1));
    }

    #[test]
    fn test_complete_rejects_overlap() {
        let mut fx = serial_fixture();
        let stamp = Stamp::new(Uuid::new_v4(), None);
        send_to_repair(&mut fx.scope(), &Selection::All, &stamp).unwrap();
        accept_repair_transfer(&mut fx.scope(), &Selection::All, &stamp).unwrap();

        let before = fx.repair.clone();
        let outcome = RepairOutcome {
            repaired: Some(StockPayload::Serials(vec!["A".into()])),
            irreparable: Some(StockPayload::Serials(vec!["A".into()])),
            cost: None,
        };
        let err = complete_repair(&mut fx.scope(), &outcome, &stamp).unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
        assert_eq!(fx.repair, before);
    }

    #[test]
    fn test_scrap_repaired() {
        let mut fx = serial_fixture();
        let stamp = Stamp::new(Uuid::new_v4(), None);
        send_to_repair(&mut fx.scope(), &Selection::All, &stamp).unwrap();
        accept_repair_transfer(&mut fx.scope(), &Selection::All, &stamp).unwrap();
        let outcome = RepairOutcome {
            repaired: Some(StockPayload::Serials(vec!["A".into(), "B".into(), "C".into()])),
            ..Default::default()
        };
        complete_repair(&mut fx.scope(), &outcome, &stamp).unwrap();

        scrap_repaired(&mut fx.scope(), &Selection::Serials(vec!["B".into()]), &stamp).unwrap();
        assert_eq!(fx.repair.repaired(), 2);
        assert_eq!(fx.repair.irreparable(), 1);
        assert_eq!(fx.account.unit("B").unwrap().status, UnitStatus::Irreparable);
    }

    #[test]
    fn test_repair_transfer_of_other_fault_is_refused() {
        let mut fx = serial_fixture();
        let other = serial_fixture();
        fx.repair = other.repair;
        let stamp = Stamp::new(Uuid::new_v4(), None);
        let err = send_to_repair(&mut fx.scope(), &Selection::All, &stamp).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
