//! End-to-end ledger scenarios
//!
//! Each scenario drives the shared engine through `MemoryLedger`, which
//! applies the same reconciliation functions the server runs inside a
//! database transaction.

use shared::{
    BatchItem, Decision, FaultStatus, Location, LocationKind, MemoryLedger, Product, ProposalDraft, ProposalStatus,
    Selection, SourceClass, Stamp, StockPayload, TransferKind, TransferPolicy, UnitStatus,
};
use uuid::Uuid;

struct Network {
    ledger: MemoryLedger,
    center: Uuid,
    outlet: Uuid,
    reseller: Uuid,
    modem: Uuid,
    cable: Uuid,
    stamp: Stamp,
}

fn network() -> Network {
    network_with(TransferPolicy::default())
}

fn network_with(policy: TransferPolicy) -> Network {
    let mut ledger = MemoryLedger::new(policy);
    let center = ledger.add_location(Location::new(LocationKind::Center, "Central store"));
    let outlet = ledger.add_location(Location::new(LocationKind::Outlet, "North outlet"));
    let reseller = ledger.add_location(Location::new(LocationKind::Reseller, "Reseller one"));
    let modem = ledger.add_product(Product::serialized("MDM-100", "Modem"));
    let cable = ledger.add_product(Product::bulk("CBL-5M", "Cable 5m"));
    Network {
        ledger,
        center,
        outlet,
        reseller,
        modem,
        cable,
        stamp: Stamp::new(Uuid::new_v4(), None),
    }
}

fn draft(kind: TransferKind, product_id: Uuid, from: Uuid, to: Uuid, payload: StockPayload) -> ProposalDraft {
    ProposalDraft {
        kind,
        product_id,
        from_location_id: from,
        to_location_id: to,
        payload,
        repair_transfer_id: None,
        document_ref: None,
    }
}

fn serials(list: &[&str]) -> StockPayload {
    StockPayload::Serials(list.iter().map(|s| s.to_string()).collect())
}

// ============================================================================
// Scenario A: propose then accept a bulk transfer
// ============================================================================

#[test]
fn test_scenario_a_transfer_accept() {
    let mut n = network();
    let stamp = n.stamp.clone();
    n.ledger
        .receive(n.center, n.cable, &StockPayload::Quantity(10), SourceClass::DirectPurchase, &stamp)
        .unwrap();

    let proposal = n
        .ledger
        .propose_transfer(
            &draft(TransferKind::Replenishment, n.cable, n.center, n.outlet, StockPayload::Quantity(4)),
            &stamp,
        )
        .unwrap();

    let source = n.ledger.account(n.center, n.cable).unwrap();
    assert_eq!(source.counters.available, 6);
    assert_eq!(source.counters.pending_outgoing, 4);
    let destination = n.ledger.account(n.outlet, n.cable).unwrap();
    assert_eq!(destination.counters.pending_incoming, 4);
    assert_eq!(destination.counters.available, 0);

    let outcome = n
        .ledger
        .resolve_transfer(proposal.id, Decision::Accept, &Selection::All, None, &stamp)
        .unwrap();
    assert_eq!(outcome.quantity, 4);
    assert_eq!(outcome.status, ProposalStatus::Accepted);

    let source = n.ledger.account(n.center, n.cable).unwrap();
    assert_eq!(source.counters.pending_outgoing, 0);
    assert_eq!(source.counters.transferred_out, 4);
    assert!(source.counters.is_balanced());
    let destination = n.ledger.account(n.outlet, n.cable).unwrap();
    assert_eq!(destination.counters.available, 4);
    assert_eq!(destination.counters.pending_incoming, 0);
    assert_eq!(destination.source_breakdown.stock_transfer, 4);
}

#[test]
fn test_scenario_a_transfer_reject_restores_source() {
    let mut n = network();
    let stamp = n.stamp.clone();
    n.ledger
        .receive(n.center, n.cable, &StockPayload::Quantity(10), SourceClass::DirectPurchase, &stamp)
        .unwrap();
    let proposal = n
        .ledger
        .propose_transfer(
            &draft(TransferKind::Replenishment, n.cable, n.center, n.outlet, StockPayload::Quantity(4)),
            &stamp,
        )
        .unwrap();

    n.ledger
        .resolve_transfer(proposal.id, Decision::Reject, &Selection::All, Some("damaged packaging"), &stamp)
        .unwrap();

    let source = n.ledger.account(n.center, n.cable).unwrap();
    assert_eq!(source.counters.available, 10);
    assert_eq!(source.counters.pending_outgoing, 0);
    let destination = n.ledger.account(n.outlet, n.cable).unwrap();
    assert_eq!(destination.counters.pending_incoming, 0);
    let proposal = n.ledger.proposal(proposal.id).unwrap();
    assert_eq!(proposal.status, ProposalStatus::Rejected);
    assert_eq!(proposal.rejection_reason.as_deref(), Some("damaged packaging"));
}

#[test]
fn test_reject_more_than_proposed_fails() {
    let mut n = network();
    let stamp = n.stamp.clone();
    n.ledger
        .receive(n.center, n.cable, &StockPayload::Quantity(10), SourceClass::DirectPurchase, &stamp)
        .unwrap();
    let proposal = n
        .ledger
        .propose_transfer(
            &draft(TransferKind::Replenishment, n.cable, n.center, n.outlet, StockPayload::Quantity(4)),
            &stamp,
        )
        .unwrap();

    let err = n
        .ledger
        .resolve_transfer(proposal.id, Decision::Reject, &Selection::Quantity(5), None, &stamp)
        .unwrap_err();
    assert_eq!(err.code(), "EXCEEDS_PENDING");
    assert_eq!(n.ledger.account(n.center, n.cable).unwrap().counters.pending_outgoing, 4);
}

// ============================================================================
// Scenario B: damage claim on a serial, then rejected
// ============================================================================

#[test]
fn test_scenario_b_rejected_damage_claim() {
    let mut n = network();
    let stamp = n.stamp.clone();
    n.ledger
        .receive(n.outlet, n.modem, &serials(&["SN-1", "SN-2"]), SourceClass::DirectPurchase, &stamp)
        .unwrap();

    let fault_id = n
        .ledger
        .report_damage(n.outlet, n.modem, &serials(&["SN-1"]), None, &stamp)
        .unwrap();
    let account = n.ledger.account(n.outlet, n.modem).unwrap();
    assert_eq!(account.unit("SN-1").unwrap().status, UnitStatus::PendingDamage);
    assert_eq!(account.counters.available, 1);
    assert_eq!(account.counters.damaged, 1);

    n.ledger
        .reject_pending_damage(fault_id, &Selection::Serials(vec!["SN-1".into()]), Uuid::new_v4(), &stamp)
        .unwrap();

    let fault = n.ledger.fault(fault_id).unwrap();
    assert_eq!(fault.damage_qty, 0);
    assert!(fault.stages.stage_of("SN-1").is_none());
    assert_eq!(fault.status, FaultStatus::Rejected);
    assert!(fault.archived_at.is_some());
    let account = n.ledger.account(n.outlet, n.modem).unwrap();
    assert_eq!(account.unit("SN-1").unwrap().status, UnitStatus::Available);
    assert_eq!(account.counters.available, 2);
    assert_eq!(account.counters.damaged, 0);
}

#[test]
fn test_archived_fault_record_cannot_be_extended() {
    let mut n = network();
    let stamp = n.stamp.clone();
    n.ledger
        .receive(n.outlet, n.modem, &serials(&["SN-1", "SN-2"]), SourceClass::DirectPurchase, &stamp)
        .unwrap();
    let fault_id = n
        .ledger
        .report_damage(n.outlet, n.modem, &serials(&["SN-1"]), None, &stamp)
        .unwrap();
    n.ledger
        .reject_pending_damage(fault_id, &Selection::All, Uuid::new_v4(), &stamp)
        .unwrap();

    let err = n
        .ledger
        .report_damage(n.outlet, n.modem, &serials(&["SN-2"]), Some(fault_id), &stamp)
        .unwrap_err();
    assert_eq!(err.code(), "RECORD_ARCHIVED");
    assert_eq!(n.ledger.account(n.outlet, n.modem).unwrap().counters.available, 2);
}

// ============================================================================
// Scenario C: partial acceptance of a bulk damage claim
// ============================================================================

#[test]
fn test_scenario_c_partial_damage_acceptance() {
    let mut n = network();
    let stamp = n.stamp.clone();
    n.ledger
        .receive(n.outlet, n.cable, &StockPayload::Quantity(20), SourceClass::DirectPurchase, &stamp)
        .unwrap();
    let fault_id = n
        .ledger
        .report_damage(n.outlet, n.cable, &StockPayload::Quantity(5), None, &stamp)
        .unwrap();
    assert_eq!(n.ledger.fault(fault_id).unwrap().damage_qty, 5);
    assert_eq!(n.ledger.fault(fault_id).unwrap().count(UnitStatus::PendingDamage), 5);

    n.ledger
        .accept_pending_damage(fault_id, &Selection::Quantity(3), Uuid::new_v4(), &stamp)
        .unwrap();
    let fault = n.ledger.fault(fault_id).unwrap();
    assert_eq!(fault.count(UnitStatus::PendingDamage), 2);
    assert_eq!(fault.count(UnitStatus::Damaged), 3);
    assert_eq!(fault.status, FaultStatus::PendingDamage);

    n.ledger
        .accept_pending_damage(fault_id, &Selection::Quantity(2), Uuid::new_v4(), &stamp)
        .unwrap();
    let fault = n.ledger.fault(fault_id).unwrap();
    assert_eq!(fault.count(UnitStatus::PendingDamage), 0);
    assert_eq!(fault.count(UnitStatus::Damaged), 5);
    assert_eq!(fault.status, FaultStatus::Damaged);
    assert!(fault.check_conservation());
}

#[test]
fn test_accepting_more_than_pending_fails() {
    let mut n = network();
    let stamp = n.stamp.clone();
    n.ledger
        .receive(n.outlet, n.cable, &StockPayload::Quantity(20), SourceClass::DirectPurchase, &stamp)
        .unwrap();
    let fault_id = n
        .ledger
        .report_damage(n.outlet, n.cable, &StockPayload::Quantity(5), None, &stamp)
        .unwrap();

    let err = n
        .ledger
        .accept_pending_damage(fault_id, &Selection::Quantity(6), Uuid::new_v4(), &stamp)
        .unwrap_err();
    assert_eq!(err.code(), "EXCEEDS_PENDING");
    assert_eq!(n.ledger.fault(fault_id).unwrap().count(UnitStatus::PendingDamage), 5);
}

#[test]
fn test_repeated_request_id_is_not_applied_twice() {
    let mut n = network();
    let stamp = n.stamp.clone();
    n.ledger
        .receive(n.outlet, n.cable, &StockPayload::Quantity(20), SourceClass::DirectPurchase, &stamp)
        .unwrap();
    let fault_id = n
        .ledger
        .report_damage(n.outlet, n.cable, &StockPayload::Quantity(5), None, &stamp)
        .unwrap();
    let request_id = Uuid::new_v4();

    n.ledger
        .accept_pending_damage(fault_id, &Selection::Quantity(2), request_id, &stamp)
        .unwrap();
    let err = n
        .ledger
        .accept_pending_damage(fault_id, &Selection::Quantity(2), request_id, &stamp)
        .unwrap_err();
    assert_eq!(err.code(), "ALREADY_APPLIED");
    assert_eq!(n.ledger.fault(fault_id).unwrap().count(UnitStatus::Damaged), 2);
}

#[test]
fn test_retried_accept_all_moves_nothing_twice() {
    let mut n = network();
    let stamp = n.stamp.clone();
    n.ledger
        .receive(n.outlet, n.modem, &serials(&["SN-1", "SN-2", "SN-3"]), SourceClass::DirectPurchase, &stamp)
        .unwrap();
    let fault_id = n
        .ledger
        .report_damage(n.outlet, n.modem, &serials(&["SN-1", "SN-2"]), None, &stamp)
        .unwrap();

    let moved = n
        .ledger
        .accept_pending_damage(fault_id, &Selection::All, Uuid::new_v4(), &stamp)
        .unwrap();
    assert_eq!(moved.count(), 2);

    // The client lost the response and retries under a new request id
    let err = n
        .ledger
        .accept_pending_damage(fault_id, &Selection::All, Uuid::new_v4(), &stamp)
        .unwrap_err();
    assert_eq!(err.code(), "ALREADY_APPLIED");
    assert!(err.is_replay());

    let fault = n.ledger.fault(fault_id).unwrap();
    assert_eq!(fault.count(UnitStatus::Damaged), 2);
    assert!(fault.check_conservation());
    let account = n.ledger.account(n.outlet, n.modem).unwrap();
    assert_eq!(account.counters.damaged, 2);
    assert_eq!(account.counters.available, 1);
    assert!(account.counters.is_balanced());
}

// ============================================================================
// Scenario D: batch with one failing item
// ============================================================================

#[test]
fn test_scenario_d_batch_continues_past_failures() {
    let mut n = network();
    let stamp = n.stamp.clone();
    n.ledger
        .receive(n.center, n.cable, &StockPayload::Quantity(30), SourceClass::DirectPurchase, &stamp)
        .unwrap();
    let ids: Vec<Uuid> = (0..3)
        .map(|_| {
            n.ledger
                .propose_transfer(
                    &draft(TransferKind::CenterReturn, n.cable, n.center, n.reseller, StockPayload::Quantity(5)),
                    &stamp,
                )
                .unwrap()
                .id
        })
        .collect();

    let items = vec![
        BatchItem {
            proposal_id: ids[0],
            decision: Decision::Accept,
            quantity: None,
            serials: None,
            reason: None,
            destination_location_id: Some(n.reseller),
        },
        BatchItem {
            proposal_id: ids[1],
            decision: Decision::Accept,
            quantity: None,
            serials: None,
            reason: None,
            destination_location_id: Some(Uuid::new_v4()),
        },
        BatchItem {
            proposal_id: ids[2],
            decision: Decision::Reject,
            quantity: None,
            serials: None,
            reason: Some("over stocked".into()),
            destination_location_id: None,
        },
    ];

    let summary = n.ledger.resolve_batch(&items, &stamp).unwrap();
    assert_eq!(summary.results.len(), 2);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].index, 1);
    assert_eq!(summary.errors[0].proposal_id, ids[1]);
    assert_eq!(summary.errors[0].code, "RECORD_NOT_FOUND");

    assert_eq!(n.ledger.proposal(ids[0]).unwrap().status, ProposalStatus::Accepted);
    assert_eq!(n.ledger.proposal(ids[1]).unwrap().status, ProposalStatus::Pending);
    assert_eq!(n.ledger.proposal(ids[2]).unwrap().status, ProposalStatus::Rejected);

    let center = n.ledger.account(n.center, n.cable).unwrap();
    assert_eq!(center.counters.available, 20);
    assert_eq!(center.counters.pending_outgoing, 5);
    assert_eq!(center.counters.transferred_out, 5);
    let reseller = n.ledger.account(n.reseller, n.cable).unwrap();
    assert_eq!(reseller.counters.available, 5);
    assert_eq!(reseller.counters.pending_incoming, 5);
    assert_eq!(reseller.source_breakdown.center_return, 5);
}

#[test]
fn test_batch_over_limit_is_refused() {
    let n = network();
    let mut ledger = n.ledger.with_max_batch_items(1);
    let item = BatchItem {
        proposal_id: Uuid::new_v4(),
        decision: Decision::Accept,
        quantity: None,
        serials: None,
        reason: None,
        destination_location_id: None,
    };
    let err = ledger.resolve_batch(&[item.clone(), item], &n.stamp).unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
}

// ============================================================================
// Documents and idempotency
// ============================================================================

#[test]
fn test_document_required_before_accept() {
    let mut n = network_with(TransferPolicy {
        require_document_for: vec![TransferKind::CenterReturn],
    });
    let stamp = n.stamp.clone();
    n.ledger
        .receive(n.center, n.cable, &StockPayload::Quantity(10), SourceClass::DirectPurchase, &stamp)
        .unwrap();
    let proposal = n
        .ledger
        .propose_transfer(
            &draft(TransferKind::CenterReturn, n.cable, n.center, n.reseller, StockPayload::Quantity(3)),
            &stamp,
        )
        .unwrap();

    let err = n
        .ledger
        .resolve_transfer(proposal.id, Decision::Accept, &Selection::All, None, &stamp)
        .unwrap_err();
    assert_eq!(err.code(), "MISSING_DOCUMENT");

    n.ledger
        .attach_document(proposal.id, "challan/2024/0042.pdf", &stamp)
        .unwrap();
    n.ledger
        .resolve_transfer(proposal.id, Decision::Accept, &Selection::All, None, &stamp)
        .unwrap();
    assert_eq!(n.ledger.account(n.reseller, n.cable).unwrap().counters.available, 3);
}

#[test]
fn test_second_resolve_reports_not_pending() {
    let mut n = network();
    let stamp = n.stamp.clone();
    n.ledger
        .receive(n.center, n.modem, &serials(&["M-1", "M-2"]), SourceClass::DirectPurchase, &stamp)
        .unwrap();
    let proposal = n
        .ledger
        .propose_transfer(
            &draft(TransferKind::Replenishment, n.modem, n.center, n.outlet, serials(&["M-1", "M-2"])),
            &stamp,
        )
        .unwrap();

    n.ledger
        .resolve_transfer(proposal.id, Decision::Accept, &Selection::All, None, &stamp)
        .unwrap();
    let after_first = n.ledger.account(n.outlet, n.modem).unwrap().clone();

    let err = n
        .ledger
        .resolve_transfer(proposal.id, Decision::Accept, &Selection::All, None, &stamp)
        .unwrap_err();
    assert_eq!(err.code(), "PROPOSAL_NOT_PENDING");
    assert!(err.is_replay());
    assert_eq!(n.ledger.account(n.outlet, n.modem).unwrap(), &after_first);
    assert_eq!(n.ledger.holders(n.modem, "M-1", UnitStatus::Available), vec![n.outlet]);
}
