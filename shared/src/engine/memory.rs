//! In-memory ledger
//!
//! Holds every record in ordered maps and runs each operation against a
//! working copy that replaces the live state only when the operation
//! succeeds. Used by the property and scenario tests and by offline tools.

use std::collections::BTreeMap;

use tracing::debug;
use uuid::Uuid;

use super::batch::{BatchItem, BatchSummary};
use super::repair::{
    self, RepairCompletion, RepairOutcome, RepairScope, ReturnRequest,
};
use super::transfer::{self, ProposalDraft, ResolveOutcome, Upstream};
use super::{damage, stock};
use crate::error::{LedgerError, LedgerResult, RecordKind};
use crate::models::{
    AccountSummary, FaultRecord, FaultSummary, Location, Product, ProposalStatus, RepairTransfer,
    SourceClass, StockAccount, TransferKind, TransferPolicy, TransferProposal, UnitStatus,
};
use crate::quantity::QuantityAnomaly;
use crate::types::{AccountKey, Decision, Selection, Stamp, StockPayload};

/// Default cap on batch size
pub const DEFAULT_MAX_BATCH_ITEMS: usize = 100;

/// Repair completion plus the return proposal it opened, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedRepair {
    pub completion: RepairCompletion,
    pub return_proposal_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct MemoryLedger {
    locations: BTreeMap<Uuid, Location>,
    products: BTreeMap<Uuid, Product>,
    accounts: BTreeMap<AccountKey, StockAccount>,
    faults: BTreeMap<Uuid, FaultRecord>,
    repairs: BTreeMap<Uuid, RepairTransfer>,
    proposals: BTreeMap<Uuid, TransferProposal>,
    policy: TransferPolicy,
    max_batch_items: usize,
    anomalies: Vec<QuantityAnomaly>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(TransferPolicy::default())
    }
}

impl MemoryLedger {
    pub fn new(policy: TransferPolicy) -> Self {
        Self {
            locations: BTreeMap::new(),
            products: BTreeMap::new(),
            accounts: BTreeMap::new(),
            faults: BTreeMap::new(),
            repairs: BTreeMap::new(),
            proposals: BTreeMap::new(),
            policy,
            max_batch_items: DEFAULT_MAX_BATCH_ITEMS,
            anomalies: Vec::new(),
        }
    }

    pub fn with_max_batch_items(mut self, max_batch_items: usize) -> Self {
        self.max_batch_items = max_batch_items;
        self
    }

    pub fn add_location(&mut self, location: Location) -> Uuid {
        let id = location.id;
        self.locations.insert(id, location);
        id
    }

    pub fn add_product(&mut self, product: Product) -> Uuid {
        let id = product.id;
        self.products.insert(id, product);
        id
    }

    // ------------------------------------------------------------------
    // Working-copy plumbing
    // ------------------------------------------------------------------

    /// Run `op` on a copy of the ledger; keep the copy only on success
    fn transact<T>(&mut self, op: impl FnOnce(&mut Self) -> LedgerResult<T>) -> LedgerResult<T> {
        let mut work = self.clone();
        let value = op(&mut work)?;
        work.clamp_all();
        *self = work;
        Ok(value)
    }

    fn clamp_all(&mut self) {
        let mut found = Vec::new();
        for account in self.accounts.values_mut() {
            found.extend(account.clamp_counters());
        }
        for fault in self.faults.values_mut() {
            found.extend(fault.clamp_counters());
        }
        for repair in self.repairs.values_mut() {
            found.extend(repair.clamp_counters());
        }
        self.anomalies.extend(found);
    }

    pub fn location(&self, id: Uuid) -> LedgerResult<&Location> {
        self.locations
            .get(&id)
            .ok_or_else(|| LedgerError::not_found(RecordKind::Location, id))
    }

    pub fn product(&self, id: Uuid) -> LedgerResult<&Product> {
        self.products
            .get(&id)
            .ok_or_else(|| LedgerError::not_found(RecordKind::Product, id))
    }

    fn take_account(&mut self, location_id: Uuid, product_id: Uuid) -> LedgerResult<StockAccount> {
        let key = AccountKey::new(location_id, product_id);
        self.accounts
            .remove(&key)
            .ok_or_else(|| LedgerError::not_found(RecordKind::StockAccount, key))
    }

    fn take_or_open_account(&mut self, location_id: Uuid, product_id: Uuid, stamp: &Stamp) -> LedgerResult<StockAccount> {
        let location = self.location(location_id)?.clone();
        let product = self.product(product_id)?.clone();
        let key = AccountKey::new(location_id, product_id);
        Ok(self
            .accounts
            .remove(&key)
            .unwrap_or_else(|| StockAccount::open(&location, &product, stamp.at)))
    }

    fn put_account(&mut self, account: StockAccount) {
        self.accounts.insert(account.key(), account);
    }

    fn take_fault(&mut self, id: Uuid) -> LedgerResult<FaultRecord> {
        self.faults
            .remove(&id)
            .ok_or_else(|| LedgerError::not_found(RecordKind::FaultRecord, id))
    }

    fn take_repair(&mut self, id: Uuid) -> LedgerResult<RepairTransfer> {
        self.repairs
            .remove(&id)
            .ok_or_else(|| LedgerError::not_found(RecordKind::RepairTransfer, id))
    }

    fn take_proposal(&mut self, id: Uuid) -> LedgerResult<TransferProposal> {
        self.proposals
            .remove(&id)
            .ok_or_else(|| LedgerError::not_found(RecordKind::TransferProposal, id))
    }

    /// A serial may be live in one account at a time. Accounts taken out
    /// of the maps for the current operation are checked by the engine.
    fn ensure_serials_free(&self, product_id: Uuid, serials: &[String]) -> LedgerResult<()> {
        for account in self.accounts.values().filter(|a| a.product_id == product_id) {
            for serial in serials {
                if account.units.get(serial).is_some_and(|unit| unit.is_live()) {
                    return Err(LedgerError::DuplicateSerial {
                        serial: serial.clone(),
                        location_id: account.location_id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Fault record, its repair transfer and the account they belong to
    fn take_repair_scope(&mut self, repair_id: Uuid) -> LedgerResult<(StockAccount, FaultRecord, RepairTransfer)> {
        let repair = self.take_repair(repair_id)?;
        let fault = self.take_fault(repair.fault_record_id)?;
        let account = self.take_account(fault.location_id, fault.product_id)?;
        Ok((account, fault, repair))
    }

    fn put_repair_scope(&mut self, account: StockAccount, fault: FaultRecord, repair: RepairTransfer) {
        self.put_account(account);
        self.faults.insert(fault.id, fault);
        self.repairs.insert(repair.id, repair);
    }

    fn with_repair_scope<T>(
        &mut self,
        repair_id: Uuid,
        op: impl FnOnce(&mut RepairScope<'_>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        self.transact(|l| {
            let (mut account, mut fault, mut repair) = l.take_repair_scope(repair_id)?;
            let value = op(&mut RepairScope {
                account: &mut account,
                fault: &mut fault,
                repair: &mut repair,
            })?;
            l.put_repair_scope(account, fault, repair);
            Ok(value)
        })
    }

    // ------------------------------------------------------------------
    // Stock operations
    // ------------------------------------------------------------------

    pub fn receive(
        &mut self,
        location_id: Uuid,
        product_id: Uuid,
        payload: &StockPayload,
        class: SourceClass,
        stamp: &Stamp,
    ) -> LedgerResult<()> {
        self.transact(|l| {
            let mut account = l.take_or_open_account(location_id, product_id, stamp)?;
            l.ensure_serials_free(product_id, payload.serials())?;
            stock::receive(&mut account, payload, class, stamp)?;
            l.put_account(account);
            Ok(())
        })
    }

    pub fn consume(&mut self, location_id: Uuid, product_id: Uuid, payload: &StockPayload, stamp: &Stamp) -> LedgerResult<()> {
        self.transact(|l| {
            let mut account = l.take_account(location_id, product_id)?;
            stock::consume(&mut account, payload, stamp)?;
            l.put_account(account);
            Ok(())
        })
    }

    /// Report damage, extending `fault_record_id` when given. Returns the
    /// fault record id.
    pub fn report_damage(
        &mut self,
        location_id: Uuid,
        product_id: Uuid,
        payload: &StockPayload,
        fault_record_id: Option<Uuid>,
        stamp: &Stamp,
    ) -> LedgerResult<Uuid> {
        self.transact(|l| {
            let mut account = l.take_account(location_id, product_id)?;
            let mut fault = match fault_record_id {
                Some(id) => l.take_fault(id)?,
                None => FaultRecord::open(&account, stamp),
            };
            stock::report_damage(&mut account, &mut fault, payload, stamp)?;
            let id = fault.id;
            l.put_account(account);
            l.faults.insert(id, fault);
            Ok(id)
        })
    }

    /// Report units straight for repair. Returns the fault record and
    /// repair transfer ids.
    pub fn report_for_repair(
        &mut self,
        location_id: Uuid,
        product_id: Uuid,
        payload: &StockPayload,
        repair_center_id: Uuid,
        stamp: &Stamp,
    ) -> LedgerResult<(Uuid, Uuid)> {
        self.transact(|l| {
            let mut account = l.take_account(location_id, product_id)?;
            let mut fault = FaultRecord::open(&account, stamp);
            let mut repair = RepairTransfer::open(&fault, repair_center_id, stamp.actor, stamp.at);
            stock::report_for_repair(&mut account, &mut fault, &mut repair, payload, stamp)?;
            let ids = (fault.id, repair.id);
            l.put_repair_scope(account, fault, repair);
            Ok(ids)
        })
    }

    // ------------------------------------------------------------------
    // Damage claims
    // ------------------------------------------------------------------

    pub fn accept_pending_damage(
        &mut self,
        fault_id: Uuid,
        selection: &Selection,
        request_id: Uuid,
        stamp: &Stamp,
    ) -> LedgerResult<StockPayload> {
        self.transact(|l| {
            let mut fault = l.take_fault(fault_id)?;
            let mut account = l.take_account(fault.location_id, fault.product_id)?;
            let moved = damage::accept_pending_damage(&mut account, &mut fault, selection, request_id, stamp)?;
            l.put_account(account);
            l.faults.insert(fault.id, fault);
            Ok(moved)
        })
    }

    pub fn reject_pending_damage(
        &mut self,
        fault_id: Uuid,
        selection: &Selection,
        request_id: Uuid,
        stamp: &Stamp,
    ) -> LedgerResult<StockPayload> {
        self.transact(|l| {
            let mut fault = l.take_fault(fault_id)?;
            let mut account = l.take_account(fault.location_id, fault.product_id)?;
            let moved = damage::reject_pending_damage(&mut account, &mut fault, selection, request_id, stamp)?;
            l.put_account(account);
            l.faults.insert(fault.id, fault);
            Ok(moved)
        })
    }

    // ------------------------------------------------------------------
    // Repair
    // ------------------------------------------------------------------

    /// Send damaged units to a repair centre. Returns the new repair transfer id.
    pub fn send_to_repair(
        &mut self,
        fault_id: Uuid,
        repair_center_id: Uuid,
        selection: &Selection,
        stamp: &Stamp,
    ) -> LedgerResult<Uuid> {
        self.transact(|l| {
            let mut fault = l.take_fault(fault_id)?;
            let mut account = l.take_account(fault.location_id, fault.product_id)?;
            let mut repair = RepairTransfer::open(&fault, repair_center_id, stamp.actor, stamp.at);
            repair::send_to_repair(
                &mut RepairScope {
                    account: &mut account,
                    fault: &mut fault,
                    repair: &mut repair,
                },
                selection,
                stamp,
            )?;
            let id = repair.id;
            l.put_repair_scope(account, fault, repair);
            Ok(id)
        })
    }

    pub fn accept_repair_transfer(&mut self, repair_id: Uuid, selection: &Selection, stamp: &Stamp) -> LedgerResult<StockPayload> {
        self.with_repair_scope(repair_id, |scope| repair::accept_repair_transfer(scope, selection, stamp))
    }

    pub fn reject_repair_transfer(&mut self, repair_id: Uuid, selection: &Selection, stamp: &Stamp) -> LedgerResult<StockPayload> {
        self.with_repair_scope(repair_id, |scope| repair::reject_repair_transfer(scope, selection, stamp))
    }

    pub fn scrap_repaired(&mut self, repair_id: Uuid, selection: &Selection, stamp: &Stamp) -> LedgerResult<StockPayload> {
        self.with_repair_scope(repair_id, |scope| repair::scrap_repaired(scope, selection, stamp))
    }

    /// Record a repair result; with `return_to`, the repaired units are
    /// proposed back to that outlet in the same operation
    pub fn complete_repair(
        &mut self,
        repair_id: Uuid,
        outcome: &RepairOutcome,
        return_to: Option<&ReturnRequest>,
        stamp: &Stamp,
    ) -> LedgerResult<CompletedRepair> {
        self.transact(|l| {
            let (mut account, mut fault, mut repair) = l.take_repair_scope(repair_id)?;
            let completion = repair::complete_repair(
                &mut RepairScope {
                    account: &mut account,
                    fault: &mut fault,
                    repair: &mut repair,
                },
                outcome,
                stamp,
            )?;
            let product_id = account.product_id;
            let from_location_id = account.location_id;
            l.put_repair_scope(account, fault, repair);

            let return_proposal_id = match (return_to, &completion.repaired) {
                (Some(request), Some(repaired)) => {
                    let draft = ProposalDraft {
                        kind: TransferKind::RepairReturn,
                        product_id,
                        from_location_id,
                        to_location_id: request.to_location_id,
                        payload: repaired.clone(),
                        repair_transfer_id: Some(repair_id),
                        document_ref: request.document_ref.clone(),
                    };
                    Some(l.open_proposal(&draft, stamp)?.id)
                }
                (Some(_), None) => {
                    return Err(LedgerError::Validation(
                        "A return needs repaired units".to_string(),
                    ))
                }
                (None, _) => None,
            };
            Ok(CompletedRepair {
                completion,
                return_proposal_id,
            })
        })
    }

    // ------------------------------------------------------------------
    // Transfers
    // ------------------------------------------------------------------

    pub fn propose_transfer(&mut self, draft: &ProposalDraft, stamp: &Stamp) -> LedgerResult<TransferProposal> {
        self.transact(|l| l.open_proposal(draft, stamp))
    }

    fn open_proposal(&mut self, draft: &ProposalDraft, stamp: &Stamp) -> LedgerResult<TransferProposal> {
        let mut source = self.take_account(draft.from_location_id, draft.product_id)?;
        let mut destination = if draft.to_location_id == draft.from_location_id {
            None
        } else {
            Some(self.take_or_open_account(draft.to_location_id, draft.product_id, stamp)?)
        };
        let mut upstream = match draft.repair_transfer_id {
            Some(id) => {
                let repair = self.take_repair(id)?;
                let fault = self.take_fault(repair.fault_record_id)?;
                Some((fault, repair))
            }
            None => None,
        };

        let proposal = transfer::propose_transfer(
            &mut source,
            destination.as_mut(),
            upstream.as_mut().map(|(fault, repair)| Upstream { fault, repair }),
            draft,
            stamp,
        )?;

        self.put_account(source);
        if let Some(destination) = destination {
            self.put_account(destination);
        }
        if let Some((fault, repair)) = upstream {
            self.faults.insert(fault.id, fault);
            self.repairs.insert(repair.id, repair);
        }
        self.proposals.insert(proposal.id, proposal.clone());
        Ok(proposal)
    }

    pub fn resolve_transfer(
        &mut self,
        proposal_id: Uuid,
        decision: Decision,
        selection: &Selection,
        reason: Option<&str>,
        stamp: &Stamp,
    ) -> LedgerResult<ResolveOutcome> {
        let policy = self.policy.clone();
        self.transact(|l| {
            let mut proposal = l.take_proposal(proposal_id)?;
            proposal.ensure_pending()?;
            let mut source = l.take_account(proposal.from_location_id, proposal.product_id)?;
            let mut destination = if proposal.same_location() {
                None
            } else {
                Some(l.take_account(proposal.to_location_id, proposal.product_id)?)
            };
            if decision == Decision::Accept {
                let picked = proposal.select(selection)?;
                l.ensure_serials_free(proposal.product_id, picked.serials())?;
            }
            let mut upstream = match proposal.repair_transfer_id {
                Some(id) => {
                    let repair = l.take_repair(id)?;
                    let fault = l.take_fault(repair.fault_record_id)?;
                    Some((fault, repair))
                }
                None => None,
            };

            let outcome = transfer::resolve_transfer(
                &mut proposal,
                &mut source,
                destination.as_mut(),
                upstream.as_mut().map(|(fault, repair)| Upstream { fault, repair }),
                decision,
                selection,
                reason,
                &policy,
                stamp,
            )?;

            l.put_account(source);
            if let Some(destination) = destination {
                l.put_account(destination);
            }
            if let Some((fault, repair)) = upstream {
                l.faults.insert(fault.id, fault);
                l.repairs.insert(repair.id, repair);
            }
            l.proposals.insert(proposal.id, proposal);
            Ok(outcome)
        })
    }

    pub fn attach_document(&mut self, proposal_id: Uuid, reference: &str, stamp: &Stamp) -> LedgerResult<()> {
        self.transact(|l| {
            let proposal = l
                .proposals
                .get_mut(&proposal_id)
                .ok_or_else(|| LedgerError::not_found(RecordKind::TransferProposal, proposal_id))?;
            transfer::attach_document(proposal, reference, stamp)
        })
    }

    /// Resolve each item on its own, collecting successes and failures
    pub fn resolve_batch(&mut self, items: &[BatchItem], stamp: &Stamp) -> LedgerResult<BatchSummary> {
        BatchSummary::check_size(items.len(), self.max_batch_items)?;
        let mut summary = BatchSummary::default();
        for (index, item) in items.iter().enumerate() {
            let result = self.resolve_item(item, stamp);
            summary.record(index, item, result);
        }
        debug!(
            succeeded = summary.results.len(),
            failed = summary.errors.len(),
            "Batch resolved"
        );
        Ok(summary)
    }

    fn resolve_item(&mut self, item: &BatchItem, stamp: &Stamp) -> LedgerResult<ResolveOutcome> {
        if let Some(location_id) = item.destination_location_id {
            self.location(location_id)?;
            let proposal = self.proposal(item.proposal_id)?;
            if proposal.to_location_id != location_id {
                return Err(LedgerError::Validation(format!(
                    "Transfer proposal {} is not addressed to location {}",
                    item.proposal_id, location_id
                )));
            }
        }
        let selection = item.selection()?;
        self.resolve_transfer(
            item.proposal_id,
            item.decision,
            &selection,
            item.reason.as_deref(),
            stamp,
        )
    }

    // ------------------------------------------------------------------
    // Read-only queries
    // ------------------------------------------------------------------

    pub fn account(&self, location_id: Uuid, product_id: Uuid) -> Option<&StockAccount> {
        self.accounts.get(&AccountKey::new(location_id, product_id))
    }

    pub fn account_summary(&self, location_id: Uuid, product_id: Uuid) -> LedgerResult<AccountSummary> {
        self.account(location_id, product_id)
            .map(AccountSummary::from)
            .ok_or_else(|| LedgerError::not_found(RecordKind::StockAccount, AccountKey::new(location_id, product_id)))
    }

    pub fn location_summary(&self, location_id: Uuid) -> LedgerResult<Vec<AccountSummary>> {
        self.location(location_id)?;
        Ok(self
            .accounts
            .values()
            .filter(|account| account.location_id == location_id)
            .map(AccountSummary::from)
            .collect())
    }

    /// Pending proposals with `location_id` as source or destination
    pub fn pending_transfers(&self, location_id: Uuid) -> Vec<&TransferProposal> {
        self.proposals
            .values()
            .filter(|p| p.status == ProposalStatus::Pending)
            .filter(|p| p.from_location_id == location_id || p.to_location_id == location_id)
            .collect()
    }

    pub fn fault_summary(&self, location_id: Uuid) -> FaultSummary {
        FaultSummary::collect(location_id, self.faults.values())
    }

    pub fn fault(&self, id: Uuid) -> LedgerResult<&FaultRecord> {
        self.faults
            .get(&id)
            .ok_or_else(|| LedgerError::not_found(RecordKind::FaultRecord, id))
    }

    pub fn repair(&self, id: Uuid) -> LedgerResult<&RepairTransfer> {
        self.repairs
            .get(&id)
            .ok_or_else(|| LedgerError::not_found(RecordKind::RepairTransfer, id))
    }

    pub fn proposal(&self, id: Uuid) -> LedgerResult<&TransferProposal> {
        self.proposals
            .get(&id)
            .ok_or_else(|| LedgerError::not_found(RecordKind::TransferProposal, id))
    }

    pub fn accounts(&self) -> impl Iterator<Item = &StockAccount> {
        self.accounts.values()
    }

    pub fn faults(&self) -> impl Iterator<Item = &FaultRecord> {
        self.faults.values()
    }

    pub fn repairs(&self) -> impl Iterator<Item = &RepairTransfer> {
        self.repairs.values()
    }

    pub fn proposals(&self) -> impl Iterator<Item = &TransferProposal> {
        self.proposals.values()
    }

    /// Locations holding `serial` in `status`
    pub fn holders(&self, product_id: Uuid, serial: &str, status: UnitStatus) -> Vec<Uuid> {
        self.accounts
            .values()
            .filter(|a| a.product_id == product_id)
            .filter(|a| {
                a.units
                    .get(serial)
                    .is_some_and(|unit| unit.is_live() && unit.status == status)
            })
            .map(|a| a.location_id)
            .collect()
    }

    pub fn anomalies(&self) -> &[QuantityAnomaly] {
        &self.anomalies
    }
}
