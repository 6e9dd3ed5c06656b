//! Fault/repair record: damaged units of one account on their way through
//! claim acceptance, repair and return to service or scrap

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{StageBook, StockAccount, UnitStatus};
use crate::error::{LedgerError, LedgerResult};
use crate::quantity::QuantityAnomaly;
use crate::types::{AccountKey, Selection, Stamp, StockPayload};

/// Stages a fault record books units under
pub const FAULT_STAGES: [UnitStatus; 8] = [
    UnitStatus::PendingDamage,
    UnitStatus::Damaged,
    UnitStatus::PendingUnderRepair,
    UnitStatus::UnderRepair,
    UnitStatus::Repaired,
    UnitStatus::PendingTransfer,
    UnitStatus::Transferred,
    UnitStatus::Irreparable,
];

/// Overall status of a fault record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultStatus {
    PendingDamage,
    Damaged,
    PendingUnderRepair,
    UnderRepair,
    Repaired,
    Transferred,
    Irreparable,
    Rejected,
}

impl FaultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultStatus::PendingDamage => "pending_damage",
            FaultStatus::Damaged => "damaged",
            FaultStatus::PendingUnderRepair => "pending_under_repair",
            FaultStatus::UnderRepair => "under_repair",
            FaultStatus::Repaired => "repaired",
            FaultStatus::Transferred => "transferred",
            FaultStatus::Irreparable => "irreparable",
            FaultStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            FaultStatus::PendingDamage,
            FaultStatus::Damaged,
            FaultStatus::PendingUnderRepair,
            FaultStatus::UnderRepair,
            FaultStatus::Repaired,
            FaultStatus::Transferred,
            FaultStatus::Irreparable,
            FaultStatus::Rejected,
        ]
        .into_iter()
        .find(|status| status.as_str() == value)
    }
}

impl std::fmt::Display for FaultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall status from stage counts, highest priority first.
/// Units earmarked for transfer still count as repaired.
pub fn derive_status(stages: &StageBook) -> FaultStatus {
    let order = [
        (UnitStatus::PendingDamage, FaultStatus::PendingDamage),
        (UnitStatus::PendingUnderRepair, FaultStatus::PendingUnderRepair),
        (UnitStatus::Damaged, FaultStatus::Damaged),
        (UnitStatus::UnderRepair, FaultStatus::UnderRepair),
        (UnitStatus::Repaired, FaultStatus::Repaired),
        (UnitStatus::PendingTransfer, FaultStatus::Repaired),
        (UnitStatus::Transferred, FaultStatus::Transferred),
        (UnitStatus::Irreparable, FaultStatus::Irreparable),
    ];
    order
        .into_iter()
        .find(|(stage, _)| stages.count(*stage) > 0)
        .map(|(_, status)| status)
        .unwrap_or(FaultStatus::Rejected)
}

/// Kind of event in a fault record's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultAction {
    Reported,
    RepairReported,
    DamageAccepted,
    DamageRejected,
    SentToRepair,
    RepairAccepted,
    RepairRejected,
    Repaired,
    Irreparable,
    Scrapped,
    TransferProposed,
    TransferReleased,
    Delivered,
}

impl FaultAction {
    /// Events of the damage claim itself, as opposed to the repair episode
    pub fn is_damage_claim(&self) -> bool {
        matches!(
            self,
            FaultAction::Reported | FaultAction::DamageAccepted | FaultAction::DamageRejected
        )
    }
}

/// One accept/reject/status-change event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEvent {
    pub action: FaultAction,
    pub quantity: i64,
    pub serials: Vec<String>,
    pub actor: Uuid,
    pub at: DateTime<Utc>,
    pub remark: Option<String>,
    pub cost: Option<Decimal>,
    pub reference_id: Option<Uuid>,
}

impl FaultEvent {
    pub fn new(action: FaultAction, payload: &StockPayload, stamp: &Stamp) -> Self {
        Self {
            action,
            quantity: payload.count(),
            serials: payload.serials().to_vec(),
            actor: stamp.actor,
            at: stamp.at,
            remark: stamp.remark.clone(),
            cost: None,
            reference_id: None,
        }
    }

    pub fn with_reference(mut self, reference_id: Uuid) -> Self {
        self.reference_id = Some(reference_id);
        self
    }

    pub fn with_cost(mut self, cost: Option<Decimal>) -> Self {
        self.cost = cost;
        self
    }
}

/// Damage incident of one stock account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub id: Uuid,
    pub location_id: Uuid,
    pub product_id: Uuid,
    pub is_serialized: bool,
    /// Units currently on the record across every stage
    pub damage_qty: i64,
    pub stages: StageBook,
    pub status: FaultStatus,
    pub pending_damage_history: Vec<FaultEvent>,
    pub repair_history: Vec<FaultEvent>,
    /// Request ids already applied to this record
    pub applied_requests: Vec<Uuid>,
    pub archived_at: Option<DateTime<Utc>>,
    pub reported_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FaultRecord {
    /// An empty record for `account`, filled by the reporting operation
    pub fn open(account: &StockAccount, stamp: &Stamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            location_id: account.location_id,
            product_id: account.product_id,
            is_serialized: account.tracks_serial_number,
            damage_qty: 0,
            stages: StageBook::default(),
            status: FaultStatus::Rejected,
            pending_damage_history: Vec::new(),
            repair_history: Vec::new(),
            applied_requests: Vec::new(),
            archived_at: None,
            reported_by: stamp.actor,
            created_at: stamp.at,
            updated_at: stamp.at,
        }
    }

    pub fn key(&self) -> AccountKey {
        AccountKey::new(self.location_id, self.product_id)
    }

    pub fn count(&self, stage: UnitStatus) -> i64 {
        self.stages.count(stage)
    }

    /// Repaired units, including those earmarked by an open transfer
    pub fn repaired_qty(&self) -> i64 {
        self.count(UnitStatus::Repaired) + self.count(UnitStatus::PendingTransfer)
    }

    pub fn in_transit_qty(&self) -> i64 {
        self.count(UnitStatus::PendingTransfer)
    }

    /// Reject mutations on an archived record, or one from another account
    pub fn ensure_open(&self, account: &StockAccount) -> LedgerResult<()> {
        if self.archived_at.is_some() {
            return Err(LedgerError::RecordArchived { id: self.id });
        }
        if self.key() != account.key() {
            return Err(LedgerError::Validation(format!(
                "Fault record {} belongs to account {}, not {}",
                self.id,
                self.key(),
                account.key()
            )));
        }
        Ok(())
    }

    /// Guard a request id against replays
    pub fn claim_request(&mut self, request_id: Uuid) -> LedgerResult<()> {
        if self.applied_requests.contains(&request_id) {
            return Err(LedgerError::AlreadyApplied { request_id });
        }
        self.applied_requests.push(request_id);
        Ok(())
    }

    pub fn select(&self, stage: UnitStatus, selection: &Selection, target: UnitStatus) -> LedgerResult<StockPayload> {
        self.stages.select(stage, selection, self.is_serialized, target)
    }

    /// Book newly reported units
    pub fn admit(&mut self, stage: UnitStatus, payload: &StockPayload) -> LedgerResult<()> {
        self.stages.add(stage, payload)?;
        self.damage_qty += payload.count();
        Ok(())
    }

    /// Move units between stages; the damage quantity is unchanged
    pub fn shift(&mut self, from: UnitStatus, to: UnitStatus, payload: &StockPayload) -> LedgerResult<()> {
        self.stages.shift(from, to, payload)
    }

    /// Drop units whose damage claim was denied
    pub fn release(&mut self, stage: UnitStatus, payload: &StockPayload) -> LedgerResult<()> {
        self.stages.remove(stage, payload)?;
        self.damage_qty -= payload.count();
        Ok(())
    }

    pub fn log(&mut self, event: FaultEvent) {
        if event.action.is_damage_claim() {
            self.pending_damage_history.push(event);
        } else {
            self.repair_history.push(event);
        }
    }

    /// Recompute the overall status, archiving a record left empty
    pub fn refresh_status(&mut self, at: DateTime<Utc>) {
        self.status = derive_status(&self.stages);
        if self.status == FaultStatus::Rejected && self.stages.is_empty() {
            self.archived_at.get_or_insert(at);
        }
        self.updated_at = at;
    }

    /// Damage quantity equals the sum of the stage counts
    pub fn check_conservation(&self) -> bool {
        self.damage_qty == self.stages.total()
            && FAULT_STAGES
                .iter()
                .map(|stage| self.stages.count(*stage))
                .sum::<i64>()
                == self.damage_qty
    }

    pub fn clamp_counters(&mut self) -> Vec<QuantityAnomaly> {
        let mut anomalies = Vec::new();
        crate::quantity::clamp_counter(self.id, "damage_qty", &mut self.damage_qty, &mut anomalies);
        self.stages.clamp(self.id, &mut anomalies);
        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, LocationKind, Product};

    fn record(serialized: bool) -> (StockAccount, FaultRecord) {
        let location = Location::new(LocationKind::Outlet, "Outlet 1");
        let product = if serialized {
            Product::serialized("ONT-1", "ONT")
        } else {
            Product::bulk("PTC-1", "Patch cord")
        };
        let stamp = Stamp::new(Uuid::new_v4(), None);
        let account = StockAccount::open(&location, &product, stamp.at);
        let fault = FaultRecord::open(&account, &stamp);
        (account, fault)
    }

    #[test]
    fn test_derive_status_priority() {
        let mut book = StageBook::default();
        assert_eq!(derive_status(&book), FaultStatus::Rejected);

        book.add(UnitStatus::Irreparable, &StockPayload::Quantity(1)).unwrap();
        assert_eq!(derive_status(&book), FaultStatus::Irreparable);

        book.add(UnitStatus::PendingTransfer, &StockPayload::Quantity(1)).unwrap();
        assert_eq!(derive_status(&book), FaultStatus::Repaired);

        book.add(UnitStatus::Damaged, &StockPayload::Quantity(1)).unwrap();
        assert_eq!(derive_status(&book), FaultStatus::Damaged);

        book.add(UnitStatus::PendingUnderRepair, &StockPayload::Quantity(1)).unwrap();
        assert_eq!(derive_status(&book), FaultStatus::PendingUnderRepair);

        book.add(UnitStatus::PendingDamage, &StockPayload::Quantity(1)).unwrap();
        assert_eq!(derive_status(&book), FaultStatus::PendingDamage);
    }

    #[test]
    fn test_release_to_empty_archives() {
        let (_, mut fault) = record(false);
        fault.admit(UnitStatus::PendingDamage, &StockPayload::Quantity(2)).unwrap();
        fault.refresh_status(Utc::now());
        assert_eq!(fault.status, FaultStatus::PendingDamage);

        fault.release(UnitStatus::PendingDamage, &StockPayload::Quantity(2)).unwrap();
        fault.refresh_status(Utc::now());
        assert_eq!(fault.status, FaultStatus::Rejected);
        assert!(fault.archived_at.is_some());
        assert!(fault.check_conservation());
    }

    #[test]
    fn test_claim_request_rejects_replay() {
        let (_, mut fault) = record(true);
        let request = Uuid::new_v4();
        fault.claim_request(request).unwrap();
        let err = fault.claim_request(request).unwrap_err();
        assert_eq!(err.code(), "ALREADY_APPLIED");
        fault.claim_request(Uuid::new_v4()).unwrap();
        assert_eq!(fault.applied_requests.len(), 2);
    }

    #[test]
    fn test_ensure_open_checks_account() {
        let (account, fault) = record(true);
        fault.ensure_open(&account).unwrap();

        let (other, _) = record(true);
        assert_eq!(fault.ensure_open(&other).unwrap_err().code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_history_split() {
        let (_, mut fault) = record(false);
        let stamp = Stamp::new(Uuid::new_v4(), None);
        let payload = StockPayload::Quantity(1);
        fault.log(FaultEvent::new(FaultAction::Reported, &payload, &stamp));
        fault.log(FaultEvent::new(FaultAction::SentToRepair, &payload, &stamp));
        assert_eq!(fault.pending_damage_history.len(), 1);
        assert_eq!(fault.repair_history.len(), 1);
    }
}
