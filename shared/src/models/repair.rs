//! Repair transfer: units of a fault record handed to a repair centre

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FaultEvent, FaultRecord, StageBook, UnitStatus};
use crate::error::{LedgerError, LedgerResult};
use crate::quantity::QuantityAnomaly;
use crate::types::{Selection, StockPayload};

/// Derived status of a repair transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairTransferStatus {
    Pending,
    UnderRepair,
    Repaired,
    Returned,
    Rejected,
    Closed,
}

impl RepairTransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairTransferStatus::Pending => "pending",
            RepairTransferStatus::UnderRepair => "under_repair",
            RepairTransferStatus::Repaired => "repaired",
            RepairTransferStatus::Returned => "returned",
            RepairTransferStatus::Rejected => "rejected",
            RepairTransferStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            RepairTransferStatus::Pending,
            RepairTransferStatus::UnderRepair,
            RepairTransferStatus::Repaired,
            RepairTransferStatus::Returned,
            RepairTransferStatus::Rejected,
            RepairTransferStatus::Closed,
        ]
        .into_iter()
        .find(|status| status.as_str() == value)
    }
}

impl std::fmt::Display for RepairTransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Units sent from a fault record to a repair centre.
///
/// Stages reuse unit statuses: `pending_under_repair` is awaiting the
/// centre, `damaged` was refused by it, `pending_transfer` is repaired and
/// earmarked by an open proposal, `transferred` has been returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairTransfer {
    pub id: Uuid,
    pub fault_record_id: Uuid,
    pub location_id: Uuid,
    pub product_id: Uuid,
    pub repair_center_id: Uuid,
    pub is_serialized: bool,
    pub quantity: i64,
    pub stages: StageBook,
    pub status: RepairTransferStatus,
    pub total_cost: Decimal,
    pub history: Vec<FaultEvent>,
    pub sent_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RepairTransfer {
    pub fn open(fault: &FaultRecord, repair_center_id: Uuid, actor: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            fault_record_id: fault.id,
            location_id: fault.location_id,
            product_id: fault.product_id,
            repair_center_id,
            is_serialized: fault.is_serialized,
            quantity: 0,
            stages: StageBook::default(),
            status: RepairTransferStatus::Pending,
            total_cost: Decimal::ZERO,
            history: Vec::new(),
            sent_by: actor,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn pending(&self) -> i64 {
        self.stages.count(UnitStatus::PendingUnderRepair)
    }

    pub fn under_repair(&self) -> i64 {
        self.stages.count(UnitStatus::UnderRepair)
    }

    pub fn rejected(&self) -> i64 {
        self.stages.count(UnitStatus::Damaged)
    }

    pub fn repaired(&self) -> i64 {
        self.stages.count(UnitStatus::Repaired) + self.stages.count(UnitStatus::PendingTransfer)
    }

    pub fn irreparable(&self) -> i64 {
        self.stages.count(UnitStatus::Irreparable)
    }

    pub fn returned(&self) -> i64 {
        self.stages.count(UnitStatus::Transferred)
    }

    /// The transfer must belong to `fault`
    pub fn ensure_belongs(&self, fault: &FaultRecord) -> LedgerResult<()> {
        if self.fault_record_id != fault.id {
            return Err(LedgerError::Validation(format!(
                "Repair transfer {} does not belong to fault record {}",
                self.id, fault.id
            )));
        }
        Ok(())
    }

    pub fn select(&self, stage: UnitStatus, selection: &Selection, target: UnitStatus) -> LedgerResult<StockPayload> {
        self.stages.select(stage, selection, self.is_serialized, target)
    }

    pub fn admit(&mut self, payload: &StockPayload) -> LedgerResult<()> {
        self.stages.add(UnitStatus::PendingUnderRepair, payload)?;
        self.quantity += payload.count();
        Ok(())
    }

    pub fn shift(&mut self, from: UnitStatus, to: UnitStatus, payload: &StockPayload) -> LedgerResult<()> {
        self.stages.shift(from, to, payload)
    }

    pub fn refresh_status(&mut self, at: DateTime<Utc>) {
        self.status = if self.pending() > 0 {
            RepairTransferStatus::Pending
        } else if self.under_repair() > 0 {
            RepairTransferStatus::UnderRepair
        } else if self.repaired() > 0 {
            RepairTransferStatus::Repaired
        } else if self.returned() > 0 {
            RepairTransferStatus::Returned
        } else if self.irreparable() > 0 {
            RepairTransferStatus::Closed
        } else {
            RepairTransferStatus::Rejected
        };
        self.updated_at = at;
    }

    /// quantity = pending + under_repair + rejected + repaired + irreparable + returned
    pub fn check_conservation(&self) -> bool {
        self.quantity
            == self.pending()
                + self.under_repair()
                + self.rejected()
                + self.repaired()
                + self.irreparable()
                + self.returned()
            && self.quantity == self.stages.total()
    }

    pub fn clamp_counters(&mut self) -> Vec<QuantityAnomaly> {
        let mut anomalies = Vec::new();
        crate::quantity::clamp_counter(self.id, "quantity", &mut self.quantity, &mut anomalies);
        self.stages.clamp(self.id, &mut anomalies);
        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, LocationKind, Product, StockAccount};
    use crate::types::Stamp;

    fn transfer() -> RepairTransfer {
        let stamp = Stamp::new(Uuid::new_v4(), None);
        let account = StockAccount::open(
            &Location::new(LocationKind::Outlet, "Outlet"),
            &Product::bulk("PSU-1", "Power supply"),
            stamp.at,
        );
        let fault = FaultRecord::open(&account, &stamp);
        RepairTransfer::open(&fault, Uuid::new_v4(), stamp.actor, stamp.at)
    }

    #[test]
    fn test_status_follows_stages() {
        let mut rt = transfer();
        rt.admit(&StockPayload::Quantity(4)).unwrap();
        rt.refresh_status(Utc::now());
        assert_eq!(rt.status, RepairTransferStatus::Pending);

        rt.shift(UnitStatus::PendingUnderRepair, UnitStatus::UnderRepair, &StockPayload::Quantity(3))
            .unwrap();
        rt.shift(UnitStatus::PendingUnderRepair, UnitStatus::Damaged, &StockPayload::Quantity(1))
            .unwrap();
        rt.refresh_status(Utc::now());
        assert_eq!(rt.status, RepairTransferStatus::UnderRepair);

        rt.shift(UnitStatus::UnderRepair, UnitStatus::Repaired, &StockPayload::Quantity(2))
            .unwrap();
        rt.shift(UnitStatus::UnderRepair, UnitStatus::Irreparable, &StockPayload::Quantity(1))
            .unwrap();
        rt.refresh_status(Utc::now());
        assert_eq!(rt.status, RepairTransferStatus::Repaired);

        rt.shift(UnitStatus::Repaired, UnitStatus::Transferred, &StockPayload::Quantity(2))
            .unwrap();
        rt.refresh_status(Utc::now());
        assert_eq!(rt.status, RepairTransferStatus::Returned);
        assert_eq!(rt.rejected(), 1);
        assert!(rt.check_conservation());
    }

    #[test]
    fn test_fully_refused_transfer_is_rejected() {
        let mut rt = transfer();
        rt.admit(&StockPayload::Quantity(2)).unwrap();
        rt.shift(UnitStatus::PendingUnderRepair, UnitStatus::Damaged, &StockPayload::Quantity(2))
            .unwrap();
        rt.refresh_status(Utc::now());
        assert_eq!(rt.status, RepairTransferStatus::Rejected);
    }
}
