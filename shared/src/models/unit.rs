//! Unit ledger: the status and history of one serialized unit, or of the
//! synthetic batch entry that represents a bulk product within an account

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ProposalStatus, TransferKind};
use crate::error::{LedgerError, LedgerResult};
use crate::types::Stamp;

/// Lifecycle status of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Available,
    Consumed,
    Damaged,
    PendingDamage,
    UnderRepair,
    PendingUnderRepair,
    Repaired,
    Irreparable,
    Transferred,
    PendingTransfer,
}

impl UnitStatus {
    pub const ALL: [UnitStatus; 10] = [
        UnitStatus::Available,
        UnitStatus::Consumed,
        UnitStatus::Damaged,
        UnitStatus::PendingDamage,
        UnitStatus::UnderRepair,
        UnitStatus::PendingUnderRepair,
        UnitStatus::Repaired,
        UnitStatus::Irreparable,
        UnitStatus::Transferred,
        UnitStatus::PendingTransfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Available => "available",
            UnitStatus::Consumed => "consumed",
            UnitStatus::Damaged => "damaged",
            UnitStatus::PendingDamage => "pending_damage",
            UnitStatus::UnderRepair => "under_repair",
            UnitStatus::PendingUnderRepair => "pending_under_repair",
            UnitStatus::Repaired => "repaired",
            UnitStatus::Irreparable => "irreparable",
            UnitStatus::Transferred => "transferred",
            UnitStatus::PendingTransfer => "pending_transfer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        UnitStatus::ALL.into_iter().find(|s| s.as_str() == value)
    }

    /// The legal transition table. Anything not listed here is rejected.
    pub fn can_transition_to(self, to: UnitStatus) -> bool {
        use UnitStatus::*;
        matches!(
            (self, to),
            (Available, PendingDamage)
                | (Available, PendingUnderRepair)
                | (Available, Consumed)
                | (Available, PendingTransfer)
                | (PendingDamage, Damaged)
                | (PendingDamage, Available)
                | (Damaged, PendingUnderRepair)
                | (PendingUnderRepair, UnderRepair)
                | (PendingUnderRepair, Damaged)
                | (UnderRepair, Repaired)
                | (UnderRepair, Irreparable)
                | (Repaired, PendingTransfer)
                | (Repaired, Irreparable)
                | (PendingTransfer, Transferred)
                | (PendingTransfer, Available)
                | (PendingTransfer, Repaired)
                | (Transferred, Available)
        )
    }

    /// Statuses reachable in one step
    pub fn next_statuses(self) -> Vec<UnitStatus> {
        UnitStatus::ALL
            .into_iter()
            .filter(|to| self.can_transition_to(*to))
            .collect()
    }

    /// No transition leaves these statuses
    pub fn is_terminal(self) -> bool {
        self.next_statuses().is_empty()
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a unit's transfer history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub proposal_id: Uuid,
    pub transfer_type: TransferKind,
    pub from_location: Uuid,
    pub to_location: Uuid,
    pub transfer_status: ProposalStatus,
    pub quantity: i64,
    pub actor: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub remark: Option<String>,
}

/// One entry of a unit's repair history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairEvent {
    pub status: UnitStatus,
    pub fault_record_id: Option<Uuid>,
    pub date: DateTime<Utc>,
    pub remark: Option<String>,
    pub cost: Option<Decimal>,
    pub repaired_qty: i64,
    pub irreparable_qty: i64,
    pub actor: Uuid,
}

/// History entry appended by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerNote {
    None,
    Transfer(TransferRecord),
    Repair(RepairEvent),
}

impl LedgerNote {
    /// Repair-history note for a fault lifecycle step
    pub fn repair(status: UnitStatus, fault_record_id: Uuid, quantity: i64, stamp: &Stamp) -> Self {
        let (repaired_qty, irreparable_qty) = match status {
            UnitStatus::Repaired => (quantity, 0),
            UnitStatus::Irreparable => (0, quantity),
            _ => (0, 0),
        };
        LedgerNote::Repair(RepairEvent {
            status,
            fault_record_id: Some(fault_record_id),
            date: stamp.at,
            remark: stamp.remark.clone(),
            cost: None,
            repaired_qty,
            irreparable_qty,
            actor: stamp.actor,
        })
    }

    pub fn with_cost(mut self, cost: Option<Decimal>) -> Self {
        if let LedgerNote::Repair(event) = &mut self {
            event.cost = cost;
        }
        self
    }
}

/// Identity of a ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "serial_number", rename_all = "snake_case")]
pub enum UnitIdentity {
    Serial(String),
    Batch,
}

/// Append-only status record of one unit, or of a bulk batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitLedger {
    pub id: Uuid,
    pub product_id: Uuid,
    pub identity: UnitIdentity,
    /// Current status; for a batch entry, the target of its latest movement
    pub status: UnitStatus,
    /// Quantity per status, only used by batch entries
    pub batch_quantities: BTreeMap<UnitStatus, i64>,
    pub current_location: Option<Uuid>,
    pub archived_at: Option<DateTime<Utc>>,
    pub transfer_history: Vec<TransferRecord>,
    pub repair_history: Vec<RepairEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UnitLedger {
    /// A new serialized unit, available at `location_id`
    pub fn serial(product_id: Uuid, serial: impl Into<String>, location_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            identity: UnitIdentity::Serial(serial.into()),
            status: UnitStatus::Available,
            batch_quantities: BTreeMap::new(),
            current_location: Some(location_id),
            archived_at: None,
            transfer_history: Vec::new(),
            repair_history: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }

    /// The synthetic batch entry of a bulk account
    pub fn batch(product_id: Uuid, location_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            identity: UnitIdentity::Batch,
            ..Self::serial(product_id, String::new(), location_id, at)
        }
    }

    pub fn serial_number(&self) -> Option<&str> {
        match &self.identity {
            UnitIdentity::Serial(serial) => Some(serial),
            UnitIdentity::Batch => None,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self.identity, UnitIdentity::Batch)
    }

    /// A live entry is one that has not left the account
    pub fn is_live(&self) -> bool {
        self.archived_at.is_none()
    }

    fn label(&self) -> String {
        match &self.identity {
            UnitIdentity::Serial(serial) => serial.clone(),
            UnitIdentity::Batch => format!("batch {}", self.product_id),
        }
    }

    /// Units of this entry currently in `status`
    pub fn quantity_in(&self, status: UnitStatus) -> i64 {
        match self.identity {
            UnitIdentity::Batch => self.batch_quantities.get(&status).copied().unwrap_or(0),
            UnitIdentity::Serial(_) if self.status == status && self.is_live() => 1,
            UnitIdentity::Serial(_) => 0,
        }
    }

    /// Credit a received quantity to a batch entry
    pub fn credit_batch(&mut self, quantity: i64, at: DateTime<Utc>) {
        *self.batch_quantities.entry(UnitStatus::Available).or_insert(0) += quantity;
        self.status = UnitStatus::Available;
        self.updated_at = at;
    }

    /// Bring a transferred-out serial back into service at `location_id`
    pub fn reactivate(&mut self, location_id: Uuid, note: &LedgerNote, stamp: &Stamp) -> LedgerResult<()> {
        self.transition(UnitStatus::Transferred, UnitStatus::Available, 1, note, stamp)?;
        self.current_location = Some(location_id);
        Ok(())
    }

    /// Move `quantity` units from `from` to `to`.
    ///
    /// Fails without touching the entry when the transition is not in the
    /// table, when the entry is not in `from`, or when a batch bucket is too
    /// small.
    pub fn transition(
        &mut self,
        from: UnitStatus,
        to: UnitStatus,
        quantity: i64,
        note: &LedgerNote,
        stamp: &Stamp,
    ) -> LedgerResult<()> {
        if !from.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition {
                unit: self.label(),
                from,
                to,
            });
        }

        match self.identity {
            UnitIdentity::Serial(_) => {
                if quantity != 1 {
                    return Err(LedgerError::Validation(format!(
                        "Serialized unit {} moves one at a time",
                        self.label()
                    )));
                }
                if self.status != from {
                    return Err(LedgerError::InvalidTransition {
                        unit: self.label(),
                        from: self.status,
                        to,
                    });
                }
                match to {
                    UnitStatus::Transferred => {
                        self.archived_at = Some(stamp.at);
                        self.current_location = None;
                    }
                    _ if from == UnitStatus::Transferred => self.archived_at = None,
                    _ => {}
                }
            }
            UnitIdentity::Batch => {
                if quantity <= 0 {
                    return Err(LedgerError::Validation(
                        "Batch movement quantity must be positive".to_string(),
                    ));
                }
                let held = self.quantity_in(from);
                if held < quantity {
                    return Err(LedgerError::InsufficientAvailable {
                        bucket: from.as_str().to_string(),
                        available: held,
                        requested: quantity,
                    });
                }
                self.batch_quantities.insert(from, held - quantity);
                *self.batch_quantities.entry(to).or_insert(0) += quantity;
                self.batch_quantities.retain(|_, quantity| *quantity != 0);
            }
        }

        self.status = to;
        self.updated_at = stamp.at;
        match note {
            LedgerNote::None => {}
            LedgerNote::Transfer(record) => self.transfer_history.push(record.clone()),
            LedgerNote::Repair(event) => self.repair_history.push(event.clone()),
        }
        Ok(())
    }
}
