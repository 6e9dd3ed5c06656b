//! Transfer proposals between stock accounts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{LocationKind, SourceClass, UnitStatus};
use crate::error::{LedgerError, LedgerResult, RecordKind};
use crate::types::{Decision, Selection, Stamp, StockPayload};

/// Kind of movement a proposal represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// Available stock between the company's own locations
    Replenishment,
    /// Available stock from a center or warehouse to a reseller
    CenterReturn,
    /// Repaired units to a reseller
    RepairedDelivery,
    /// Repaired units back to an outlet, possibly the one holding them
    RepairReturn,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Replenishment => "replenishment",
            TransferKind::CenterReturn => "center_return",
            TransferKind::RepairedDelivery => "repaired_delivery",
            TransferKind::RepairReturn => "repair_return",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "replenishment" => Some(TransferKind::Replenishment),
            "center_return" => Some(TransferKind::CenterReturn),
            "repaired_delivery" => Some(TransferKind::RepairedDelivery),
            "repair_return" => Some(TransferKind::RepairReturn),
            _ => None,
        }
    }

    /// Status the units leave from, and return to on rejection
    pub fn origin_status(&self) -> UnitStatus {
        if self.is_repaired_origin() {
            UnitStatus::Repaired
        } else {
            UnitStatus::Available
        }
    }

    pub fn is_repaired_origin(&self) -> bool {
        matches!(self, TransferKind::RepairedDelivery | TransferKind::RepairReturn)
    }

    /// Source class credited at the destination on acceptance
    pub fn destination_class(&self) -> SourceClass {
        match self {
            TransferKind::Replenishment => SourceClass::StockTransfer,
            TransferKind::CenterReturn => SourceClass::CenterReturn,
            TransferKind::RepairedDelivery | TransferKind::RepairReturn => SourceClass::DamageRepair,
        }
    }

    /// Whether a transfer of this kind may run between the two locations
    pub fn allows(&self, source: LocationKind, destination: LocationKind, same_location: bool) -> bool {
        use LocationKind::*;
        if same_location && *self != TransferKind::RepairReturn {
            return false;
        }
        match self {
            TransferKind::Replenishment => {
                matches!(source, Center | Warehouse) && matches!(destination, Outlet | Warehouse)
            }
            TransferKind::CenterReturn => {
                matches!(source, Center | Warehouse) && destination == Reseller
            }
            TransferKind::RepairedDelivery => source.is_internal() && destination == Reseller,
            TransferKind::RepairReturn => source.is_internal() && destination == Outlet,
        }
    }
}

impl std::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ProposalStatus::Pending),
            "accepted" => Some(ProposalStatus::Accepted),
            "rejected" => Some(ProposalStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quantity and serials of one part of a proposal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalItems {
    pub quantity: i64,
    pub serials: Vec<String>,
}

impl ProposalItems {
    pub fn from_payload(payload: &StockPayload) -> Self {
        Self {
            quantity: payload.count(),
            serials: payload.serials().to_vec(),
        }
    }

    fn add(&mut self, payload: &StockPayload) {
        self.quantity += payload.count();
        self.serials.extend(payload.serials().iter().cloned());
    }

    fn remove(&mut self, payload: &StockPayload) {
        self.quantity -= payload.count();
        let gone = payload.serials();
        self.serials.retain(|serial| !gone.contains(serial));
    }

    pub fn is_empty(&self) -> bool {
        self.quantity == 0
    }
}

/// Which transfer kinds need an attached document before acceptance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPolicy {
    pub require_document_for: Vec<TransferKind>,
}

impl TransferPolicy {
    pub fn requires_document(&self, kind: TransferKind) -> bool {
        self.require_document_for.contains(&kind)
    }
}

/// A request to move units from one account to another, pending until
/// the receiving party accepts or rejects every unit on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProposal {
    pub id: Uuid,
    pub kind: TransferKind,
    pub product_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub is_serialized: bool,
    /// Upstream repair records, set for repaired-origin kinds
    pub fault_record_id: Option<Uuid>,
    pub repair_transfer_id: Option<Uuid>,
    pub quantity: i64,
    pub pending: ProposalItems,
    pub accepted: ProposalItems,
    pub rejected: ProposalItems,
    pub status: ProposalStatus,
    pub document_ref: Option<String>,
    pub remark: Option<String>,
    pub rejection_reason: Option<String>,
    pub transferred_by: Uuid,
    pub transfer_date: DateTime<Utc>,
    pub accepted_by: Option<Uuid>,
    pub rejected_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TransferProposal {
    pub fn same_location(&self) -> bool {
        self.from_location_id == self.to_location_id
    }

    /// Resolution applies only while the proposal is pending
    pub fn ensure_pending(&self) -> LedgerResult<()> {
        if self.status != ProposalStatus::Pending {
            return Err(LedgerError::ProposalNotPending {
                proposal_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Resolve a selection against what is still pending
    pub fn select(&self, selection: &Selection) -> LedgerResult<StockPayload> {
        let remaining = self.pending.quantity;
        match selection {
            Selection::All if self.is_serialized => Ok(StockPayload::Serials(self.pending.serials.clone())),
            Selection::All => Ok(StockPayload::Quantity(remaining)),
            Selection::Quantity(_) if self.is_serialized => Err(LedgerError::Validation(
                "Serialized transfers are resolved by serial number".to_string(),
            )),
            Selection::Quantity(quantity) => {
                if *quantity <= 0 {
                    return Err(LedgerError::Validation("Quantity must be positive".to_string()));
                }
                if *quantity > remaining {
                    return Err(LedgerError::ExceedsPending {
                        stage: "pending_outgoing".to_string(),
                        pending: remaining,
                        requested: *quantity,
                    });
                }
                Ok(StockPayload::Quantity(*quantity))
            }
            Selection::Serials(_) if !self.is_serialized => Err(LedgerError::Validation(
                "Bulk transfers are resolved by quantity".to_string(),
            )),
            Selection::Serials(serials) => {
                if serials.len() as i64 > remaining {
                    return Err(LedgerError::ExceedsPending {
                        stage: "pending_outgoing".to_string(),
                        pending: remaining,
                        requested: serials.len() as i64,
                    });
                }
                let mut seen = std::collections::BTreeSet::new();
                for serial in serials {
                    if !seen.insert(serial) {
                        return Err(LedgerError::Validation(format!(
                            "Serial number {} is listed twice",
                            serial
                        )));
                    }
                    if !self.pending.serials.contains(serial) {
                        return Err(LedgerError::not_found(RecordKind::Unit, serial));
                    }
                }
                Ok(StockPayload::Serials(serials.clone()))
            }
        }
    }

    /// Book the outcome for `payload`; the proposal becomes terminal once
    /// nothing is left pending
    pub fn settle(&mut self, decision: Decision, payload: &StockPayload, reason: Option<&str>, stamp: &Stamp) {
        self.pending.remove(payload);
        match decision {
            Decision::Accept => {
                self.accepted.add(payload);
                self.accepted_by = Some(stamp.actor);
            }
            Decision::Reject => {
                self.rejected.add(payload);
                self.rejected_by = Some(stamp.actor);
                if let Some(reason) = reason {
                    self.rejection_reason = Some(reason.to_string());
                }
            }
        }
        if self.pending.is_empty() {
            self.status = if self.accepted.is_empty() {
                ProposalStatus::Rejected
            } else {
                ProposalStatus::Accepted
            };
            self.resolved_at = Some(stamp.at);
        }
        self.updated_at = stamp.at;
    }

    /// Every unit is accounted for in exactly one part
    pub fn check_items(&self) -> bool {
        self.pending.quantity + self.accepted.quantity + self.rejected.quantity == self.quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(serialized: bool, quantity: i64) -> TransferProposal {
        let payload = if serialized {
            StockPayload::Serials((0..quantity).map(|i| format!("SN-{}", i)).collect())
        } else {
            StockPayload::Quantity(quantity)
        };
        let now = Utc::now();
        TransferProposal {
            id: Uuid::new_v4(),
            kind: TransferKind::Replenishment,
            product_id: Uuid::new_v4(),
            from_location_id: Uuid::new_v4(),
            to_location_id: Uuid::new_v4(),
            is_serialized: serialized,
            fault_record_id: None,
            repair_transfer_id: None,
            quantity,
            pending: ProposalItems::from_payload(&payload),
            accepted: ProposalItems::default(),
            rejected: ProposalItems::default(),
            status: ProposalStatus::Pending,
            document_ref: None,
            remark: None,
            rejection_reason: None,
            transferred_by: Uuid::new_v4(),
            transfer_date: now,
            accepted_by: None,
            rejected_by: None,
            resolved_at: None,
            updated_at: now,
        }
    }

    #[test]
    fn test_kind_routes() {
        use LocationKind::*;
        assert!(TransferKind::Replenishment.allows(Center, Outlet, false));
        assert!(!TransferKind::Replenishment.allows(Outlet, Reseller, false));
        assert!(TransferKind::CenterReturn.allows(Warehouse, Reseller, false));
        assert!(!TransferKind::CenterReturn.allows(Outlet, Reseller, false));
        assert!(TransferKind::RepairReturn.allows(Outlet, Outlet, true));
        assert!(!TransferKind::RepairedDelivery.allows(Outlet, Outlet, true));
        assert_eq!(TransferKind::RepairReturn.origin_status(), UnitStatus::Repaired);
    }

    #[test]
    fn test_partial_settlement() {
        let mut p = proposal(false, 5);
        let stamp = Stamp::new(Uuid::new_v4(), None);

        let part = p.select(&Selection::Quantity(2)).unwrap();
        p.settle(Decision::Reject, &part, Some("short"), &stamp);
        assert_eq!(p.status, ProposalStatus::Pending);
        assert_eq!(p.pending.quantity, 3);

        let rest = p.select(&Selection::All).unwrap();
        p.settle(Decision::Accept, &rest, None, &stamp);
        assert_eq!(p.status, ProposalStatus::Accepted);
        assert!(p.check_items());
        assert_eq!(p.ensure_pending().unwrap_err().code(), "PROPOSAL_NOT_PENDING");
    }

    #[test]
    fn test_full_rejection() {
        let mut p = proposal(true, 2);
        let stamp = Stamp::new(Uuid::new_v4(), None);
        let all = p.select(&Selection::All).unwrap();
        p.settle(Decision::Reject, &all, Some("wrong model"), &stamp);
        assert_eq!(p.status, ProposalStatus::Rejected);
        assert_eq!(p.rejection_reason.as_deref(), Some("wrong model"));
        assert!(p.pending.serials.is_empty());
    }

    #[test]
    fn test_select_guards() {
        let p = proposal(false, 3);
        assert_eq!(p.select(&Selection::Quantity(4)).unwrap_err().code(), "EXCEEDS_PENDING");

        let p = proposal(true, 2);
        let err = p.select(&Selection::Serials(vec!["SN-9".into()])).unwrap_err();
        assert_eq!(err.code(), "RECORD_NOT_FOUND");
    }
}
