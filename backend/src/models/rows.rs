//! Table rows and their conversion to domain records

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{types::Json, FromRow};
use uuid::Uuid;

use shared::{
    FaultEvent, FaultRecord, FaultStatus, Location, LocationKind, Product, ProposalItems, ProposalStatus,
    RepairEvent, RepairTransfer, RepairTransferStatus, SourceBreakdown, StageBook, StockAccount, StockCounters,
    TransferKind, TransferProposal, TransferRecord, UnitIdentity, UnitLedger, UnitStatus,
};

use crate::error::{AppError, AppResult};

fn parse_column<T>(value: &str, column: &str, parse: fn(&str) -> Option<T>) -> AppResult<T> {
    parse(value).ok_or_else(|| AppError::Internal(format!("Unknown {} value in database: {}", column, value)))
}

#[derive(Debug, Clone, FromRow)]
pub struct LocationRow {
    pub id: Uuid,
    pub kind: String,
    pub name: String,
}

impl TryFrom<LocationRow> for Location {
    type Error = AppError;

    fn try_from(row: LocationRow) -> AppResult<Self> {
        Ok(Location {
            id: row.id,
            kind: parse_column(&row.kind, "location kind", LocationKind::parse)?,
            name: row.name,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub tracks_serial_number: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            sku: row.sku,
            name: row.name,
            tracks_serial_number: row.tracks_serial_number,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct StockAccountRow {
    pub id: Uuid,
    pub location_id: Uuid,
    pub location_kind: String,
    pub product_id: Uuid,
    pub tracks_serial_number: bool,
    pub total: i64,
    pub available: i64,
    pub consumed: i64,
    pub damaged: i64,
    pub repair: i64,
    pub repaired: i64,
    pub irreparable: i64,
    pub pending_incoming: i64,
    pub pending_outgoing: i64,
    pub transferred_out: i64,
    pub source_breakdown: Json<SourceBreakdown>,
    pub pending_transfers: Json<Vec<Uuid>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UnitLedgerRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub product_id: Uuid,
    pub serial_number: Option<String>,
    pub status: String,
    pub batch_quantities: Json<BTreeMap<UnitStatus, i64>>,
    pub current_location: Option<Uuid>,
    pub archived_at: Option<DateTime<Utc>>,
    pub transfer_history: Json<Vec<TransferRecord>>,
    pub repair_history: Json<Vec<RepairEvent>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UnitLedgerRow> for UnitLedger {
    type Error = AppError;

    fn try_from(row: UnitLedgerRow) -> AppResult<Self> {
        Ok(UnitLedger {
            id: row.id,
            product_id: row.product_id,
            identity: match row.serial_number {
                Some(serial) => UnitIdentity::Serial(serial),
                None => UnitIdentity::Batch,
            },
            status: parse_column(&row.status, "unit status", UnitStatus::parse)?,
            batch_quantities: row.batch_quantities.0,
            current_location: row.current_location,
            archived_at: row.archived_at,
            transfer_history: row.transfer_history.0,
            repair_history: row.repair_history.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl StockAccountRow {
    /// Assemble the account from its row and its unit ledger rows
    pub fn into_account(self, unit_rows: Vec<UnitLedgerRow>) -> AppResult<StockAccount> {
        let mut units = BTreeMap::new();
        let mut batch = None;
        for row in unit_rows {
            let unit = UnitLedger::try_from(row)?;
            match &unit.identity {
                UnitIdentity::Serial(serial) => {
                    units.insert(serial.clone(), unit);
                }
                UnitIdentity::Batch => batch = Some(unit),
            }
        }

        Ok(StockAccount {
            id: self.id,
            location_id: self.location_id,
            location_kind: parse_column(&self.location_kind, "location kind", LocationKind::parse)?,
            product_id: self.product_id,
            tracks_serial_number: self.tracks_serial_number,
            counters: StockCounters {
                total: self.total,
                available: self.available,
                consumed: self.consumed,
                damaged: self.damaged,
                repair: self.repair,
                repaired: self.repaired,
                irreparable: self.irreparable,
                pending_incoming: self.pending_incoming,
                pending_outgoing: self.pending_outgoing,
                transferred_out: self.transferred_out,
            },
            source_breakdown: self.source_breakdown.0,
            units,
            batch,
            pending_transfers: self.pending_transfers.0,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FaultRecordRow {
    pub id: Uuid,
    pub location_id: Uuid,
    pub product_id: Uuid,
    pub is_serialized: bool,
    pub damage_qty: i64,
    pub stages: Json<StageBook>,
    pub status: String,
    pub pending_damage_history: Json<Vec<FaultEvent>>,
    pub repair_history: Json<Vec<FaultEvent>>,
    pub applied_requests: Json<Vec<Uuid>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub reported_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<FaultRecordRow> for FaultRecord {
    type Error = AppError;

    fn try_from(row: FaultRecordRow) -> AppResult<Self> {
        Ok(FaultRecord {
            id: row.id,
            location_id: row.location_id,
            product_id: row.product_id,
            is_serialized: row.is_serialized,
            damage_qty: row.damage_qty,
            stages: row.stages.0,
            status: parse_column(&row.status, "fault status", FaultStatus::parse)?,
            pending_damage_history: row.pending_damage_history.0,
            repair_history: row.repair_history.0,
            applied_requests: row.applied_requests.0,
            archived_at: row.archived_at,
            reported_by: row.reported_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RepairTransferRow {
    pub id: Uuid,
    pub fault_record_id: Uuid,
    pub location_id: Uuid,
    pub product_id: Uuid,
    pub repair_center_id: Uuid,
    pub is_serialized: bool,
    pub quantity: i64,
    pub stages: Json<StageBook>,
    pub status: String,
    pub total_cost: Decimal,
    pub history: Json<Vec<FaultEvent>>,
    pub sent_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RepairTransferRow> for RepairTransfer {
    type Error = AppError;

    fn try_from(row: RepairTransferRow) -> AppResult<Self> {
        Ok(RepairTransfer {
            id: row.id,
            fault_record_id: row.fault_record_id,
            location_id: row.location_id,
            product_id: row.product_id,
            repair_center_id: row.repair_center_id,
            is_serialized: row.is_serialized,
            quantity: row.quantity,
            stages: row.stages.0,
            status: parse_column(&row.status, "repair transfer status", RepairTransferStatus::parse)?,
            total_cost: row.total_cost,
            history: row.history.0,
            sent_by: row.sent_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TransferProposalRow {
    pub id: Uuid,
    pub kind: String,
    pub product_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub is_serialized: bool,
    pub fault_record_id: Option<Uuid>,
    pub repair_transfer_id: Option<Uuid>,
    pub quantity: i64,
    pub pending: Json<ProposalItems>,
    pub accepted: Json<ProposalItems>,
    pub rejected: Json<ProposalItems>,
    pub status: String,
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

impl TryFrom<TransferProposalRow> for TransferProposal {
    type Error = AppError;

    fn try_from(row: TransferProposalRow) -> AppResult<Self> {
        Ok(TransferProposal {
            id: row.id,
            kind: parse_column(&row.kind, "transfer kind", TransferKind::parse)?,
            product_id: row.product_id,
            from_location_id: row.from_location_id,
            to_location_id: row.to_location_id,
            is_serialized: row.is_serialized,
            fault_record_id: row.fault_record_id,
            repair_transfer_id: row.repair_transfer_id,
            quantity: row.quantity,
            pending: row.pending.0,
            accepted: row.accepted.0,
            rejected: row.rejected.0,
            status: parse_column(&row.status, "proposal status", ProposalStatus::parse)?,
            document_ref: row.document_ref,
            remark: row.remark,
            rejection_reason: row.rejection_reason,
            transferred_by: row.transferred_by,
            transfer_date: row.transfer_date,
            accepted_by: row.accepted_by,
            rejected_by: row.rejected_by,
            resolved_at: row.resolved_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_row(serial: Option<&str>, status: &str) -> UnitLedgerRow {
        let now = Utc::now();
        UnitLedgerRow {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            serial_number: serial.map(str::to_string),
            status: status.to_string(),
            batch_quantities: Json(BTreeMap::new()),
            current_location: None,
            archived_at: None,
            transfer_history: Json(vec![]),
            repair_history: Json(vec![]),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_unit_row_identity() {
        let unit = UnitLedger::try_from(unit_row(Some("SN-1"), "pending_damage")).unwrap();
        assert_eq!(unit.identity, UnitIdentity::Serial("SN-1".to_string()));
        assert_eq!(unit.status, UnitStatus::PendingDamage);

        let batch = UnitLedger::try_from(unit_row(None, "available")).unwrap();
        assert_eq!(batch.identity, UnitIdentity::Batch);
    }

    #[test]
    fn test_unknown_status_is_internal_error() {
        let err = UnitLedger::try_from(unit_row(Some("SN-1"), "lost")).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
