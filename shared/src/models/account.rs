//! Location stock account: per (location, product) counters and the unit
//! ledgers held by the account

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{LedgerNote, Location, LocationKind, Product, UnitLedger, UnitStatus};
use crate::error::{LedgerError, LedgerResult, RecordKind};
use crate::quantity::{clamp_counter, take, QuantityAnomaly};
use crate::types::{AccountKey, Stamp, StockPayload};

/// A counter of a stock account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Available,
    Consumed,
    Damaged,
    Repair,
    Repaired,
    Irreparable,
    PendingIncoming,
    PendingOutgoing,
    TransferredOut,
}

impl Bucket {
    /// Buckets whose sum must equal the account total
    pub const HELD: [Bucket; 8] = [
        Bucket::Available,
        Bucket::Consumed,
        Bucket::Damaged,
        Bucket::Repair,
        Bucket::Repaired,
        Bucket::Irreparable,
        Bucket::PendingOutgoing,
        Bucket::TransferredOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Available => "available",
            Bucket::Consumed => "consumed",
            Bucket::Damaged => "damaged",
            Bucket::Repair => "repair",
            Bucket::Repaired => "repaired",
            Bucket::Irreparable => "irreparable",
            Bucket::PendingIncoming => "pending_incoming",
            Bucket::PendingOutgoing => "pending_outgoing",
            Bucket::TransferredOut => "transferred_out",
        }
    }

    /// The counter a unit in `status` is booked under
    pub fn for_status(status: UnitStatus) -> Bucket {
        match status {
            UnitStatus::Available => Bucket::Available,
            UnitStatus::Consumed => Bucket::Consumed,
            UnitStatus::PendingDamage | UnitStatus::Damaged => Bucket::Damaged,
            UnitStatus::PendingUnderRepair | UnitStatus::UnderRepair => Bucket::Repair,
            UnitStatus::Repaired => Bucket::Repaired,
            UnitStatus::Irreparable => Bucket::Irreparable,
            UnitStatus::PendingTransfer => Bucket::PendingOutgoing,
            UnitStatus::Transferred => Bucket::TransferredOut,
        }
    }
}

/// Aggregate counters of a stock account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCounters {
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
}

impl StockCounters {
    pub fn get(&self, bucket: Bucket) -> i64 {
        match bucket {
            Bucket::Available => self.available,
            Bucket::Consumed => self.consumed,
            Bucket::Damaged => self.damaged,
            Bucket::Repair => self.repair,
            Bucket::Repaired => self.repaired,
            Bucket::Irreparable => self.irreparable,
            Bucket::PendingIncoming => self.pending_incoming,
            Bucket::PendingOutgoing => self.pending_outgoing,
            Bucket::TransferredOut => self.transferred_out,
        }
    }

    fn slot(&mut self, bucket: Bucket) -> &mut i64 {
        match bucket {
            Bucket::Available => &mut self.available,
            Bucket::Consumed => &mut self.consumed,
            Bucket::Damaged => &mut self.damaged,
            Bucket::Repair => &mut self.repair,
            Bucket::Repaired => &mut self.repaired,
            Bucket::Irreparable => &mut self.irreparable,
            Bucket::PendingIncoming => &mut self.pending_incoming,
            Bucket::PendingOutgoing => &mut self.pending_outgoing,
            Bucket::TransferredOut => &mut self.transferred_out,
        }
    }

    pub fn take(&mut self, bucket: Bucket, quantity: i64) -> LedgerResult<()> {
        take(self.slot(bucket), quantity, bucket.as_str())
    }

    pub fn put(&mut self, bucket: Bucket, quantity: i64) {
        *self.slot(bucket) += quantity;
    }

    pub fn shift(&mut self, from: Bucket, to: Bucket, quantity: i64) -> LedgerResult<()> {
        if from == to {
            return Ok(());
        }
        self.take(from, quantity)?;
        self.put(to, quantity);
        Ok(())
    }

    /// Sum of every counter that is part of the total
    pub fn held(&self) -> i64 {
        Bucket::HELD.iter().map(|bucket| self.get(*bucket)).sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.held() == self.total
    }

    pub fn has_negative(&self) -> bool {
        self.total < 0
            || Bucket::HELD
                .iter()
                .chain(std::iter::once(&Bucket::PendingIncoming))
                .any(|bucket| self.get(*bucket) < 0)
    }

    fn clamp(&mut self, record_id: Uuid, anomalies: &mut Vec<QuantityAnomaly>) {
        clamp_counter(record_id, "total", &mut self.total, anomalies);
        for bucket in Bucket::HELD.iter().chain(std::iter::once(&Bucket::PendingIncoming)) {
            clamp_counter(record_id, bucket.as_str(), self.slot(*bucket), anomalies);
        }
    }
}

/// Origin class of received quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceClass {
    DirectPurchase,
    CenterReturn,
    DamageRepair,
    StockTransfer,
}

impl SourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceClass::DirectPurchase => "direct_purchase",
            SourceClass::CenterReturn => "center_return",
            SourceClass::DamageRepair => "damage_repair",
            SourceClass::StockTransfer => "stock_transfer",
        }
    }
}

/// Received quantity attributed to each origin class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBreakdown {
    pub direct_purchase: i64,
    pub center_return: i64,
    pub damage_repair: i64,
    pub stock_transfer: i64,
}

impl SourceBreakdown {
    pub fn credit(&mut self, class: SourceClass, quantity: i64) {
        match class {
            SourceClass::DirectPurchase => self.direct_purchase += quantity,
            SourceClass::CenterReturn => self.center_return += quantity,
            SourceClass::DamageRepair => self.damage_repair += quantity,
            SourceClass::StockTransfer => self.stock_transfer += quantity,
        }
    }

    pub fn sum(&self) -> i64 {
        self.direct_purchase + self.center_return + self.damage_repair + self.stock_transfer
    }
}

/// Stock of one product at one location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAccount {
    pub id: Uuid,
    pub location_id: Uuid,
    pub location_kind: LocationKind,
    pub product_id: Uuid,
    pub tracks_serial_number: bool,
    pub counters: StockCounters,
    pub source_breakdown: SourceBreakdown,
    /// Every serial ever held by the account, live or archived
    pub units: BTreeMap<String, UnitLedger>,
    /// Synthetic batch entry, present only for bulk products
    pub batch: Option<UnitLedger>,
    /// Open proposals naming this account as source or destination
    pub pending_transfers: Vec<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockAccount {
    /// An empty account, created on the first movement into a location
    pub fn open(location: &Location, product: &Product, at: DateTime<Utc>) -> Self {
        let batch = if product.tracks_serial_number {
            None
        } else {
            Some(UnitLedger::batch(product.id, location.id, at))
        };
        Self {
            id: Uuid::new_v4(),
            location_id: location.id,
            location_kind: location.kind,
            product_id: product.id,
            tracks_serial_number: product.tracks_serial_number,
            counters: StockCounters::default(),
            source_breakdown: SourceBreakdown::default(),
            units: BTreeMap::new(),
            batch,
            pending_transfers: Vec::new(),
            version: 0,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn key(&self) -> AccountKey {
        AccountKey::new(self.location_id, self.product_id)
    }

    /// Reject payloads whose shape does not match the product's tracking mode
    pub fn check_payload(&self, payload: &StockPayload) -> LedgerResult<()> {
        if payload.is_serialized() != self.tracks_serial_number {
            return Err(LedgerError::TrackingMismatch {
                product_id: self.product_id,
                serialized: self.tracks_serial_number,
            });
        }
        if payload.count() <= 0 {
            return Err(LedgerError::Validation("Quantity must be positive".to_string()));
        }
        Ok(())
    }

    pub fn unit(&self, serial: &str) -> LedgerResult<&UnitLedger> {
        self.units
            .get(serial)
            .ok_or_else(|| LedgerError::not_found(RecordKind::Unit, serial))
    }

    /// Live serials currently in `status`
    pub fn serials_in(&self, status: UnitStatus) -> Vec<String> {
        self.units
            .iter()
            .filter(|(_, unit)| unit.is_live() && unit.status == status)
            .map(|(serial, _)| serial.clone())
            .collect()
    }

    /// Units in `status`, by serial count or batch bucket
    pub fn quantity_in(&self, status: UnitStatus) -> i64 {
        match &self.batch {
            Some(batch) => batch.quantity_in(status),
            None => self.units.values().map(|unit| unit.quantity_in(status)).sum(),
        }
    }

    /// Credit new stock as available.
    ///
    /// Serials are created, or reactivated when they were transferred out of
    /// this account earlier. A serial that is still live here is a duplicate.
    pub fn receive(
        &mut self,
        payload: &StockPayload,
        class: SourceClass,
        note: &LedgerNote,
        stamp: &Stamp,
    ) -> LedgerResult<()> {
        self.check_payload(payload)?;
        let quantity = payload.count();
        let (product_id, location_id) = (self.product_id, self.location_id);
        let mut next = self.clone();

        match payload {
            StockPayload::Quantity(_) => {
                let batch = next
                    .batch
                    .get_or_insert_with(|| UnitLedger::batch(product_id, location_id, stamp.at));
                batch.credit_batch(quantity, stamp.at);
                if let LedgerNote::Transfer(record) = note {
                    batch.transfer_history.push(record.clone());
                }
            }
            StockPayload::Serials(serials) => {
                for serial in serials {
                    match next.units.get_mut(serial) {
                        Some(unit) if unit.is_live() => {
                            return Err(LedgerError::DuplicateSerial {
                                serial: serial.clone(),
                                location_id,
                            })
                        }
                        Some(unit) => unit.reactivate(location_id, note, stamp)?,
                        None => {
                            let mut unit = UnitLedger::serial(product_id, serial.clone(), location_id, stamp.at);
                            if let LedgerNote::Transfer(record) = note {
                                unit.transfer_history.push(record.clone());
                            }
                            next.units.insert(serial.clone(), unit);
                        }
                    }
                }
            }
        }

        next.counters.total += quantity;
        next.counters.available += quantity;
        next.source_breakdown.credit(class, quantity);
        next.touch(stamp.at);
        *self = next;
        Ok(())
    }

    /// Move units between statuses, keeping counters in step.
    ///
    /// Unit ledgers and the counters booked for `from` and `to` change
    /// together; nothing changes when any unit cannot move.
    pub fn transition_units(
        &mut self,
        payload: &StockPayload,
        from: UnitStatus,
        to: UnitStatus,
        note: &LedgerNote,
        stamp: &Stamp,
    ) -> LedgerResult<()> {
        self.check_payload(payload)?;
        let mut next = self.clone();

        match payload {
            StockPayload::Quantity(quantity) => {
                let batch = next
                    .batch
                    .as_mut()
                    .ok_or_else(|| LedgerError::not_found(RecordKind::Unit, format!("batch {}", self.product_id)))?;
                batch.transition(from, to, *quantity, note, stamp)?;
            }
            StockPayload::Serials(serials) => {
                for serial in serials {
                    let unit = next
                        .units
                        .get_mut(serial)
                        .ok_or_else(|| LedgerError::not_found(RecordKind::Unit, serial))?;
                    unit.transition(from, to, 1, note, stamp)?;
                }
            }
        }

        next.counters
            .shift(Bucket::for_status(from), Bucket::for_status(to), payload.count())?;
        next.touch(stamp.at);
        *self = next;
        Ok(())
    }

    pub fn track_proposal(&mut self, proposal_id: Uuid) {
        if !self.pending_transfers.contains(&proposal_id) {
            self.pending_transfers.push(proposal_id);
        }
    }

    pub fn untrack_proposal(&mut self, proposal_id: Uuid) {
        self.pending_transfers.retain(|id| *id != proposal_id);
    }

    /// Clamp drifted counters before persistence
    pub fn clamp_counters(&mut self) -> Vec<QuantityAnomaly> {
        let mut anomalies = Vec::new();
        self.counters.clamp(self.id, &mut anomalies);
        anomalies
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(serialized: bool) -> StockAccount {
        let location = Location::new(LocationKind::Center, "Main");
        let product = if serialized {
            Product::serialized("RTR-1", "Router")
        } else {
            Product::bulk("CBL-1", "Cable")
        };
        StockAccount::open(&location, &product, Utc::now())
    }

    fn stamp() -> Stamp {
        Stamp::new(Uuid::new_v4(), None)
    }

    #[test]
    fn test_receive_bulk() {
        let mut acc = account(false);
        acc.receive(&StockPayload::Quantity(10), SourceClass::DirectPurchase, &LedgerNote::None, &stamp())
            .unwrap();
        assert_eq!(acc.counters.total, 10);
        assert_eq!(acc.counters.available, 10);
        assert_eq!(acc.source_breakdown.sum(), 10);
        assert_eq!(acc.quantity_in(UnitStatus::Available), 10);
        assert!(acc.counters.is_balanced());
    }

    #[test]
    fn test_receive_duplicate_serial() {
        let mut acc = account(true);
        let payload = StockPayload::Serials(vec!["SN-1".into()]);
        acc.receive(&payload, SourceClass::DirectPurchase, &LedgerNote::None, &stamp())
            .unwrap();
        let err = acc
            .receive(&payload, SourceClass::DirectPurchase, &LedgerNote::None, &stamp())
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_SERIAL");
        assert_eq!(acc.counters.total, 1);
    }

    #[test]
    fn test_tracking_mismatch() {
        let mut acc = account(true);
        let err = acc
            .receive(&StockPayload::Quantity(2), SourceClass::DirectPurchase, &LedgerNote::None, &stamp())
            .unwrap_err();
        assert_eq!(err.code(), "TRACKING_MISMATCH");
    }

    #[test]
    fn test_transition_units_is_all_or_nothing() {
        let mut acc = account(true);
        acc.receive(
            &StockPayload::Serials(vec!["A".into(), "B".into()]),
            SourceClass::DirectPurchase,
            &LedgerNote::None,
            &stamp(),
        )
        .unwrap();
        acc.transition_units(
            &StockPayload::Serials(vec!["B".into()]),
            UnitStatus::Available,
            UnitStatus::Consumed,
            &LedgerNote::None,
            &stamp(),
        )
        .unwrap();

        let before = acc.clone();
        let err = acc
            .transition_units(
                &StockPayload::Serials(vec!["A".into(), "B".into()]),
                UnitStatus::Available,
                UnitStatus::PendingDamage,
                &LedgerNote::None,
                &stamp(),
            )
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
        assert_eq!(acc, before);
    }

    #[test]
    fn test_transition_shifts_buckets() {
        let mut acc = account(false);
        acc.receive(&StockPayload::Quantity(5), SourceClass::DirectPurchase, &LedgerNote::None, &stamp())
            .unwrap();
        acc.transition_units(
            &StockPayload::Quantity(2),
            UnitStatus::Available,
            UnitStatus::PendingDamage,
            &LedgerNote::None,
            &stamp(),
        )
        .unwrap();
        assert_eq!(acc.counters.available, 3);
        assert_eq!(acc.counters.damaged, 2);

        acc.transition_units(
            &StockPayload::Quantity(2),
            UnitStatus::PendingDamage,
            UnitStatus::Damaged,
            &LedgerNote::None,
            &stamp(),
        )
        .unwrap();
        assert_eq!(acc.counters.damaged, 2);
        assert!(acc.counters.is_balanced());
    }

    #[test]
    fn test_clamp_reports_drift() {
        let mut acc = account(false);
        acc.counters.damaged = -2;
        let anomalies = acc.clamp_counters();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].field, "damaged");
        assert_eq!(acc.counters.damaged, 0);
    }
}
