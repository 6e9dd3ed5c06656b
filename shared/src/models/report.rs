//! Read-only views for the reporting layer

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FaultRecord, SourceBreakdown, StockAccount, StockCounters, UnitStatus};

/// Counters of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_id: Uuid,
    pub location_id: Uuid,
    pub product_id: Uuid,
    pub tracks_serial_number: bool,
    pub counters: StockCounters,
    pub source_breakdown: SourceBreakdown,
    pub available_serials: Vec<String>,
    pub open_transfers: usize,
    pub balanced: bool,
}

impl From<&StockAccount> for AccountSummary {
    fn from(account: &StockAccount) -> Self {
        Self {
            account_id: account.id,
            location_id: account.location_id,
            product_id: account.product_id,
            tracks_serial_number: account.tracks_serial_number,
            counters: account.counters.clone(),
            source_breakdown: account.source_breakdown.clone(),
            available_serials: account.serials_in(UnitStatus::Available),
            open_transfers: account.pending_transfers.len(),
            balanced: account.counters.is_balanced(),
        }
    }
}

/// Fault bucket totals of one location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultSummary {
    pub location_id: Uuid,
    pub open_records: i64,
    pub archived_records: i64,
    pub pending_damage: i64,
    pub damaged: i64,
    pub pending_under_repair: i64,
    pub under_repair: i64,
    pub repaired: i64,
    pub in_transit: i64,
    pub transferred: i64,
    pub irreparable: i64,
}

impl FaultSummary {
    pub fn collect<'a>(location_id: Uuid, records: impl IntoIterator<Item = &'a FaultRecord>) -> Self {
        let mut summary = FaultSummary {
            location_id,
            ..Default::default()
        };
        for record in records.into_iter().filter(|r| r.location_id == location_id) {
            if record.archived_at.is_some() {
                summary.archived_records += 1;
                continue;
            }
            summary.open_records += 1;
            summary.pending_damage += record.count(UnitStatus::PendingDamage);
            summary.damaged += record.count(UnitStatus::Damaged);
            summary.pending_under_repair += record.count(UnitStatus::PendingUnderRepair);
            summary.under_repair += record.count(UnitStatus::UnderRepair);
            summary.repaired += record.repaired_qty();
            summary.in_transit += record.in_transit_qty();
            summary.transferred += record.count(UnitStatus::Transferred);
            summary.irreparable += record.count(UnitStatus::Irreparable);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{receive, reject_pending_damage, report_damage};
    use crate::models::{Location, LocationKind, Product};
    use crate::models::SourceClass;
    use crate::types::{Selection, Stamp, StockPayload};

    fn outlet_with_serials(serials: &[&str]) -> (StockAccount, Stamp) {
        let stamp = Stamp::new(Uuid::new_v4(), None);
        let mut account = StockAccount::open(
            &Location::new(LocationKind::Outlet, "Outlet"),
            &Product::serialized("ONT-1", "ONT"),
            stamp.at,
        );
        let payload = StockPayload::Serials(serials.iter().map(|s| s.to_string()).collect());
        receive(&mut account, &payload, SourceClass::DirectPurchase, &stamp).unwrap();
        (account, stamp)
    }

    #[test]
    fn test_account_summary_lists_available_serials() {
        let (mut account, stamp) = outlet_with_serials(&["SN-1", "SN-2"]);
        let mut fault = FaultRecord::open(&account, &stamp);
        report_damage(&mut account, &mut fault, &StockPayload::Serials(vec!["SN-2".into()]), &stamp).unwrap();

        let summary = AccountSummary::from(&account);
        assert_eq!(summary.available_serials, vec!["SN-1".to_string()]);
        assert_eq!(summary.counters.damaged, 1);
        assert!(summary.balanced);
    }

    #[test]
    fn test_fault_summary_separates_archived_records() {
        let (mut account, stamp) = outlet_with_serials(&["SN-1", "SN-2"]);
        let mut open = FaultRecord::open(&account, &stamp);
        report_damage(&mut account, &mut open, &StockPayload::Serials(vec!["SN-1".into()]), &stamp).unwrap();
        let mut denied = FaultRecord::open(&account, &stamp);
        report_damage(&mut account, &mut denied, &StockPayload::Serials(vec!["SN-2".into()]), &stamp).unwrap();
        reject_pending_damage(&mut account, &mut denied, &Selection::All, Uuid::new_v4(), &stamp).unwrap();

        let mut elsewhere = open.clone();
        elsewhere.location_id = Uuid::new_v4();

        let summary = FaultSummary::collect(account.location_id, [&open, &denied, &elsewhere]);
        assert_eq!(summary.open_records, 1);
        assert_eq!(summary.archived_records, 1);
        assert_eq!(summary.pending_damage, 1);
        assert_eq!(summary.damaged, 0);
    }
}
