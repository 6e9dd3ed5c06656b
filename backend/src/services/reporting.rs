//! Read-only reporting over stock accounts and fault records

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use shared::{AccountSummary, FaultSummary};

use crate::error::{AppError, AppResult};
use crate::services::store::LedgerTx;

/// One CSV line per stock account
#[derive(Debug, Clone, Serialize)]
pub struct StockReportRow {
    pub location_id: Uuid,
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
    pub open_transfers: usize,
    pub balanced: bool,
}

impl From<&AccountSummary> for StockReportRow {
    fn from(summary: &AccountSummary) -> Self {
        let c = &summary.counters;
        Self {
            location_id: summary.location_id,
            product_id: summary.product_id,
            tracks_serial_number: summary.tracks_serial_number,
            total: c.total,
            available: c.available,
            consumed: c.consumed,
            damaged: c.damaged,
            repair: c.repair,
            repaired: c.repaired,
            irreparable: c.irreparable,
            pending_incoming: c.pending_incoming,
            pending_outgoing: c.pending_outgoing,
            transferred_out: c.transferred_out,
            open_transfers: summary.open_transfers,
            balanced: summary.balanced,
        }
    }
}

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
}

impl ReportingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn fault_summary(&self, location_id: Uuid) -> AppResult<FaultSummary> {
        let mut tx = LedgerTx::begin(&self.db).await?;
        tx.location(location_id).await?;
        let faults = tx.faults_at(location_id).await?;
        Ok(FaultSummary::collect(location_id, faults.iter()))
    }

    pub async fn stock_rows(&self, location_id: Uuid) -> AppResult<Vec<StockReportRow>> {
        let mut tx = LedgerTx::begin(&self.db).await?;
        tx.location(location_id).await?;
        let accounts = tx.accounts_at(location_id).await?;
        Ok(accounts
            .iter()
            .map(|account| StockReportRow::from(&AccountSummary::from(account)))
            .collect())
    }

    /// Export data to CSV format
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_to_csv_writes_header_and_rows() {
        let row = StockReportRow {
            location_id: Uuid::nil(),
            product_id: Uuid::nil(),
            tracks_serial_number: false,
            total: 10,
            available: 6,
            consumed: 0,
            damaged: 0,
            repair: 0,
            repaired: 0,
            irreparable: 0,
            pending_incoming: 0,
            pending_outgoing: 4,
            transferred_out: 0,
            open_transfers: 1,
            balanced: true,
        };
        let csv = ReportingService::export_to_csv(&[row]).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("location_id,product_id,tracks_serial_number,total,available"));
        assert!(lines.next().unwrap().contains(",10,6,"));
        assert!(lines.next().is_none());
    }
}
