//! Transactional record store
//!
//! Every ledger operation runs inside one [`LedgerTx`]: it locks the rows it
//! touches, hands the records to the shared engine, writes them back and
//! commits. Dropping the transaction without committing rolls everything
//! back.
//!
//! Rows are locked in a fixed order to keep concurrent operations from
//! deadlocking: transfer proposals, fault records, repair transfers, then
//! stock accounts ordered by id.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::{
    AccountKey, FaultRecord, LedgerError, Location, Product, RecordKind, RepairTransfer, StockAccount,
    TransferProposal, UnitIdentity, UnitLedger,
};

use crate::error::{map_unique_violation, AppError, AppResult};
use crate::models::{
    FaultRecordRow, LocationRow, ProductRow, RepairTransferRow, StockAccountRow, TransferProposalRow, UnitLedgerRow,
};

const ACCOUNT_COLUMNS: &str = r#"
    id, location_id, location_kind, product_id, tracks_serial_number,
    total, available, consumed, damaged, repair, repaired, irreparable,
    pending_incoming, pending_outgoing, transferred_out,
    source_breakdown, pending_transfers, version, created_at, updated_at
"#;

const UNIT_COLUMNS: &str = r#"
    id, account_id, product_id, serial_number, status, batch_quantities,
    current_location, archived_at, transfer_history, repair_history, created_at, updated_at
"#;

const FAULT_COLUMNS: &str = r#"
    id, location_id, product_id, is_serialized, damage_qty, stages, status,
    pending_damage_history, repair_history, applied_requests, archived_at,
    reported_by, created_at, updated_at
"#;

const REPAIR_COLUMNS: &str = r#"
    id, fault_record_id, location_id, product_id, repair_center_id, is_serialized,
    quantity, stages, status, total_cost, history, sent_by, created_at, updated_at
"#;

const PROPOSAL_COLUMNS: &str = r#"
    id, kind, product_id, from_location_id, to_location_id, is_serialized,
    fault_record_id, repair_transfer_id, quantity, pending, accepted, rejected,
    status, document_ref, remark, rejection_reason, transferred_by, transfer_date,
    accepted_by, rejected_by, resolved_at, updated_at
"#;

pub struct LedgerTx {
    tx: Transaction<'static, Postgres>,
}

impl LedgerTx {
    pub async fn begin(db: &PgPool) -> AppResult<Self> {
        Ok(Self { tx: db.begin().await? })
    }

    pub async fn commit(self) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    // ========================================================================
    // Master data
    // ========================================================================

    pub async fn location(&mut self, id: Uuid) -> AppResult<Location> {
        let row = sqlx::query_as::<_, LocationRow>("SELECT id, kind, name FROM locations WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| LedgerError::not_found(RecordKind::Location, id))?;
        Location::try_from(row)
    }

    pub async fn product(&mut self, id: Uuid) -> AppResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, sku, name, tracks_serial_number FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::not_found(RecordKind::Product, id))?;
        Ok(Product::from(row))
    }

    // ========================================================================
    // Locking reads
    // ========================================================================

    pub async fn lock_proposal(&mut self, id: Uuid) -> AppResult<TransferProposal> {
        let row = sqlx::query_as::<_, TransferProposalRow>(&format!(
            "SELECT {} FROM transfer_proposals WHERE id = $1 FOR UPDATE",
            PROPOSAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::not_found(RecordKind::TransferProposal, id))?;
        TransferProposal::try_from(row)
    }

    pub async fn lock_fault(&mut self, id: Uuid) -> AppResult<FaultRecord> {
        let row = sqlx::query_as::<_, FaultRecordRow>(&format!(
            "SELECT {} FROM fault_records WHERE id = $1 FOR UPDATE",
            FAULT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::not_found(RecordKind::FaultRecord, id))?;
        FaultRecord::try_from(row)
    }

    /// Fault record owning a repair transfer, read without a lock so the
    /// fault can be locked before the repair transfer
    pub async fn repair_fault_id(&mut self, repair_id: Uuid) -> AppResult<Uuid> {
        let fault_id = sqlx::query_scalar::<_, Uuid>("SELECT fault_record_id FROM repair_transfers WHERE id = $1")
            .bind(repair_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| LedgerError::not_found(RecordKind::RepairTransfer, repair_id))?;
        Ok(fault_id)
    }

    pub async fn lock_repair(&mut self, id: Uuid) -> AppResult<RepairTransfer> {
        let row = sqlx::query_as::<_, RepairTransferRow>(&format!(
            "SELECT {} FROM repair_transfers WHERE id = $1 FOR UPDATE",
            REPAIR_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::not_found(RecordKind::RepairTransfer, id))?;
        RepairTransfer::try_from(row)
    }

    /// Lock the accounts for `keys` in id order. Missing accounts are absent
    /// from the result.
    pub async fn lock_accounts(&mut self, keys: &[AccountKey]) -> AppResult<BTreeMap<AccountKey, StockAccount>> {
        let location_ids: Vec<Uuid> = keys.iter().map(|k| k.location_id).collect();
        let product_ids: Vec<Uuid> = keys.iter().map(|k| k.product_id).collect();

        let rows = sqlx::query_as::<_, StockAccountRow>(&format!(
            r#"
            SELECT {} FROM stock_accounts
            WHERE (location_id, product_id) IN (SELECT * FROM UNNEST($1::uuid[], $2::uuid[]))
            ORDER BY id
            FOR UPDATE
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(&location_ids)
        .bind(&product_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let accounts = self.assemble(rows).await?;
        Ok(accounts.into_iter().map(|account| (account.key(), account)).collect())
    }

    pub async fn lock_account(&mut self, key: AccountKey) -> AppResult<StockAccount> {
        self.lock_accounts(&[key])
            .await?
            .remove(&key)
            .ok_or_else(|| LedgerError::not_found(RecordKind::StockAccount, key).into())
    }

    /// The locked account for `key`, or a fresh one when the location has
    /// never held the product
    pub async fn lock_or_open_account(&mut self, key: AccountKey, at: DateTime<Utc>) -> AppResult<StockAccount> {
        let location = self.location(key.location_id).await?;
        let product = self.product(key.product_id).await?;
        Ok(self
            .lock_accounts(&[key])
            .await?
            .remove(&key)
            .unwrap_or_else(|| StockAccount::open(&location, &product, at)))
    }

    /// Lock a transfer's source and, when it is a different location, its
    /// destination in one ordered pass. A missing destination account is
    /// opened.
    pub async fn lock_transfer_accounts(
        &mut self,
        source: AccountKey,
        destination: AccountKey,
        at: DateTime<Utc>,
    ) -> AppResult<(StockAccount, Option<StockAccount>)> {
        if source == destination {
            return Ok((self.lock_account(source).await?, None));
        }
        let location = self.location(destination.location_id).await?;
        let product = self.product(destination.product_id).await?;

        let mut accounts = self.lock_accounts(&[source, destination]).await?;
        let source_account = accounts
            .remove(&source)
            .ok_or_else(|| LedgerError::not_found(RecordKind::StockAccount, source))?;
        let destination_account = accounts
            .remove(&destination)
            .unwrap_or_else(|| StockAccount::open(&location, &product, at));
        Ok((source_account, Some(destination_account)))
    }

    /// Fail when any of `serials` is live in an account outside `exclude`
    pub async fn ensure_serials_free(&mut self, product_id: Uuid, serials: &[String], exclude: &[Uuid]) -> AppResult<()> {
        if serials.is_empty() {
            return Ok(());
        }
        let holder = sqlx::query_as::<_, (String, Uuid)>(
            r#"
            SELECT u.serial_number, a.location_id
            FROM unit_ledgers u
            JOIN stock_accounts a ON a.id = u.account_id
            WHERE u.product_id = $1
              AND u.serial_number = ANY($2)
              AND u.archived_at IS NULL
              AND NOT (u.account_id = ANY($3))
            LIMIT 1
            "#,
        )
        .bind(product_id)
        .bind(serials)
        .bind(exclude)
        .fetch_optional(&mut *self.tx)
        .await?;

        match holder {
            Some((serial, location_id)) => Err(LedgerError::DuplicateSerial { serial, location_id }.into()),
            None => Ok(()),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Clamp, then insert or update the account and all of its unit ledgers
    pub async fn save_account(&mut self, account: &mut StockAccount) -> AppResult<()> {
        account.clamp_counters();
        account.version += 1;
        let c = &account.counters;

        sqlx::query(&format!(
            r#"
            INSERT INTO stock_accounts ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (id) DO UPDATE SET
                total = EXCLUDED.total,
                available = EXCLUDED.available,
                consumed = EXCLUDED.consumed,
                damaged = EXCLUDED.damaged,
                repair = EXCLUDED.repair,
                repaired = EXCLUDED.repaired,
                irreparable = EXCLUDED.irreparable,
                pending_incoming = EXCLUDED.pending_incoming,
                pending_outgoing = EXCLUDED.pending_outgoing,
                transferred_out = EXCLUDED.transferred_out,
                source_breakdown = EXCLUDED.source_breakdown,
                pending_transfers = EXCLUDED.pending_transfers,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account.id)
        .bind(account.location_id)
        .bind(account.location_kind.as_str())
        .bind(account.product_id)
        .bind(account.tracks_serial_number)
        .bind(c.total)
        .bind(c.available)
        .bind(c.consumed)
        .bind(c.damaged)
        .bind(c.repair)
        .bind(c.repaired)
        .bind(c.irreparable)
        .bind(c.pending_incoming)
        .bind(c.pending_outgoing)
        .bind(c.transferred_out)
        .bind(Json(&account.source_breakdown))
        .bind(Json(&account.pending_transfers))
        .bind(account.version)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_unique_violation(e, "Stock account"))?;

        let account_id = account.id;
        for unit in account.units.values().chain(account.batch.iter()) {
            self.save_unit(account_id, unit).await?;
        }
        Ok(())
    }

    async fn save_unit(&mut self, account_id: Uuid, unit: &UnitLedger) -> AppResult<()> {
        let serial = match &unit.identity {
            UnitIdentity::Serial(serial) => Some(serial.as_str()),
            UnitIdentity::Batch => None,
        };

        sqlx::query(&format!(
            r#"
            INSERT INTO unit_ledgers ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                batch_quantities = EXCLUDED.batch_quantities,
                current_location = EXCLUDED.current_location,
                archived_at = EXCLUDED.archived_at,
                transfer_history = EXCLUDED.transfer_history,
                repair_history = EXCLUDED.repair_history,
                updated_at = EXCLUDED.updated_at
            "#,
            UNIT_COLUMNS
        ))
        .bind(unit.id)
        .bind(account_id)
        .bind(unit.product_id)
        .bind(serial)
        .bind(unit.status.as_str())
        .bind(Json(&unit.batch_quantities))
        .bind(unit.current_location)
        .bind(unit.archived_at)
        .bind(Json(&unit.transfer_history))
        .bind(Json(&unit.repair_history))
        .bind(unit.created_at)
        .bind(unit.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_unique_violation(e, "Serial number"))?;
        Ok(())
    }

    pub async fn save_fault(&mut self, fault: &mut FaultRecord) -> AppResult<()> {
        fault.clamp_counters();

        sqlx::query(&format!(
            r#"
            INSERT INTO fault_records ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                damage_qty = EXCLUDED.damage_qty,
                stages = EXCLUDED.stages,
                status = EXCLUDED.status,
                pending_damage_history = EXCLUDED.pending_damage_history,
                repair_history = EXCLUDED.repair_history,
                applied_requests = EXCLUDED.applied_requests,
                archived_at = EXCLUDED.archived_at,
                updated_at = EXCLUDED.updated_at
            "#,
            FAULT_COLUMNS
        ))
        .bind(fault.id)
        .bind(fault.location_id)
        .bind(fault.product_id)
        .bind(fault.is_serialized)
        .bind(fault.damage_qty)
        .bind(Json(&fault.stages))
        .bind(fault.status.as_str())
        .bind(Json(&fault.pending_damage_history))
        .bind(Json(&fault.repair_history))
        .bind(Json(&fault.applied_requests))
        .bind(fault.archived_at)
        .bind(fault.reported_by)
        .bind(fault.created_at)
        .bind(fault.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn save_repair(&mut self, repair: &mut RepairTransfer) -> AppResult<()> {
        repair.clamp_counters();

        sqlx::query(&format!(
            r#"
            INSERT INTO repair_transfers ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                stages = EXCLUDED.stages,
                status = EXCLUDED.status,
                total_cost = EXCLUDED.total_cost,
                history = EXCLUDED.history,
                updated_at = EXCLUDED.updated_at
            "#,
            REPAIR_COLUMNS
        ))
        .bind(repair.id)
        .bind(repair.fault_record_id)
        .bind(repair.location_id)
        .bind(repair.product_id)
        .bind(repair.repair_center_id)
        .bind(repair.is_serialized)
        .bind(repair.quantity)
        .bind(Json(&repair.stages))
        .bind(repair.status.as_str())
        .bind(repair.total_cost)
        .bind(Json(&repair.history))
        .bind(repair.sent_by)
        .bind(repair.created_at)
        .bind(repair.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn insert_proposal(&mut self, proposal: &TransferProposal) -> AppResult<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO transfer_proposals ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            "#,
            PROPOSAL_COLUMNS
        ))
        .bind(proposal.id)
        .bind(proposal.kind.as_str())
        .bind(proposal.product_id)
        .bind(proposal.from_location_id)
        .bind(proposal.to_location_id)
        .bind(proposal.is_serialized)
        .bind(proposal.fault_record_id)
        .bind(proposal.repair_transfer_id)
        .bind(proposal.quantity)
        .bind(Json(&proposal.pending))
        .bind(Json(&proposal.accepted))
        .bind(Json(&proposal.rejected))
        .bind(proposal.status.as_str())
        .bind(&proposal.document_ref)
        .bind(&proposal.remark)
        .bind(&proposal.rejection_reason)
        .bind(proposal.transferred_by)
        .bind(proposal.transfer_date)
        .bind(proposal.accepted_by)
        .bind(proposal.rejected_by)
        .bind(proposal.resolved_at)
        .bind(proposal.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Write back a proposal that was pending when it was locked
    pub async fn update_proposal(&mut self, proposal: &TransferProposal) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transfer_proposals SET
                pending = $2,
                accepted = $3,
                rejected = $4,
                status = $5,
                document_ref = $6,
                rejection_reason = $7,
                accepted_by = $8,
                rejected_by = $9,
                resolved_at = $10,
                updated_at = $11
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(proposal.id)
        .bind(Json(&proposal.pending))
        .bind(Json(&proposal.accepted))
        .bind(Json(&proposal.rejected))
        .bind(proposal.status.as_str())
        .bind(&proposal.document_ref)
        .bind(&proposal.rejection_reason)
        .bind(proposal.accepted_by)
        .bind(proposal.rejected_by)
        .bind(proposal.resolved_at)
        .bind(proposal.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Transfer proposal {} was resolved concurrently",
                proposal.id
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Plain reads
    // ========================================================================

    /// Attach unit ledger rows to their account rows
    async fn assemble(&mut self, rows: Vec<StockAccountRow>) -> AppResult<Vec<StockAccount>> {
        let account_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let unit_rows = sqlx::query_as::<_, UnitLedgerRow>(&format!(
            "SELECT {} FROM unit_ledgers WHERE account_id = ANY($1)",
            UNIT_COLUMNS
        ))
        .bind(&account_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut units_by_account: BTreeMap<Uuid, Vec<UnitLedgerRow>> = BTreeMap::new();
        for row in unit_rows {
            units_by_account.entry(row.account_id).or_default().push(row);
        }
        rows.into_iter()
            .map(|row| {
                let units = units_by_account.remove(&row.id).unwrap_or_default();
                row.into_account(units)
            })
            .collect()
    }

    pub async fn account(&mut self, key: AccountKey) -> AppResult<StockAccount> {
        let row = sqlx::query_as::<_, StockAccountRow>(&format!(
            "SELECT {} FROM stock_accounts WHERE location_id = $1 AND product_id = $2",
            ACCOUNT_COLUMNS
        ))
        .bind(key.location_id)
        .bind(key.product_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::not_found(RecordKind::StockAccount, key))?;
        self.assemble(vec![row])
            .await?
            .pop()
            .ok_or_else(|| LedgerError::not_found(RecordKind::StockAccount, key).into())
    }

    pub async fn accounts_at(&mut self, location_id: Uuid) -> AppResult<Vec<StockAccount>> {
        let rows = sqlx::query_as::<_, StockAccountRow>(&format!(
            "SELECT {} FROM stock_accounts WHERE location_id = $1 ORDER BY product_id",
            ACCOUNT_COLUMNS
        ))
        .bind(location_id)
        .fetch_all(&mut *self.tx)
        .await?;
        self.assemble(rows).await
    }

    pub async fn faults_at(&mut self, location_id: Uuid) -> AppResult<Vec<FaultRecord>> {
        let rows = sqlx::query_as::<_, FaultRecordRow>(&format!(
            "SELECT {} FROM fault_records WHERE location_id = $1 ORDER BY created_at",
            FAULT_COLUMNS
        ))
        .bind(location_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(FaultRecord::try_from).collect()
    }

    pub async fn fault(&mut self, id: Uuid) -> AppResult<FaultRecord> {
        let row = sqlx::query_as::<_, FaultRecordRow>(&format!(
            "SELECT {} FROM fault_records WHERE id = $1",
            FAULT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::not_found(RecordKind::FaultRecord, id))?;
        FaultRecord::try_from(row)
    }

    pub async fn pending_proposals(&mut self, location_id: Uuid) -> AppResult<Vec<TransferProposal>> {
        let rows = sqlx::query_as::<_, TransferProposalRow>(&format!(
            r#"
            SELECT {} FROM transfer_proposals
            WHERE status = 'pending' AND (from_location_id = $1 OR to_location_id = $1)
            ORDER BY transfer_date
            "#,
            PROPOSAL_COLUMNS
        ))
        .bind(location_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(TransferProposal::try_from).collect()
    }
}
