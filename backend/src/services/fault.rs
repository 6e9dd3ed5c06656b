//! Damage reports and damage-claim decisions

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use shared::{engine, AccountKey, FaultRecord, RepairTransfer, Selection, Stamp, StockPayload};

use crate::error::AppResult;
use crate::services::stock::PayloadInput;
use crate::services::store::LedgerTx;

#[derive(Debug, Deserialize, Validate)]
pub struct ReportDamageInput {
    pub location_id: Uuid,
    pub product_id: Uuid,
    #[serde(flatten)]
    #[validate]
    pub items: PayloadInput,
    /// Open fault record of the same account to extend
    pub fault_record_id: Option<Uuid>,
    #[validate(length(max = 500))]
    pub remark: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReportForRepairInput {
    pub location_id: Uuid,
    pub product_id: Uuid,
    #[serde(flatten)]
    #[validate]
    pub items: PayloadInput,
    pub repair_center_id: Uuid,
    #[validate(length(max = 500))]
    pub remark: Option<String>,
}

/// Which pending units a decision applies to; all of them when empty
#[derive(Debug, Default, Deserialize, Validate)]
pub struct SelectionInput {
    #[validate(range(min = 1))]
    pub quantity: Option<i64>,
    #[validate(length(min = 1, max = 1000))]
    pub serials: Option<Vec<String>>,
    #[validate(length(max = 500))]
    pub remark: Option<String>,
}

/// A damage-claim decision; the request id makes it safe to retry
#[derive(Debug, Deserialize, Validate)]
pub struct DamageDecisionInput {
    #[serde(flatten)]
    #[validate]
    pub selection: SelectionInput,
    pub request_id: Uuid,
}

impl SelectionInput {
    pub fn selection(&self) -> AppResult<Selection> {
        Ok(Selection::from_parts(self.quantity, self.serials.clone())?)
    }
}

#[derive(Debug, Serialize)]
pub struct DamageDecision {
    pub moved: StockPayload,
    pub fault: FaultRecord,
}

#[derive(Debug, Serialize)]
pub struct RepairReport {
    pub fault: FaultRecord,
    pub repair_transfer: RepairTransfer,
}

/// Fault service for damage claims
#[derive(Clone)]
pub struct FaultService {
    db: PgPool,
}

impl FaultService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Open a fault record, or extend the one named in the input
    pub async fn report_damage(&self, user_id: Uuid, input: ReportDamageInput) -> AppResult<FaultRecord> {
        let payload = input.items.payload()?;
        let stamp = Stamp::new(user_id, input.remark);

        let mut tx = LedgerTx::begin(&self.db).await?;
        let existing = match input.fault_record_id {
            Some(id) => Some(tx.lock_fault(id).await?),
            None => None,
        };
        let mut account = tx
            .lock_account(AccountKey::new(input.location_id, input.product_id))
            .await?;
        let mut fault = existing.unwrap_or_else(|| FaultRecord::open(&account, &stamp));

        engine::report_damage(&mut account, &mut fault, &payload, &stamp)?;
        tx.save_fault(&mut fault).await?;
        tx.save_account(&mut account).await?;
        tx.commit().await?;

        Ok(fault)
    }

    /// Report units straight for repair, opening a fault record and a
    /// repair transfer together
    pub async fn report_for_repair(&self, user_id: Uuid, input: ReportForRepairInput) -> AppResult<RepairReport> {
        let payload = input.items.payload()?;
        let stamp = Stamp::new(user_id, input.remark);

        let mut tx = LedgerTx::begin(&self.db).await?;
        let mut account = tx
            .lock_account(AccountKey::new(input.location_id, input.product_id))
            .await?;
        let mut fault = FaultRecord::open(&account, &stamp);
        let mut repair = RepairTransfer::open(&fault, input.repair_center_id, user_id, stamp.at);

        engine::report_for_repair(&mut account, &mut fault, &mut repair, &payload, &stamp)?;
        tx.save_fault(&mut fault).await?;
        tx.save_repair(&mut repair).await?;
        tx.save_account(&mut account).await?;
        tx.commit().await?;

        Ok(RepairReport {
            fault,
            repair_transfer: repair,
        })
    }

    pub async fn accept_pending_damage(&self, user_id: Uuid, fault_id: Uuid, input: DamageDecisionInput) -> AppResult<DamageDecision> {
        self.decide(user_id, fault_id, input, engine::accept_pending_damage).await
    }

    pub async fn reject_pending_damage(&self, user_id: Uuid, fault_id: Uuid, input: DamageDecisionInput) -> AppResult<DamageDecision> {
        self.decide(user_id, fault_id, input, engine::reject_pending_damage).await
    }

    async fn decide(
        &self,
        user_id: Uuid,
        fault_id: Uuid,
        input: DamageDecisionInput,
        apply: fn(
            &mut shared::StockAccount,
            &mut FaultRecord,
            &Selection,
            Uuid,
            &Stamp,
        ) -> shared::LedgerResult<StockPayload>,
    ) -> AppResult<DamageDecision> {
        let selection = input.selection.selection()?;
        let stamp = Stamp::new(user_id, input.selection.remark);

        let mut tx = LedgerTx::begin(&self.db).await?;
        let mut fault = tx.lock_fault(fault_id).await?;
        let mut account = tx
            .lock_account(AccountKey::new(fault.location_id, fault.product_id))
            .await?;

        let moved = apply(&mut account, &mut fault, &selection, input.request_id, &stamp)?;
        tx.save_fault(&mut fault).await?;
        tx.save_account(&mut account).await?;
        tx.commit().await?;

        Ok(DamageDecision { moved, fault })
    }

    pub async fn get(&self, fault_id: Uuid) -> AppResult<FaultRecord> {
        let mut tx = LedgerTx::begin(&self.db).await?;
        tx.fault(fault_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_selection_means_all() {
        let input: SelectionInput = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(input.validate().is_ok());
        assert_eq!(input.selection().unwrap(), Selection::All);
    }

    #[test]
    fn test_selection_rejects_zero_quantity() {
        let input: SelectionInput = serde_json::from_value(serde_json::json!({ "quantity": 0 })).unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_damage_decision_requires_request_id() {
        let missing = serde_json::from_value::<DamageDecisionInput>(serde_json::json!({ "quantity": 2 }));
        assert!(missing.is_err());

        let request_id = Uuid::new_v4();
        let input: DamageDecisionInput =
            serde_json::from_value(serde_json::json!({ "quantity": 2, "request_id": request_id })).unwrap();
        assert!(input.validate().is_ok());
        assert_eq!(input.request_id, request_id);
        assert_eq!(input.selection.selection().unwrap(), Selection::Quantity(2));
    }
}
