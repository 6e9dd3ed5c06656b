//! Stock intake, consumption and account snapshots

use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use shared::{engine, AccountKey, AccountSummary, SourceClass, Stamp, StockPayload};

use crate::error::AppResult;
use crate::services::store::LedgerTx;

/// Units named by a request: a quantity for bulk products, serial numbers
/// for serialized ones
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PayloadInput {
    #[validate(range(min = 1))]
    pub quantity: Option<i64>,
    #[validate(length(min = 1, max = 1000))]
    pub serials: Option<Vec<String>>,
}

impl PayloadInput {
    pub fn payload(&self) -> AppResult<StockPayload> {
        Ok(StockPayload::from_parts(self.quantity, self.serials.clone())?)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReceiveInput {
    pub location_id: Uuid,
    pub product_id: Uuid,
    #[serde(flatten)]
    #[validate]
    pub items: PayloadInput,
    pub source_class: SourceClass,
    #[validate(length(max = 500))]
    pub remark: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConsumeInput {
    pub location_id: Uuid,
    pub product_id: Uuid,
    #[serde(flatten)]
    #[validate]
    pub items: PayloadInput,
    #[validate(length(max = 500))]
    pub remark: Option<String>,
}

/// Stock service for intake and consumption
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
}

impl StockService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Receive units into the location's account, opening it if needed
    pub async fn receive(&self, user_id: Uuid, input: ReceiveInput) -> AppResult<AccountSummary> {
        let payload = input.items.payload()?;
        let stamp = Stamp::new(user_id, input.remark);
        let key = AccountKey::new(input.location_id, input.product_id);

        let mut tx = LedgerTx::begin(&self.db).await?;
        let mut account = tx.lock_or_open_account(key, stamp.at).await?;
        tx.ensure_serials_free(key.product_id, payload.serials(), &[account.id])
            .await?;
        engine::receive(&mut account, &payload, input.source_class, &stamp)?;
        tx.save_account(&mut account).await?;
        tx.commit().await?;

        Ok(AccountSummary::from(&account))
    }

    pub async fn consume(&self, user_id: Uuid, input: ConsumeInput) -> AppResult<AccountSummary> {
        let payload = input.items.payload()?;
        let stamp = Stamp::new(user_id, input.remark);

        let mut tx = LedgerTx::begin(&self.db).await?;
        let mut account = tx
            .lock_account(AccountKey::new(input.location_id, input.product_id))
            .await?;
        engine::consume(&mut account, &payload, &stamp)?;
        tx.save_account(&mut account).await?;
        tx.commit().await?;

        Ok(AccountSummary::from(&account))
    }

    pub async fn account_summary(&self, location_id: Uuid, product_id: Uuid) -> AppResult<AccountSummary> {
        let mut tx = LedgerTx::begin(&self.db).await?;
        let account = tx.account(AccountKey::new(location_id, product_id)).await?;
        Ok(AccountSummary::from(&account))
    }

    pub async fn location_summary(&self, location_id: Uuid) -> AppResult<Vec<AccountSummary>> {
        let mut tx = LedgerTx::begin(&self.db).await?;
        tx.location(location_id).await?;
        let accounts = tx.accounts_at(location_id).await?;
        Ok(accounts.iter().map(AccountSummary::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_input_validation() {
        let input = PayloadInput {
            quantity: Some(0),
            serials: None,
        };
        assert!(input.validate().is_err());

        let input = PayloadInput {
            quantity: Some(3),
            serials: None,
        };
        assert!(input.validate().is_ok());
        assert_eq!(input.payload().unwrap(), StockPayload::Quantity(3));
    }

    #[test]
    fn test_receive_input_flattens_items() {
        let json = serde_json::json!({
            "location_id": Uuid::nil(),
            "product_id": Uuid::nil(),
            "serials": ["SN-1", "SN-2"],
            "source_class": "direct_purchase"
        });
        let input: ReceiveInput = serde_json::from_value(json).unwrap();
        assert!(input.validate().is_ok());
        assert_eq!(input.items.payload().unwrap().count(), 2);
    }
}
