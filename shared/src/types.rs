//! Common types used across the platform

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// Identifies the stock account of one product at one location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountKey {
    pub location_id: Uuid,
    pub product_id: Uuid,
}

impl AccountKey {
    pub fn new(location_id: Uuid, product_id: Uuid) -> Self {
        Self {
            location_id,
            product_id,
        }
    }
}

impl std::fmt::Display for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.location_id, self.product_id)
    }
}

/// Units moved by an operation: a plain quantity for bulk products,
/// explicit serial numbers for serialized ones
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockPayload {
    Quantity(i64),
    Serials(Vec<String>),
}

impl StockPayload {
    /// Number of units the payload represents
    pub fn count(&self) -> i64 {
        match self {
            StockPayload::Quantity(quantity) => *quantity,
            StockPayload::Serials(serials) => serials.len() as i64,
        }
    }

    pub fn is_serialized(&self) -> bool {
        matches!(self, StockPayload::Serials(_))
    }

    /// Serial numbers carried by the payload, empty for bulk quantities
    pub fn serials(&self) -> &[String] {
        match self {
            StockPayload::Quantity(_) => &[],
            StockPayload::Serials(serials) => serials,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Build a payload from the two optional request fields
    pub fn from_parts(quantity: Option<i64>, serials: Option<Vec<String>>) -> LedgerResult<Self> {
        match (quantity, serials) {
            (Some(_), Some(_)) => Err(LedgerError::Validation(
                "Provide either quantity or serial numbers, not both".to_string(),
            )),
            (Some(quantity), None) => Ok(StockPayload::Quantity(quantity)),
            (None, Some(serials)) => Ok(StockPayload::Serials(serials)),
            (None, None) => Err(LedgerError::Validation(
                "Either quantity or serial numbers are required".to_string(),
            )),
        }
    }
}

/// Which part of a pending bucket an accept or reject applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Everything currently pending
    #[default]
    All,
    Quantity(i64),
    Serials(Vec<String>),
}

impl Selection {
    /// Build a selection from optional request fields, defaulting to everything
    pub fn from_parts(quantity: Option<i64>, serials: Option<Vec<String>>) -> LedgerResult<Self> {
        match (quantity, serials) {
            (Some(_), Some(_)) => Err(LedgerError::Validation(
                "Provide either quantity or serial numbers, not both".to_string(),
            )),
            (Some(quantity), None) => Ok(Selection::Quantity(quantity)),
            (None, Some(serials)) if serials.is_empty() => Ok(Selection::All),
            (None, Some(serials)) => Ok(Selection::Serials(serials)),
            (None, None) => Ok(Selection::All),
        }
    }
}

impl From<StockPayload> for Selection {
    fn from(payload: StockPayload) -> Self {
        match payload {
            StockPayload::Quantity(quantity) => Selection::Quantity(quantity),
            StockPayload::Serials(serials) => Selection::Serials(serials),
        }
    }
}

/// Outcome chosen by the receiving party
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Reject => "reject",
        }
    }
}

/// Who performed an operation, when, and the free-text remark they left
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub actor: Uuid,
    pub at: DateTime<Utc>,
    pub remark: Option<String>,
}

impl Stamp {
    pub fn new(actor: Uuid, remark: Option<String>) -> Self {
        Self {
            actor,
            at: Utc::now(),
            remark,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_from_parts() {
        assert_eq!(
            StockPayload::from_parts(Some(3), None).unwrap(),
            StockPayload::Quantity(3)
        );
        assert!(StockPayload::from_parts(None, None).is_err());
        assert!(StockPayload::from_parts(Some(1), Some(vec!["SN-1".into()])).is_err());
    }

    #[test]
    fn test_selection_defaults_to_all() {
        assert_eq!(Selection::from_parts(None, None).unwrap(), Selection::All);
        assert_eq!(Selection::from_parts(None, Some(vec![])).unwrap(), Selection::All);
        assert_eq!(
            Selection::from_parts(Some(2), None).unwrap(),
            Selection::Quantity(2)
        );
    }

    #[test]
    fn test_payload_serde_shape() {
        let json = serde_json::to_value(StockPayload::Serials(vec!["SN-1".into()])).unwrap();
        assert_eq!(json, serde_json::json!({ "serials": ["SN-1"] }));
    }
}
