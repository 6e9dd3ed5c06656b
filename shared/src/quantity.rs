//! Quantity arithmetic and drift detection
//!
//! Counters never go negative through engine operations, but records loaded
//! from storage may carry historical drift. Before persistence every counter is
//! clamped to zero and each clamp is reported as a [`QuantityAnomaly`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// A counter that was found below zero and clamped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityAnomaly {
    pub record_id: Uuid,
    pub field: String,
    pub observed: i64,
}

/// Clamp `value` to zero, recording and logging the anomaly if it was negative
pub fn clamp_counter(
    record_id: Uuid,
    field: &str,
    value: &mut i64,
    anomalies: &mut Vec<QuantityAnomaly>,
) {
    if *value < 0 {
        tracing::warn!(
            record_id = %record_id,
            field = field,
            observed = *value,
            "QuantityAnomaly: negative counter clamped to zero"
        );
        anomalies.push(QuantityAnomaly {
            record_id,
            field: field.to_string(),
            observed: *value,
        });
        *value = 0;
    }
}

/// Subtract `amount` from `value`, failing when the bucket is too small
pub fn take(value: &mut i64, amount: i64, bucket: &str) -> LedgerResult<()> {
    if amount < 0 {
        return Err(LedgerError::Validation(format!(
            "Quantity for {} must not be negative",
            bucket
        )));
    }
    if *value < amount {
        return Err(LedgerError::InsufficientAvailable {
            bucket: bucket.to_string(),
            available: *value,
            requested: amount,
        });
    }
    *value -= amount;
    Ok(())
}

/// Reject non-positive quantities
pub fn require_positive(quantity: i64, field: &str) -> LedgerResult<()> {
    if quantity <= 0 {
        return Err(LedgerError::Validation(format!(
            "{} must be positive",
            field
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_records_anomaly() {
        let mut anomalies = Vec::new();
        let mut value = -3;
        clamp_counter(Uuid::nil(), "available", &mut value, &mut anomalies);
        assert_eq!(value, 0);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].observed, -3);
        assert_eq!(anomalies[0].field, "available");
    }

    #[test]
    fn test_clamp_leaves_valid_values() {
        let mut anomalies = Vec::new();
        let mut value = 7;
        clamp_counter(Uuid::nil(), "available", &mut value, &mut anomalies);
        assert_eq!(value, 7);
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_take_insufficient() {
        let mut value = 2;
        let err = take(&mut value, 3, "available").unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_AVAILABLE");
        assert_eq!(value, 2);

        take(&mut value, 2, "available").unwrap();
        assert_eq!(value, 0);
    }
}
