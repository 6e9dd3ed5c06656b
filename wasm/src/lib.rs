//! WebAssembly module for the Supply Ledger platform
//!
//! Lets browser forms check input offline before it is submitted:
//! - Unit status transition legality
//! - Fault record status derivation
//! - Stock account balance checks
//! - Serial, remark and repair cost validation

use std::str::FromStr;

use rust_decimal::Decimal;
use wasm_bindgen::prelude::*;

use shared::{
    derive_status, validate_remark, validate_repair_cost, validate_serial_list, StageBook, StockCounters, UnitStatus,
};

fn js_error(message: impl AsRef<str>) -> JsValue {
    web_sys::console::warn_1(&JsValue::from_str(message.as_ref()));
    JsValue::from_str(message.as_ref())
}

fn parse_status(value: &str) -> Result<UnitStatus, JsValue> {
    UnitStatus::parse(value).ok_or_else(|| js_error(format!("Unknown unit status: {}", value)))
}

/// Whether a unit may move from `from` to `to`
#[wasm_bindgen]
pub fn can_transition(from: &str, to: &str) -> Result<bool, JsValue> {
    Ok(parse_status(from)?.can_transition_to(parse_status(to)?))
}

/// Statuses reachable from `from`, as a JS array of strings
#[wasm_bindgen]
pub fn next_statuses(from: &str) -> Result<js_sys::Array, JsValue> {
    let from = parse_status(from)?;
    Ok(UnitStatus::ALL
        .iter()
        .filter(|to| from.can_transition_to(**to))
        .map(|to| JsValue::from_str(to.as_str()))
        .collect())
}

/// Overall status of a fault record from its stage counts
#[wasm_bindgen]
pub fn derive_fault_status(stages_json: &str) -> Result<String, JsValue> {
    let stages: StageBook =
        serde_json::from_str(stages_json).map_err(|e| js_error(format!("Invalid stages JSON: {}", e)))?;
    Ok(derive_status(&stages).as_str().to_string())
}

/// Whether an account's counters add up to its total
#[wasm_bindgen]
pub fn is_account_balanced(counters_json: &str) -> Result<bool, JsValue> {
    let counters: StockCounters =
        serde_json::from_str(counters_json).map_err(|e| js_error(format!("Invalid counters JSON: {}", e)))?;
    Ok(!counters.has_negative() && counters.is_balanced())
}

/// Check a JSON list of serial numbers before submitting it
#[wasm_bindgen]
pub fn check_serials(serials_json: &str) -> Result<(), JsValue> {
    let serials: Vec<String> =
        serde_json::from_str(serials_json).map_err(|e| js_error(format!("Invalid serials JSON: {}", e)))?;
    validate_serial_list(&serials).map_err(js_error)
}

#[wasm_bindgen]
pub fn check_remark(remark: &str) -> Result<(), JsValue> {
    validate_remark(remark).map_err(js_error)
}

#[wasm_bindgen]
pub fn check_repair_cost(cost: &str) -> Result<(), JsValue> {
    let cost = Decimal::from_str(cost).map_err(|e| js_error(format!("Invalid cost: {}", e)))?;
    validate_repair_cost(cost).map_err(js_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Only the paths that never build a JsValue run on native targets

    #[test]
    fn test_transition_table_through_shared() {
        assert!(UnitStatus::Available.can_transition_to(UnitStatus::PendingDamage));
        assert!(!UnitStatus::Irreparable.can_transition_to(UnitStatus::Available));
    }

    #[test]
    fn test_status_names_round_trip() {
        for status in UnitStatus::ALL {
            assert_eq!(UnitStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_stage_json_shape() {
        let stages: StageBook =
            serde_json::from_str(r#"{"counts":{"pending_damage":2,"damaged":1},"serials":{}}"#).unwrap();
        assert_eq!(derive_status(&stages).as_str(), "pending_damage");
    }

    #[test]
    fn test_counters_json_shape() {
        let counters: StockCounters = serde_json::from_str(
            r#"{"total":10,"available":6,"consumed":0,"damaged":0,"repair":0,"repaired":0,
                "irreparable":0,"pending_incoming":0,"pending_outgoing":4,"transferred_out":0}"#,
        )
        .unwrap();
        assert!(counters.is_balanced());
    }
}
