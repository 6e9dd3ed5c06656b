//! Location and product master data the engine reads but never edits

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of party that holds a stock account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Center,
    Warehouse,
    Outlet,
    Reseller,
}

impl LocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationKind::Center => "center",
            LocationKind::Warehouse => "warehouse",
            LocationKind::Outlet => "outlet",
            LocationKind::Reseller => "reseller",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "center" => Some(LocationKind::Center),
            "warehouse" => Some(LocationKind::Warehouse),
            "outlet" => Some(LocationKind::Outlet),
            "reseller" => Some(LocationKind::Reseller),
            _ => None,
        }
    }

    /// Company-operated stock points, as opposed to resellers
    pub fn is_internal(&self) -> bool {
        !matches!(self, LocationKind::Reseller)
    }
}

impl std::fmt::Display for LocationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationKind::Center => write!(f, "Center"),
            LocationKind::Warehouse => write!(f, "Warehouse"),
            LocationKind::Outlet => write!(f, "Outlet"),
            LocationKind::Reseller => write!(f, "Reseller"),
        }
    }
}

/// A stock-holding location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub kind: LocationKind,
    pub name: String,
}

impl Location {
    pub fn new(kind: LocationKind, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: name.into(),
        }
    }
}

/// A catalog entry. Only `tracks_serial_number` changes lifecycle behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub tracks_serial_number: bool,
}

impl Product {
    pub fn serialized(sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sku: sku.into(),
            name: name.into(),
            tracks_serial_number: true,
        }
    }

    pub fn bulk(sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sku: sku.into(),
            name: name.into(),
            tracks_serial_number: false,
        }
    }
}
