use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::collaborators::SupplierItem;

/// Stock of one (supplier, gas type, cylinder size)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InventoryRecord {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub gas_type_id: Uuid,
    pub cylinder_size: String,
    pub quantity_available: i32,
    pub quantity_reserved: i32,
    pub reorder_level: i32,
    pub unit_cost: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// Units that can still be promised
    pub fn free(&self) -> i32 {
        self.quantity_available - self.quantity_reserved
    }

    pub fn is_low_stock(&self) -> bool {
        self.free() <= self.reorder_level
    }
}

/// Natural key of an inventory record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku {
    pub supplier_id: Uuid,
    pub gas_type_id: Uuid,
    pub cylinder_size: String,
}

impl Sku {
    pub fn new(supplier_id: Uuid, gas_type_id: Uuid, cylinder_size: impl Into<String>) -> Self {
        Self {
            supplier_id,
            gas_type_id,
            cylinder_size: normalize_size(&cylinder_size.into()),
        }
    }
}

/// Sizes are stored lowercase without surrounding whitespace ("12.5kg")
pub fn normalize_size(size: &str) -> String {
    size.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Released,
    Consumed,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Released => "released",
            ReservationStatus::Consumed => "consumed",
            ReservationStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Time-bounded hold on inventory quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub id: Uuid,
    pub inventory_record_id: Uuid,
    pub order_id: Option<Uuid>,
    pub quantity: i32,
    pub status: ReservationStatus,
    pub release_reason: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a release call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released { quantity: i32 },
    /// Already released or expired
    AlreadyReleased,
}

/// Outcome of a commit call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Consumed { quantity: i32 },
    /// Already consumed
    AlreadyConsumed,
}

/// Result of one reaper pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapSummary {
    pub reservations: usize,
    pub quantity: i64,
}

/// Request DTO for a standalone reservation
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReserveRequest {
    pub supplier_id: Uuid,
    pub gas_type_id: Uuid,
    #[validate(custom = "crate::validation::validate_cylinder_size")]
    pub cylinder_size: String,
    #[validate(range(min = 1, max = 10000, message = "Quantity must be between 1 and 10000"))]
    pub quantity: i32,
    pub order_id: Option<Uuid>,
    /// Defaults to the configured reservation TTL
    #[validate(range(min = 1, max = 86400, message = "TTL must be between 1 second and 1 day"))]
    pub ttl_seconds: Option<u64>,
}

/// Request DTO for a release
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ReleaseRequest {
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

/// Request DTO for an availability check
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AvailabilityRequest {
    pub supplier_id: Uuid,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<SupplierItem>,
}

/// Availability of one requested item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemAvailabilityView {
    pub gas_type_id: Uuid,
    pub cylinder_size: String,
    pub requested: i32,
    pub quantity_available: i32,
    pub available: bool,
    /// "ledger" or "supplier_service"
    pub source: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub id: Uuid,
    pub inventory_record_id: Uuid,
    pub order_id: Option<Uuid>,
    pub quantity: i32,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            inventory_record_id: r.inventory_record_id,
            order_id: r.order_id,
            quantity: r.quantity,
            status: r.status,
            expires_at: r.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(available: i32, reserved: i32, reorder: i32) -> InventoryRecord {
        let now = Utc::now();
        InventoryRecord {
            id: Uuid::new_v4(),
            supplier_id: Uuid::new_v4(),
            gas_type_id: Uuid::new_v4(),
            cylinder_size: "6kg".to_string(),
            quantity_available: available,
            quantity_reserved: reserved,
            reorder_level: reorder,
            unit_cost: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_free_quantity() {
        assert_eq!(record(10, 4, 0).free(), 6);
        assert!(record(10, 4, 6).is_low_stock());
        assert!(!record(10, 4, 5).is_low_stock());
    }

    #[test]
    fn test_sku_normalizes_size() {
        let sku = Sku::new(Uuid::nil(), Uuid::nil(), " 12.5KG ");
        assert_eq!(sku.cylinder_size, "12.5kg");
    }

    #[test]
    fn test_reserve_request_validation() {
        let request = ReserveRequest {
            supplier_id: Uuid::new_v4(),
            gas_type_id: Uuid::new_v4(),
            cylinder_size: "6kg".to_string(),
            quantity: 0,
            order_id: None,
            ttl_seconds: None,
        };
        assert!(request.validate().is_err());

        let request = ReserveRequest {
            quantity: 2,
            cylinder_size: "six".to_string(),
            ..request
        };
        assert!(request.validate().is_err());
    }
}
