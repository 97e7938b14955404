use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::geo::Coordinates;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GasType {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

/// A supplier holding enough free stock of one SKU
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct SupplierStock {
    pub supplier_id: Uuid,
    pub supplier_name: String,
    /// 0-5
    pub rating: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub inventory_record_id: Uuid,
    pub free_quantity: i32,
}

impl SupplierStock {
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.latitude, self.longitude)
    }
}

/// Candidate handed to the selector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierOffer {
    pub supplier_id: Uuid,
    pub supplier_name: String,
    pub inventory_record_id: Uuid,
    pub rating: f64,
    pub distance_km: f64,
    /// Indicative unit price used for ranking
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Supplier {
    pub id: Uuid,
    pub name: String,
    pub rating: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_active: bool,
}
