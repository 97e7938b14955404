// External collaborator contracts
// The engine talks to the address and supplier services only through these traits

pub mod http;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::geo::Coordinates;
use crate::pricing::models::CustomerClass;

pub use http::{HttpAddressDirectory, HttpSupplierService};

/// Delivery address as returned by the address service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: Uuid,
    pub customer_id: Uuid,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub label: Option<String>,
}

fn default_active() -> bool {
    true
}

impl Address {
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.latitude, self.longitude)
    }
}

#[async_trait]
pub trait AddressDirectory: Send + Sync {
    /// `Ok(None)` when the address does not exist or is not visible to the token
    async fn get_address(&self, id: Uuid, auth_token: &str) -> EngineResult<Option<Address>>;
}

/// One line sent to the supplier service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierItem {
    pub gas_type_id: Uuid,
    pub cylinder_size: String,
    pub quantity: i32,
}

impl SupplierItem {
    /// Key used by availability responses
    pub fn key(&self) -> String {
        format!("{}:{}", self.gas_type_id, self.cylinder_size.trim().to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotedItem {
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    pub pricing_rule_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingQuote {
    pub items: Vec<QuotedItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAvailability {
    pub available: bool,
    pub quantity_available: i32,
}

/// Quantity snapshot pushed to the supplier service after a commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySync {
    pub inventory_record_id: Uuid,
    pub gas_type_id: Uuid,
    pub cylinder_size: String,
    pub quantity_available: i32,
    pub quantity_reserved: i32,
}

#[async_trait]
pub trait SupplierService: Send + Sync {
    async fn calculate_pricing(
        &self,
        supplier_id: Uuid,
        items: &[SupplierItem],
        customer_class: CustomerClass,
        auth_token: &str,
    ) -> EngineResult<PricingQuote>;

    async fn check_availability(
        &self,
        supplier_id: Uuid,
        items: &[SupplierItem],
        auth_token: &str,
    ) -> EngineResult<HashMap<String, ItemAvailability>>;

    async fn sync_inventory(
        &self,
        supplier_id: Uuid,
        records: &[InventorySync],
        auth_token: &str,
    ) -> EngineResult<()>;
}

/// In-process address book
#[derive(Default)]
pub struct StaticAddressDirectory {
    addresses: Mutex<HashMap<Uuid, Address>>,
}

impl StaticAddressDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, address: Address) {
        if let Ok(mut addresses) = self.addresses.lock() {
            addresses.insert(address.id, address);
        }
    }
}

#[async_trait]
impl AddressDirectory for StaticAddressDirectory {
    async fn get_address(&self, id: Uuid, _auth_token: &str) -> EngineResult<Option<Address>> {
        let addresses = self
            .addresses
            .lock()
            .map_err(|_| EngineError::Internal("address book lock poisoned".to_string()))?;
        Ok(addresses.get(&id).cloned())
    }
}

/// In-process supplier service
///
/// Without configured quotes every pricing call fails, which is what a
/// deployment without a supplier service looks like to the resolver.
#[derive(Default)]
pub struct StaticSupplierService {
    quotes: Mutex<HashMap<(Uuid, String), QuotedItem>>,
    availability: Mutex<HashMap<(Uuid, String), ItemAvailability>>,
    synced: Mutex<Vec<(Uuid, Vec<InventorySync>)>>,
    fail_sync: bool,
}

impl StaticSupplierService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A service whose quantity sync endpoint is down
    pub fn with_failing_sync() -> Self {
        Self {
            fail_sync: true,
            ..Self::default()
        }
    }

    pub fn set_quote(&self, supplier_id: Uuid, item: &SupplierItem, quote: QuotedItem) {
        if let Ok(mut quotes) = self.quotes.lock() {
            quotes.insert((supplier_id, item.key()), quote);
        }
    }

    pub fn set_availability(&self, supplier_id: Uuid, item: &SupplierItem, availability: ItemAvailability) {
        if let Ok(mut map) = self.availability.lock() {
            map.insert((supplier_id, item.key()), availability);
        }
    }

    pub fn synced(&self) -> Vec<(Uuid, Vec<InventorySync>)> {
        self.synced.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SupplierService for StaticSupplierService {
    async fn calculate_pricing(
        &self,
        supplier_id: Uuid,
        items: &[SupplierItem],
        _customer_class: CustomerClass,
        _auth_token: &str,
    ) -> EngineResult<PricingQuote> {
        let quotes = self
            .quotes
            .lock()
            .map_err(|_| EngineError::Internal("quote table lock poisoned".to_string()))?;

        let items = items
            .iter()
            .map(|item| {
                quotes
                    .get(&(supplier_id, item.key()))
                    .cloned()
                    .ok_or_else(|| EngineError::Upstream(format!("no quote for {}", item.key())))
            })
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(PricingQuote { items })
    }

    async fn check_availability(
        &self,
        supplier_id: Uuid,
        items: &[SupplierItem],
        _auth_token: &str,
    ) -> EngineResult<HashMap<String, ItemAvailability>> {
        let map = self
            .availability
            .lock()
            .map_err(|_| EngineError::Internal("availability lock poisoned".to_string()))?;

        Ok(items
            .iter()
            .map(|item| {
                let found = map.get(&(supplier_id, item.key())).copied().unwrap_or(ItemAvailability {
                    available: false,
                    quantity_available: 0,
                });
                (
                    item.key(),
                    ItemAvailability {
                        available: found.quantity_available >= item.quantity,
                        ..found
                    },
                )
            })
            .collect())
    }

    async fn sync_inventory(
        &self,
        supplier_id: Uuid,
        records: &[InventorySync],
        _auth_token: &str,
    ) -> EngineResult<()> {
        if self.fail_sync {
            return Err(EngineError::Upstream("supplier service unavailable".to_string()));
        }
        if let Ok(mut synced) = self.synced.lock() {
            synced.push((supplier_id, records.to_vec()));
        }
        Ok(())
    }
}
