// Transactional persistence seam
//
// Every engine write happens inside one `StoreTx`. Dropping a transaction
// without calling `commit` rolls it back, so `?` anywhere in an operation
// undoes everything that operation wrote.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::delivery::models::{Delivery, TrackingEntry};
use crate::error::EngineResult;
use crate::inventory::models::{InventoryRecord, Reservation, Sku};
use crate::orders::models::{Order, OrderItem, OrderStatusHistory};
use crate::pricing::models::{PricingRule, RuleQuery};
use crate::query::OrderQuery;
use crate::suppliers::models::{GasType, SupplierStock};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait EngineStore: Send + Sync {
    async fn begin(&self) -> EngineResult<Box<dyn StoreTx>>;
}

/// One database transaction
///
/// `lock_*` methods take an exclusive row lock held until the transaction
/// ends. Callers that lock several inventory rows do so in ascending id order.
#[async_trait]
pub trait StoreTx: Send {
    async fn commit(self: Box<Self>) -> EngineResult<()>;

    // Catalog

    async fn find_gas_type(&mut self, id: Uuid) -> EngineResult<Option<GasType>>;

    /// Active suppliers whose free stock of the SKU covers `quantity`,
    /// ordered by inventory record id
    async fn find_supplier_candidates(
        &mut self,
        gas_type_id: Uuid,
        cylinder_size: &str,
        quantity: i32,
    ) -> EngineResult<Vec<SupplierStock>>;

    /// Active rules valid at `query.at`, highest priority then newest first
    async fn find_pricing_rules(&mut self, query: &RuleQuery) -> EngineResult<Vec<PricingRule>>;

    // Inventory

    async fn find_inventory_by_sku(&mut self, sku: &Sku) -> EngineResult<Option<InventoryRecord>>;

    async fn lock_inventory(&mut self, id: Uuid) -> EngineResult<Option<InventoryRecord>>;

    async fn lock_inventory_by_sku(&mut self, sku: &Sku) -> EngineResult<Option<InventoryRecord>>;

    /// Writes `quantity_available` and `quantity_reserved` of a locked record
    async fn save_inventory_quantities(&mut self, record: &InventoryRecord) -> EngineResult<()>;

    async fn insert_reservation(&mut self, reservation: &Reservation) -> EngineResult<()>;

    async fn lock_reservation(&mut self, id: Uuid) -> EngineResult<Option<Reservation>>;

    async fn lock_reservations_for_order(&mut self, order_id: Uuid) -> EngineResult<Vec<Reservation>>;

    /// Writes status, reason and expiry of a locked reservation
    async fn update_reservation(&mut self, reservation: &Reservation) -> EngineResult<()>;

    /// Locks up to `limit` active reservations past expiry whose order is
    /// still pending or absent, skipping rows another transaction holds
    async fn lock_expired_reservations(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> EngineResult<Vec<Reservation>>;

    // Orders

    async fn insert_order(&mut self, order: &Order) -> EngineResult<()>;

    async fn insert_order_item(&mut self, item: &OrderItem) -> EngineResult<()>;

    async fn insert_status_history(&mut self, entry: &OrderStatusHistory) -> EngineResult<()>;

    async fn find_order(&mut self, id: Uuid) -> EngineResult<Option<Order>>;

    async fn lock_order(&mut self, id: Uuid) -> EngineResult<Option<Order>>;

    /// Writes the mutable columns (status and stamps) of a locked order
    async fn update_order(&mut self, order: &Order) -> EngineResult<()>;

    async fn find_order_items(&mut self, order_id: Uuid) -> EngineResult<Vec<OrderItem>>;

    async fn find_status_history(&mut self, order_id: Uuid) -> EngineResult<Vec<OrderStatusHistory>>;

    async fn list_orders(&mut self, query: &OrderQuery) -> EngineResult<Vec<Order>>;

    // Delivery

    async fn find_delivery_by_order(&mut self, order_id: Uuid) -> EngineResult<Option<Delivery>>;

    async fn lock_delivery_by_order(&mut self, order_id: Uuid) -> EngineResult<Option<Delivery>>;

    async fn insert_delivery(&mut self, delivery: &Delivery) -> EngineResult<()>;

    async fn update_delivery(&mut self, delivery: &Delivery) -> EngineResult<()>;

    async fn insert_tracking_entry(&mut self, entry: &TrackingEntry) -> EngineResult<()>;
}
