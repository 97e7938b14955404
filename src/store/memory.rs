// In-memory store
//
// Transactions are serialised on one async mutex and roll back by restoring
// a snapshot taken at `begin`. Used by tests and local demos.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::delivery::models::{Delivery, TrackingEntry};
use crate::error::{EngineError, EngineResult};
use crate::inventory::models::{InventoryRecord, Reservation, ReservationStatus, Sku};
use crate::orders::models::{Order, OrderItem, OrderStatus, OrderStatusHistory};
use crate::pricing::models::{PricingRule, RuleQuery};
use crate::query::{OrderQuery, SortOrder};
use crate::store::{EngineStore, StoreTx};
use crate::suppliers::models::{GasType, Supplier, SupplierStock};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub suppliers: HashMap<Uuid, Supplier>,
    pub gas_types: HashMap<Uuid, GasType>,
    pub inventory: HashMap<Uuid, InventoryRecord>,
    pub reservations: HashMap<Uuid, Reservation>,
    pub pricing_rules: Vec<PricingRule>,
    pub orders: HashMap<Uuid, Order>,
    pub order_items: Vec<OrderItem>,
    pub status_history: Vec<OrderStatusHistory>,
    pub deliveries: HashMap<Uuid, Delivery>,
    pub tracking: Vec<TrackingEntry>,
    /// When set, pricing rule queries fail like a lost database connection
    pub pricing_rules_offline: bool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_supplier(&self, supplier: Supplier) {
        self.state.lock().await.suppliers.insert(supplier.id, supplier);
    }

    pub async fn insert_gas_type(&self, gas_type: GasType) {
        self.state.lock().await.gas_types.insert(gas_type.id, gas_type);
    }

    pub async fn insert_inventory(&self, record: InventoryRecord) {
        self.state.lock().await.inventory.insert(record.id, record);
    }

    pub async fn insert_pricing_rule(&self, rule: PricingRule) {
        self.state.lock().await.pricing_rules.push(rule);
    }

    /// Copy of the committed state
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    pub async fn inventory(&self, id: Uuid) -> Option<InventoryRecord> {
        self.state.lock().await.inventory.get(&id).cloned()
    }

    pub async fn reservation(&self, id: Uuid) -> Option<Reservation> {
        self.state.lock().await.reservations.get(&id).cloned()
    }

    pub async fn order(&self, id: Uuid) -> Option<Order> {
        self.state.lock().await.orders.get(&id).cloned()
    }

    pub async fn delivery_for_order(&self, order_id: Uuid) -> Option<Delivery> {
        self.state
            .lock()
            .await
            .deliveries
            .values()
            .find(|d| d.order_id == order_id)
            .cloned()
    }

    pub async fn set_pricing_rules_offline(&self, offline: bool) {
        self.state.lock().await.pricing_rules_offline = offline;
    }

    /// Test hook for moving a hold's expiry
    pub async fn set_reservation_expiry(&self, id: Uuid, expires_at: DateTime<Utc>) {
        if let Some(r) = self.state.lock().await.reservations.get_mut(&id) {
            r.expires_at = expires_at;
        }
    }
}

#[async_trait]
impl EngineStore for MemoryStore {
    async fn begin(&self) -> EngineResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            snapshot: Some(snapshot),
        }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    /// Taken on commit; restored on drop otherwise
    snapshot: Option<MemoryState>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

fn missing(resource: &'static str, id: Uuid) -> EngineError {
    EngineError::Internal(format!("{} {} vanished inside its transaction", resource, id))
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(mut self: Box<Self>) -> EngineResult<()> {
        self.snapshot = None;
        Ok(())
    }

    async fn find_gas_type(&mut self, id: Uuid) -> EngineResult<Option<GasType>> {
        Ok(self.guard.gas_types.get(&id).cloned())
    }

    async fn find_supplier_candidates(
        &mut self,
        gas_type_id: Uuid,
        cylinder_size: &str,
        quantity: i32,
    ) -> EngineResult<Vec<SupplierStock>> {
        let state = &*self.guard;
        let mut candidates: Vec<SupplierStock> = state
            .inventory
            .values()
            .filter(|r| r.gas_type_id == gas_type_id && r.cylinder_size == cylinder_size)
            .filter(|r| r.free() >= quantity)
            .filter_map(|r| {
                let supplier = state.suppliers.get(&r.supplier_id).filter(|s| s.is_active)?;
                Some(SupplierStock {
                    supplier_id: supplier.id,
                    supplier_name: supplier.name.clone(),
                    rating: supplier.rating,
                    latitude: supplier.latitude,
                    longitude: supplier.longitude,
                    inventory_record_id: r.id,
                    free_quantity: r.free(),
                })
            })
            .collect();
        candidates.sort_by_key(|c| c.inventory_record_id);
        Ok(candidates)
    }

    async fn find_pricing_rules(&mut self, query: &RuleQuery) -> EngineResult<Vec<PricingRule>> {
        if self.guard.pricing_rules_offline {
            return Err(EngineError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut rules: Vec<PricingRule> = self
            .guard
            .pricing_rules
            .iter()
            .filter(|r| {
                r.supplier_id == query.supplier_id
                    && r.gas_type_id == query.gas_type_id
                    && r.cylinder_size == query.cylinder_size
                    && r.customer_class == query.customer_class
                    && r.is_valid_at(query.at)
            })
            .cloned()
            .collect();
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(rules)
    }

    async fn find_inventory_by_sku(&mut self, sku: &Sku) -> EngineResult<Option<InventoryRecord>> {
        Ok(self
            .guard
            .inventory
            .values()
            .find(|r| {
                r.supplier_id == sku.supplier_id
                    && r.gas_type_id == sku.gas_type_id
                    && r.cylinder_size == sku.cylinder_size
            })
            .cloned())
    }

    async fn lock_inventory(&mut self, id: Uuid) -> EngineResult<Option<InventoryRecord>> {
        Ok(self.guard.inventory.get(&id).cloned())
    }

    async fn lock_inventory_by_sku(&mut self, sku: &Sku) -> EngineResult<Option<InventoryRecord>> {
        self.find_inventory_by_sku(sku).await
    }

    async fn save_inventory_quantities(&mut self, record: &InventoryRecord) -> EngineResult<()> {
        let stored = self
            .guard
            .inventory
            .get_mut(&record.id)
            .ok_or_else(|| missing("inventory record", record.id))?;
        if record.quantity_reserved < 0 || record.quantity_reserved > record.quantity_available {
            // mirrors the table's CHECK constraint
            return Err(EngineError::Internal(format!(
                "inventory {} would violate 0 <= reserved <= available",
                record.id
            )));
        }
        stored.quantity_available = record.quantity_available;
        stored.quantity_reserved = record.quantity_reserved;
        stored.updated_at = record.updated_at;
        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> EngineResult<()> {
        self.guard
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn lock_reservation(&mut self, id: Uuid) -> EngineResult<Option<Reservation>> {
        Ok(self.guard.reservations.get(&id).cloned())
    }

    async fn lock_reservations_for_order(&mut self, order_id: Uuid) -> EngineResult<Vec<Reservation>> {
        let mut reservations: Vec<Reservation> = self
            .guard
            .reservations
            .values()
            .filter(|r| r.order_id == Some(order_id))
            .cloned()
            .collect();
        reservations.sort_by_key(|r| (r.inventory_record_id, r.id));
        Ok(reservations)
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> EngineResult<()> {
        let stored = self
            .guard
            .reservations
            .get_mut(&reservation.id)
            .ok_or_else(|| missing("reservation", reservation.id))?;
        stored.status = reservation.status;
        stored.release_reason = reservation.release_reason.clone();
        stored.expires_at = reservation.expires_at;
        stored.updated_at = reservation.updated_at;
        Ok(())
    }

    async fn lock_expired_reservations(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> EngineResult<Vec<Reservation>> {
        let state = &*self.guard;
        let mut expired: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Active && r.expires_at < now)
            .filter(|r| match r.order_id.and_then(|id| state.orders.get(&id)) {
                Some(order) => order.status == OrderStatus::Pending,
                None => true,
            })
            .cloned()
            .collect();
        expired.sort_by_key(|r| (r.inventory_record_id, r.id));
        expired.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(expired)
    }

    async fn insert_order(&mut self, order: &Order) -> EngineResult<()> {
        if self
            .guard
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(EngineError::Internal(format!(
                "duplicate order number {}",
                order.order_number
            )));
        }
        self.guard.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> EngineResult<()> {
        self.guard.order_items.push(item.clone());
        Ok(())
    }

    async fn insert_status_history(&mut self, entry: &OrderStatusHistory) -> EngineResult<()> {
        self.guard.status_history.push(entry.clone());
        Ok(())
    }

    async fn find_order(&mut self, id: Uuid) -> EngineResult<Option<Order>> {
        Ok(self.guard.orders.get(&id).cloned())
    }

    async fn lock_order(&mut self, id: Uuid) -> EngineResult<Option<Order>> {
        self.find_order(id).await
    }

    async fn update_order(&mut self, order: &Order) -> EngineResult<()> {
        let stored = self
            .guard
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| missing("order", order.id))?;
        stored.status = order.status;
        stored.cancellation_reason = order.cancellation_reason.clone();
        stored.cancelled_at = order.cancelled_at;
        stored.delivered_at = order.delivered_at;
        stored.updated_at = order.updated_at;
        Ok(())
    }

    async fn find_order_items(&mut self, order_id: Uuid) -> EngineResult<Vec<OrderItem>> {
        Ok(self
            .guard
            .order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn find_status_history(&mut self, order_id: Uuid) -> EngineResult<Vec<OrderStatusHistory>> {
        Ok(self
            .guard
            .status_history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list_orders(&mut self, query: &OrderQuery) -> EngineResult<Vec<Order>> {
        let state = &*self.guard;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| query.matches(o))
            .filter(|o| match query.supplier_id {
                Some(supplier_id) => state
                    .order_items
                    .iter()
                    .any(|i| i.order_id == o.id && i.supplier_id == supplier_id),
                None => true,
            })
            .cloned()
            .collect();

        orders.sort_by(|a, b| match query.sort_order {
            SortOrder::Asc => (a.created_at, a.id).cmp(&(b.created_at, b.id)),
            SortOrder::Desc => (b.created_at, a.id).cmp(&(a.created_at, b.id)),
        });

        let offset = usize::try_from(query.offset()).unwrap_or(0);
        Ok(orders
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .collect())
    }

    async fn find_delivery_by_order(&mut self, order_id: Uuid) -> EngineResult<Option<Delivery>> {
        Ok(self
            .guard
            .deliveries
            .values()
            .find(|d| d.order_id == order_id)
            .cloned())
    }

    async fn lock_delivery_by_order(&mut self, order_id: Uuid) -> EngineResult<Option<Delivery>> {
        self.find_delivery_by_order(order_id).await
    }

    async fn insert_delivery(&mut self, delivery: &Delivery) -> EngineResult<()> {
        if self
            .guard
            .deliveries
            .values()
            .any(|d| d.order_id == delivery.order_id)
        {
            return Err(EngineError::Internal(format!(
                "order {} already has a delivery",
                delivery.order_id
            )));
        }
        self.guard.deliveries.insert(delivery.id, delivery.clone());
        Ok(())
    }

    async fn update_delivery(&mut self, delivery: &Delivery) -> EngineResult<()> {
        let stored = self
            .guard
            .deliveries
            .get_mut(&delivery.id)
            .ok_or_else(|| missing("delivery", delivery.id))?;
        *stored = delivery.clone();
        Ok(())
    }

    async fn insert_tracking_entry(&mut self, entry: &TrackingEntry) -> EngineResult<()> {
        self.guard.tracking.push(entry.clone());
        Ok(())
    }
}
