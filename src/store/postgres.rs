// PostgreSQL store
// Runtime-checked sqlx queries; every method runs on the open transaction

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::delivery::models::{Delivery, TrackingEntry};
use crate::error::EngineResult;
use crate::inventory::models::{InventoryRecord, Reservation, Sku};
use crate::orders::models::{Order, OrderItem, OrderStatusHistory};
use crate::pricing::models::{PricingRule, RuleQuery};
use crate::query::OrderQuery;
use crate::store::{EngineStore, StoreTx};
use crate::suppliers::models::{GasType, SupplierStock};

const INVENTORY_COLUMNS: &str = "id, supplier_id, gas_type_id, cylinder_size, quantity_available, \
     quantity_reserved, reorder_level, unit_cost, created_at, updated_at";

const RESERVATION_COLUMNS: &str = "id, inventory_record_id, order_id, quantity, status, \
     release_reason, expires_at, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, order_number, customer_id, customer_role, delivery_address_id, \
     order_type, priority, status, subtotal, tax_amount, delivery_fee, emergency_surcharge, \
     total_amount, currency, special_instructions, scheduled_delivery_date, delivery_latitude, \
     delivery_longitude, cancellation_reason, cancelled_at, delivered_at, created_at, updated_at";

const ORDER_ITEM_COLUMNS: &str = "id, order_id, supplier_id, inventory_record_id, gas_type_id, \
     cylinder_size, quantity, unit_price, original_price, discount_amount, total_price, \
     pricing_rule_id, created_at";

const DELIVERY_COLUMNS: &str = "id, order_id, driver_id, status, scheduled_date, estimated_arrival, \
     departed_at, actual_arrival, current_latitude, current_longitude, created_at, updated_at";

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EngineStore for PgStore {
    async fn begin(&self) -> EngineResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

/// Open PostgreSQL transaction; sqlx rolls back on drop
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn commit(self: Box<Self>) -> EngineResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn find_gas_type(&mut self, id: Uuid) -> EngineResult<Option<GasType>> {
        let gas_type = sqlx::query_as::<_, GasType>(
            "SELECT id, name, is_active FROM gas_types WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(gas_type)
    }

    async fn find_supplier_candidates(
        &mut self,
        gas_type_id: Uuid,
        cylinder_size: &str,
        quantity: i32,
    ) -> EngineResult<Vec<SupplierStock>> {
        let candidates = sqlx::query_as::<_, SupplierStock>(
            r#"
            SELECT s.id AS supplier_id, s.name AS supplier_name, s.rating, s.latitude, s.longitude,
                   i.id AS inventory_record_id,
                   (i.quantity_available - i.quantity_reserved) AS free_quantity
            FROM inventory i
            JOIN suppliers s ON s.id = i.supplier_id
            WHERE i.gas_type_id = $1
              AND i.cylinder_size = $2
              AND s.is_active
              AND i.quantity_available - i.quantity_reserved >= $3
            ORDER BY i.id
            "#,
        )
        .bind(gas_type_id)
        .bind(cylinder_size)
        .bind(quantity)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(candidates)
    }

    async fn find_pricing_rules(&mut self, query: &RuleQuery) -> EngineResult<Vec<PricingRule>> {
        let rules = sqlx::query_as::<_, PricingRule>(
            r#"
            SELECT id, supplier_id, gas_type_id, cylinder_size, customer_class, base_price,
                   bulk_threshold, bulk_discount_percent, priority, is_active, valid_from,
                   valid_to, created_at
            FROM pricing_rules
            WHERE supplier_id = $1
              AND gas_type_id = $2
              AND cylinder_size = $3
              AND customer_class = $4
              AND is_active
              AND (valid_from IS NULL OR valid_from <= $5)
              AND (valid_to IS NULL OR valid_to >= $5)
            ORDER BY priority DESC, created_at DESC
            "#,
        )
        .bind(query.supplier_id)
        .bind(query.gas_type_id)
        .bind(&query.cylinder_size)
        .bind(query.customer_class)
        .bind(query.at)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rules)
    }

    async fn find_inventory_by_sku(&mut self, sku: &Sku) -> EngineResult<Option<InventoryRecord>> {
        let sql = format!(
            "SELECT {} FROM inventory WHERE supplier_id = $1 AND gas_type_id = $2 AND cylinder_size = $3",
            INVENTORY_COLUMNS
        );
        let record = sqlx::query_as::<_, InventoryRecord>(&sql)
            .bind(sku.supplier_id)
            .bind(sku.gas_type_id)
            .bind(&sku.cylinder_size)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(record)
    }

    async fn lock_inventory(&mut self, id: Uuid) -> EngineResult<Option<InventoryRecord>> {
        let sql = format!("SELECT {} FROM inventory WHERE id = $1 FOR UPDATE", INVENTORY_COLUMNS);
        let record = sqlx::query_as::<_, InventoryRecord>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(record)
    }

    async fn lock_inventory_by_sku(&mut self, sku: &Sku) -> EngineResult<Option<InventoryRecord>> {
        let sql = format!(
            "SELECT {} FROM inventory \
             WHERE supplier_id = $1 AND gas_type_id = $2 AND cylinder_size = $3 FOR UPDATE",
            INVENTORY_COLUMNS
        );
        let record = sqlx::query_as::<_, InventoryRecord>(&sql)
            .bind(sku.supplier_id)
            .bind(sku.gas_type_id)
            .bind(&sku.cylinder_size)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(record)
    }

    async fn save_inventory_quantities(&mut self, record: &InventoryRecord) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE inventory
            SET quantity_available = $2, quantity_reserved = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.quantity_available)
        .bind(record.quantity_reserved)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_reservations
                (id, inventory_record_id, order_id, quantity, status, release_reason,
                 expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.inventory_record_id)
        .bind(reservation.order_id)
        .bind(reservation.quantity)
        .bind(reservation.status)
        .bind(&reservation.release_reason)
        .bind(reservation.expires_at)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn lock_reservation(&mut self, id: Uuid) -> EngineResult<Option<Reservation>> {
        let sql = format!(
            "SELECT {} FROM inventory_reservations WHERE id = $1 FOR UPDATE",
            RESERVATION_COLUMNS
        );
        let reservation = sqlx::query_as::<_, Reservation>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(reservation)
    }

    async fn lock_reservations_for_order(&mut self, order_id: Uuid) -> EngineResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {} FROM inventory_reservations WHERE order_id = $1 \
             ORDER BY inventory_record_id, id FOR UPDATE",
            RESERVATION_COLUMNS
        );
        let reservations = sqlx::query_as::<_, Reservation>(&sql)
            .bind(order_id)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(reservations)
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE inventory_reservations
            SET status = $2, release_reason = $3, expires_at = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.status)
        .bind(&reservation.release_reason)
        .bind(reservation.expires_at)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn lock_expired_reservations(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> EngineResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT r.id, r.inventory_record_id, r.order_id, r.quantity, r.status,
                   r.release_reason, r.expires_at, r.created_at, r.updated_at
            FROM inventory_reservations r
            LEFT JOIN orders o ON o.id = r.order_id
            WHERE r.status = 'active'
              AND r.expires_at < $1
              AND (o.id IS NULL OR o.status = 'pending')
            ORDER BY r.inventory_record_id, r.id
            LIMIT $2
            FOR UPDATE OF r SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(reservations)
    }

    async fn insert_order(&mut self, order: &Order) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, order_number, customer_id, customer_role, delivery_address_id, order_type,
                 priority, status, subtotal, tax_amount, delivery_fee, emergency_surcharge,
                 total_amount, currency, special_instructions, scheduled_delivery_date,
                 delivery_latitude, delivery_longitude, cancellation_reason, cancelled_at,
                 delivered_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23)
            "#,
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.customer_id)
        .bind(order.customer_role)
        .bind(order.delivery_address_id)
        .bind(order.order_type)
        .bind(order.priority)
        .bind(order.status)
        .bind(order.subtotal)
        .bind(order.tax_amount)
        .bind(order.delivery_fee)
        .bind(order.emergency_surcharge)
        .bind(order.total_amount)
        .bind(&order.currency)
        .bind(&order.special_instructions)
        .bind(order.scheduled_delivery_date)
        .bind(order.delivery_latitude)
        .bind(order.delivery_longitude)
        .bind(&order.cancellation_reason)
        .bind(order.cancelled_at)
        .bind(order.delivered_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items
                (id, order_id, supplier_id, inventory_record_id, gas_type_id, cylinder_size,
                 quantity, unit_price, original_price, discount_amount, total_price,
                 pricing_rule_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(item.id)
        .bind(item.order_id)
        .bind(item.supplier_id)
        .bind(item.inventory_record_id)
        .bind(item.gas_type_id)
        .bind(&item.cylinder_size)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.original_price)
        .bind(item.discount_amount)
        .bind(item.total_price)
        .bind(item.pricing_rule_id)
        .bind(item.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_status_history(&mut self, entry: &OrderStatusHistory) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_status_history
                (id, order_id, previous_status, new_status, changed_by, changed_by_role, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.order_id)
        .bind(entry.previous_status)
        .bind(entry.new_status)
        .bind(entry.changed_by)
        .bind(entry.changed_by_role)
        .bind(&entry.reason)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_order(&mut self, id: Uuid) -> EngineResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(order)
    }

    async fn lock_order(&mut self, id: Uuid) -> EngineResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS);
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(order)
    }

    async fn update_order(&mut self, order: &Order) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, cancellation_reason = $3, cancelled_at = $4, delivered_at = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.status)
        .bind(&order.cancellation_reason)
        .bind(order.cancelled_at)
        .bind(order.delivered_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_order_items(&mut self, order_id: Uuid) -> EngineResult<Vec<OrderItem>> {
        let sql = format!(
            "SELECT {} FROM order_items WHERE order_id = $1 ORDER BY created_at, id",
            ORDER_ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(order_id)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(items)
    }

    async fn find_status_history(&mut self, order_id: Uuid) -> EngineResult<Vec<OrderStatusHistory>> {
        let history = sqlx::query_as::<_, OrderStatusHistory>(
            r#"
            SELECT id, order_id, previous_status, new_status, changed_by, changed_by_role, reason, created_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(history)
    }

    async fn list_orders(&mut self, query: &OrderQuery) -> EngineResult<Vec<Order>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM orders WHERE TRUE", ORDER_COLUMNS));

        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(order_type) = query.order_type {
            builder.push(" AND order_type = ").push_bind(order_type);
        }
        if let Some(customer_id) = query.customer_id {
            builder.push(" AND customer_id = ").push_bind(customer_id);
        }
        if let Some(supplier_id) = query.supplier_id {
            builder
                .push(" AND EXISTS (SELECT 1 FROM order_items oi WHERE oi.order_id = orders.id AND oi.supplier_id = ")
                .push_bind(supplier_id)
                .push(")");
        }
        if let Some(from) = query.created_from {
            builder.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = query.created_to {
            builder.push(" AND created_at <= ").push_bind(to);
        }

        builder
            .push(" ORDER BY created_at ")
            .push(query.sort_order.as_sql())
            .push(", id LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(query.offset());

        let orders = builder
            .build_query_as::<Order>()
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(orders)
    }

    async fn find_delivery_by_order(&mut self, order_id: Uuid) -> EngineResult<Option<Delivery>> {
        let sql = format!("SELECT {} FROM deliveries WHERE order_id = $1", DELIVERY_COLUMNS);
        let delivery = sqlx::query_as::<_, Delivery>(&sql)
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(delivery)
    }

    async fn lock_delivery_by_order(&mut self, order_id: Uuid) -> EngineResult<Option<Delivery>> {
        let sql = format!(
            "SELECT {} FROM deliveries WHERE order_id = $1 FOR UPDATE",
            DELIVERY_COLUMNS
        );
        let delivery = sqlx::query_as::<_, Delivery>(&sql)
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(delivery)
    }

    async fn insert_delivery(&mut self, delivery: &Delivery) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO deliveries
                (id, order_id, driver_id, status, scheduled_date, estimated_arrival, departed_at,
                 actual_arrival, current_latitude, current_longitude, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.order_id)
        .bind(delivery.driver_id)
        .bind(delivery.status)
        .bind(delivery.scheduled_date)
        .bind(delivery.estimated_arrival)
        .bind(delivery.departed_at)
        .bind(delivery.actual_arrival)
        .bind(delivery.current_latitude)
        .bind(delivery.current_longitude)
        .bind(delivery.created_at)
        .bind(delivery.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_delivery(&mut self, delivery: &Delivery) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE deliveries
            SET driver_id = $2, status = $3, scheduled_date = $4, estimated_arrival = $5,
                departed_at = $6, actual_arrival = $7, current_latitude = $8,
                current_longitude = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.driver_id)
        .bind(delivery.status)
        .bind(delivery.scheduled_date)
        .bind(delivery.estimated_arrival)
        .bind(delivery.departed_at)
        .bind(delivery.actual_arrival)
        .bind(delivery.current_latitude)
        .bind(delivery.current_longitude)
        .bind(delivery.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_tracking_entry(&mut self, entry: &TrackingEntry) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO delivery_tracking
                (id, delivery_id, driver_id, latitude, longitude, status, notes, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.delivery_id)
        .bind(entry.driver_id)
        .bind(entry.latitude)
        .bind(entry.longitude)
        .bind(entry.status)
        .bind(&entry.notes)
        .bind(entry.recorded_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }
}
