// Shared fixtures for scenario tests over the in-memory store

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AuthUser, Role};
use crate::collaborators::{Address, StaticAddressDirectory, StaticSupplierService};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::events::InMemoryEventBus;
use crate::inventory::models::InventoryRecord;
use crate::orders::models::{CreateOrderRequest, OrderItemRequest, OrderType};
use crate::pricing::models::{CustomerClass, PricingRule};
use crate::store::MemoryStore;
use crate::suppliers::models::{GasType, Supplier};

/// Lagos mainland, used as the default delivery point
pub const HOME: (f64, f64) = (6.5244, 3.3792);

pub struct TestWorld {
    pub store: MemoryStore,
    pub events: Arc<InMemoryEventBus>,
    pub addresses: Arc<StaticAddressDirectory>,
    pub supplier_service: Arc<StaticSupplierService>,
    pub engine: Arc<Engine>,
    pub lpg: Uuid,
}

impl TestWorld {
    pub async fn new() -> Self {
        Self::build(EngineConfig::default(), StaticSupplierService::new()).await
    }

    pub async fn build(config: EngineConfig, supplier_service: StaticSupplierService) -> Self {
        let store = MemoryStore::new();
        let events = Arc::new(InMemoryEventBus::new());
        let addresses = Arc::new(StaticAddressDirectory::new());
        let supplier_service = Arc::new(supplier_service);

        let engine = Arc::new(Engine::new(
            config,
            Arc::new(store.clone()),
            events.clone(),
            addresses.clone(),
            supplier_service.clone(),
        ));

        let lpg = Uuid::new_v4();
        store
            .insert_gas_type(GasType {
                id: lpg,
                name: "LPG".to_string(),
                is_active: true,
            })
            .await;

        Self {
            store,
            events,
            addresses,
            supplier_service,
            engine,
            lpg,
        }
    }

    pub async fn add_supplier(&self, name: &str, rating: f64, position: Option<(f64, f64)>) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_supplier(Supplier {
                id,
                name: name.to_string(),
                rating,
                latitude: position.map(|p| p.0),
                longitude: position.map(|p| p.1),
                is_active: true,
            })
            .await;
        id
    }

    /// Stock of LPG in `size` at `supplier`; returns the inventory record id
    pub async fn add_stock(&self, supplier_id: Uuid, size: &str, quantity: i32) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.store
            .insert_inventory(InventoryRecord {
                id,
                supplier_id,
                gas_type_id: self.lpg,
                cylinder_size: size.to_string(),
                quantity_available: quantity,
                quantity_reserved: 0,
                reorder_level: 2,
                unit_cost: Decimal::new(1500, 2),
                created_at: now,
                updated_at: now,
            })
            .await;
        id
    }

    pub async fn add_rule(&self, supplier_id: Uuid, size: &str, base_price: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_pricing_rule(PricingRule {
                id,
                supplier_id,
                gas_type_id: self.lpg,
                cylinder_size: size.to_string(),
                customer_class: CustomerClass::Retail,
                base_price,
                bulk_threshold: None,
                bulk_discount_percent: None,
                priority: 0,
                is_active: true,
                valid_from: None,
                valid_to: None,
                created_at: Utc::now(),
            })
            .await;
        id
    }

    /// Active address for `customer` at `position`
    pub fn add_address(&self, customer: &AuthUser, position: Option<(f64, f64)>) -> Uuid {
        let id = Uuid::new_v4();
        self.addresses.insert(Address {
            id,
            customer_id: customer.id,
            is_active: true,
            latitude: position.map(|p| p.0),
            longitude: position.map(|p| p.1),
            label: Some("home".to_string()),
        });
        id
    }

    pub async fn free(&self, inventory_id: Uuid) -> (i32, i32) {
        let record = self
            .store
            .inventory(inventory_id)
            .await
            .expect("inventory record exists");
        (record.quantity_available, record.quantity_reserved)
    }
}

pub fn user(role: Role) -> AuthUser {
    AuthUser {
        id: Uuid::new_v4(),
        role,
        customer_type: None,
    }
}

pub fn line(gas_type_id: Uuid, size: &str, quantity: i32) -> OrderItemRequest {
    OrderItemRequest {
        gas_type_id,
        cylinder_size: size.to_string(),
        quantity,
    }
}

pub fn order_request(address_id: Uuid, items: Vec<OrderItemRequest>, order_type: OrderType) -> CreateOrderRequest {
    CreateOrderRequest {
        delivery_address_id: address_id,
        items,
        order_type,
        special_instructions: None,
        scheduled_delivery_date: None,
    }
}
