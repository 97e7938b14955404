// Domain events and real-time push
//
// Events are published only after the owning transaction commits. Delivery
// to the broker is at-least-once; every payload carries an `eventId` that
// stays the same across replays so consumers can deduplicate.

pub mod redis_bus;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::Role;
use crate::delivery::models::DeliveryStatus;
use crate::error::EngineResult;
use crate::orders::models::{OrderStatus, OrderType};

pub use redis_bus::RedisEventBus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub event_id: String,
    pub order_id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub supplier_ids: Vec<Uuid>,
    pub order_type: OrderType,
    pub total_amount: Decimal,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusChanged {
    pub event_id: String,
    pub order_id: Uuid,
    pub order_number: String,
    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,
    pub actor_id: Uuid,
    pub actor_role: Role,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLocationUpdated {
    pub event_id: String,
    pub order_id: Uuid,
    pub delivery_id: Uuid,
    pub driver_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub status: DeliveryStatus,
    pub distance_km: Option<f64>,
    pub estimated_minutes: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReserved {
    pub event_id: String,
    pub reservation_id: Uuid,
    pub inventory_record_id: Uuid,
    pub order_id: Option<Uuid>,
    pub quantity: i32,
    pub expires_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReleased {
    pub event_id: String,
    pub reservation_id: Uuid,
    pub inventory_record_id: Uuid,
    pub order_id: Option<Uuid>,
    pub quantity: i32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Every event the engine emits, tagged by routing key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum DomainEvent {
    #[serde(rename = "order.created")]
    OrderCreated(OrderCreated),
    #[serde(rename = "order.status.changed")]
    OrderStatusChanged(OrderStatusChanged),
    #[serde(rename = "delivery.location_updated")]
    DeliveryLocationUpdated(DeliveryLocationUpdated),
    #[serde(rename = "inventory.reserved")]
    InventoryReserved(InventoryReserved),
    #[serde(rename = "inventory.released")]
    InventoryReleased(InventoryReleased),
}

impl DomainEvent {
    pub fn routing_key(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated(_) => "order.created",
            DomainEvent::OrderStatusChanged(_) => "order.status.changed",
            DomainEvent::DeliveryLocationUpdated(_) => "delivery.location_updated",
            DomainEvent::InventoryReserved(_) => "inventory.reserved",
            DomainEvent::InventoryReleased(_) => "inventory.released",
        }
    }

    pub fn event_id(&self) -> &str {
        match self {
            DomainEvent::OrderCreated(e) => &e.event_id,
            DomainEvent::OrderStatusChanged(e) => &e.event_id,
            DomainEvent::DeliveryLocationUpdated(e) => &e.event_id,
            DomainEvent::InventoryReserved(e) => &e.event_id,
            DomainEvent::InventoryReleased(e) => &e.event_id,
        }
    }

    /// Order whose real-time channel should see this event
    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            DomainEvent::OrderCreated(e) => Some(e.order_id),
            DomainEvent::OrderStatusChanged(e) => Some(e.order_id),
            DomainEvent::DeliveryLocationUpdated(e) => Some(e.order_id),
            DomainEvent::InventoryReserved(_) | DomainEvent::InventoryReleased(_) => None,
        }
    }

    pub fn to_json(&self) -> EngineResult<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Real-time channel name for an order
pub fn order_channel(order_id: Uuid) -> String {
    format!("order:{}", order_id)
}

/// Outbound broker and push contract
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish to the broker under the event's routing key
    async fn publish(&self, event: &DomainEvent) -> EngineResult<()>;

    /// Push a payload to everyone subscribed to `channel`
    async fn broadcast(&self, channel: &str, payload: &JsonValue) -> EngineResult<()>;
}

/// Publishes committed events and fans order events out to their channel
///
/// Failures are logged and swallowed: the state change is already durable.
pub async fn publish_all(publisher: &dyn EventPublisher, events: &[DomainEvent]) {
    for event in events {
        if let Err(e) = publisher.publish(event).await {
            warn!(
                "Failed to publish {} ({}): {}",
                event.routing_key(),
                event.event_id(),
                e
            );
            continue;
        }
        debug!("Published {} ({})", event.routing_key(), event.event_id());

        if let Some(order_id) = event.order_id() {
            let payload = match event.to_json() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to encode {} for broadcast: {}", event.routing_key(), e);
                    continue;
                }
            };
            if let Err(e) = publisher.broadcast(&order_channel(order_id), &payload).await {
                warn!("Failed to broadcast on order {}: {}", order_id, e);
            }
        }
    }
}

/// In-process bus used when no broker is configured, and by tests
pub struct InMemoryEventBus {
    published: Mutex<Vec<DomainEvent>>,
    broadcasts: Mutex<Vec<(String, JsonValue)>>,
    sender: broadcast::Sender<(String, JsonValue)>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            published: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
            sender,
        }
    }

    pub fn published(&self) -> Vec<DomainEvent> {
        self.published.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn routing_keys(&self) -> Vec<&'static str> {
        self.published().iter().map(DomainEvent::routing_key).collect()
    }

    pub fn broadcasts(&self) -> Vec<(String, JsonValue)> {
        self.broadcasts.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Live feed of `(channel, payload)` pushes
    pub fn subscribe(&self) -> broadcast::Receiver<(String, JsonValue)> {
        self.sender.subscribe()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: &DomainEvent) -> EngineResult<()> {
        if let Ok(mut published) = self.published.lock() {
            published.push(event.clone());
        }
        Ok(())
    }

    async fn broadcast(&self, channel: &str, payload: &JsonValue) -> EngineResult<()> {
        if let Ok(mut broadcasts) = self.broadcasts.lock() {
            broadcasts.push((channel.to_string(), payload.clone()));
        }
        // no subscribers is fine
        let _ = self.sender.send((channel.to_string(), payload.clone()));
        Ok(())
    }
}
