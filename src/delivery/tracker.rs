// Delivery tracker
//
// Records driver positions. A report that closes the delivery is handed to the
// order state machine in the same transaction, so stock and order stamps are
// settled exactly as a status change would settle them.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::auth::Role;
use crate::delivery::models::{DeliveryStatus, LocationUpdate, LocationUpdateRequest, TrackingEntry};
use crate::error::{EngineError, EngineResult};
use crate::events::{publish_all, DeliveryLocationUpdated, DomainEvent, EventPublisher};
use crate::geo::{estimate_eta, Coordinates};
use crate::orders::models::OrderStatus;
use crate::orders::status_machine::{Actor, OrderStateMachine, TransitionRequest};
use crate::store::EngineStore;
use crate::validation::validate_coordinates;

pub struct DeliveryTracker {
    store: Arc<dyn EngineStore>,
    events: Arc<dyn EventPublisher>,
    state_machine: Arc<OrderStateMachine>,
    average_speed_kmh: f64,
}

impl DeliveryTracker {
    pub fn new(
        store: Arc<dyn EngineStore>,
        events: Arc<dyn EventPublisher>,
        state_machine: Arc<OrderStateMachine>,
        average_speed_kmh: f64,
    ) -> Self {
        Self {
            store,
            events,
            state_machine,
            average_speed_kmh,
        }
    }

    /// Stores a position report from the driver assigned to the order
    ///
    /// A `delivered` or `failed` status moves the order through the state
    /// machine; `in_transit` only touches the delivery row.
    pub async fn update_location(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        request: LocationUpdateRequest,
    ) -> EngineResult<LocationUpdate> {
        validate_coordinates(request.latitude, request.longitude)?;
        request.validate()?;

        let closing_status = match request.status {
            None | Some(DeliveryStatus::InTransit) => None,
            Some(DeliveryStatus::Delivered) => Some(OrderStatus::Delivered),
            Some(DeliveryStatus::Failed) => Some(OrderStatus::Failed),
            Some(DeliveryStatus::Assigned) => {
                return Err(EngineError::invalid_field(
                    "status",
                    "a driver cannot move a delivery back to assigned",
                ))
            }
        };

        let mut tx = self.store.begin().await?;

        // order before delivery, the same order transitions lock in
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;
        let mut delivery = tx
            .lock_delivery_by_order(order_id)
            .await?
            .filter(|d| d.driver_id == Some(driver_id))
            .ok_or_else(|| EngineError::not_found("Delivery", order_id))?;

        if delivery.status.is_terminal() {
            return Err(EngineError::validation(format!(
                "delivery for order {} is already {}",
                order.order_number, delivery.status
            )));
        }

        let now = Utc::now();
        delivery.current_latitude = Some(request.latitude);
        delivery.current_longitude = Some(request.longitude);
        if request.status == Some(DeliveryStatus::InTransit) {
            delivery.status = DeliveryStatus::InTransit;
        }
        delivery.updated_at = now;
        tx.update_delivery(&delivery).await?;

        let entry = TrackingEntry {
            id: Uuid::new_v4(),
            delivery_id: delivery.id,
            driver_id,
            latitude: request.latitude,
            longitude: request.longitude,
            status: request.status,
            notes: request.notes.clone(),
            recorded_at: now,
        };
        tx.insert_tracking_entry(&entry).await?;

        let mut transition_events = Vec::new();
        if let Some(to) = closing_status {
            let outcome = self
                .state_machine
                .apply_in(
                    tx.as_mut(),
                    &TransitionRequest {
                        order_id,
                        to,
                        actor: Actor {
                            id: driver_id,
                            role: Role::Driver,
                        },
                        reason: request.notes.clone(),
                        driver_id: None,
                    },
                )
                .await?;
            if let Some(updated) = outcome.delivery {
                delivery = updated;
            }
            transition_events = outcome.events;
        }

        tx.commit().await?;

        let here = Coordinates::new(request.latitude, request.longitude);
        let eta = order
            .destination()
            .map(|destination| estimate_eta(here, destination, self.average_speed_kmh));

        debug!(
            "Driver {} at ({}, {}) for order {}",
            driver_id, request.latitude, request.longitude, order.order_number
        );
        if let Some(to) = closing_status {
            info!("Delivery for order {} closed as {}", order.order_number, to);
        }

        let mut events = vec![DomainEvent::DeliveryLocationUpdated(DeliveryLocationUpdated {
            event_id: format!("delivery.location_updated:{}", entry.id),
            order_id,
            delivery_id: delivery.id,
            driver_id,
            latitude: request.latitude,
            longitude: request.longitude,
            status: delivery.status,
            distance_km: eta.map(|e| e.distance_km),
            estimated_minutes: eta.map(|e| e.estimated_minutes),
            timestamp: now,
        })];
        events.extend(transition_events);
        publish_all(self.events.as_ref(), &events).await;

        Ok(LocationUpdate { delivery, eta })
    }
}
