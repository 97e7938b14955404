// Order state machine
//
// The role table is an exhaustive match over (from, to): adding a status
// forces every pairing to be decided. Side effects run in the same
// transaction as the status write; events are published after commit.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::Role;
use crate::delivery::models::{Delivery, DeliveryStatus};
use crate::error::{EngineError, EngineResult};
use crate::events::{publish_all, DomainEvent, EventPublisher, OrderStatusChanged};
use crate::inventory::ledger::{released_event, reserved_event, InventoryLedger};
use crate::inventory::models::{ReleaseOutcome, Reservation, ReservationStatus};
use crate::orders::models::{Order, OrderItem, OrderStatus, OrderStatusHistory};
use crate::store::{EngineStore, StoreTx};

use OrderStatus::*;

const NOBODY: &[Role] = &[];
const SUPPLIER_ADMIN: &[Role] = &[Role::Supplier, Role::Admin];
const CUSTOMER_SUPPLIER_ADMIN: &[Role] = &[Role::Customer, Role::Supplier, Role::Admin];
const SUPPLIER_DRIVER_ADMIN: &[Role] = &[Role::Supplier, Role::Driver, Role::Admin];
const DRIVER_ADMIN: &[Role] = &[Role::Driver, Role::Admin];
const ADMIN: &[Role] = &[Role::Admin];

/// Roles allowed to move an order from `from` to `to`; empty when the
/// transition does not exist
pub fn allowed_roles(from: OrderStatus, to: OrderStatus) -> &'static [Role] {
    match from {
        Pending => match to {
            Confirmed => SUPPLIER_ADMIN,
            Cancelled => CUSTOMER_SUPPLIER_ADMIN,
            Pending | Preparing | OutForDelivery | Delivered | Failed => NOBODY,
        },
        Confirmed => match to {
            Preparing => SUPPLIER_ADMIN,
            Cancelled => CUSTOMER_SUPPLIER_ADMIN,
            Pending | Confirmed | OutForDelivery | Delivered | Failed => NOBODY,
        },
        Preparing => match to {
            OutForDelivery => SUPPLIER_DRIVER_ADMIN,
            Cancelled => SUPPLIER_ADMIN,
            Pending | Confirmed | Preparing | Delivered | Failed => NOBODY,
        },
        OutForDelivery => match to {
            Delivered | Failed => DRIVER_ADMIN,
            Pending | Confirmed | Preparing | OutForDelivery | Cancelled => NOBODY,
        },
        Failed => match to {
            Pending | Cancelled => ADMIN,
            Confirmed | Preparing | OutForDelivery | Delivered | Failed => NOBODY,
        },
        Delivered | Cancelled => NOBODY,
    }
}

/// Rejects transitions missing from the table or not open to `role`
pub fn check_transition(from: OrderStatus, to: OrderStatus, role: Role) -> EngineResult<()> {
    let roles = allowed_roles(from, to);
    if roles.contains(&role) {
        return Ok(());
    }
    let message = if roles.is_empty() {
        format!("Invalid status transition from {} to {} (role {})", from, to, role)
    } else {
        format!("Role {} may not move an order from {} to {}", role, from, to)
    };
    Err(EngineError::Validation {
        message,
        details: Some(serde_json::json!({
            "from": from,
            "to": to,
            "role": role,
        })),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRequest {
    pub order_id: Uuid,
    pub to: OrderStatus,
    pub actor: Actor,
    pub reason: Option<String>,
    /// Driver taking the delivery on `out_for_delivery`
    pub driver_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order: Order,
    pub history: OrderStatusHistory,
    pub delivery: Option<Delivery>,
    /// Published by whoever commits the transaction
    pub events: Vec<DomainEvent>,
}

pub struct OrderStateMachine {
    store: Arc<dyn EngineStore>,
    events: Arc<dyn EventPublisher>,
    ledger: Arc<InventoryLedger>,
    preparation_lead_time: Duration,
}

impl OrderStateMachine {
    pub fn new(
        store: Arc<dyn EngineStore>,
        events: Arc<dyn EventPublisher>,
        ledger: Arc<InventoryLedger>,
        preparation_lead_time: Duration,
    ) -> Self {
        Self {
            store,
            events,
            ledger,
            preparation_lead_time,
        }
    }

    /// Runs one transition in its own transaction and publishes its events
    pub async fn transition(&self, request: TransitionRequest) -> EngineResult<TransitionOutcome> {
        let mut tx = self.store.begin().await?;
        let outcome = self.apply_in(tx.as_mut(), &request).await?;
        tx.commit().await?;

        info!(
            "Order {} moved {} -> {} by {} {}",
            outcome.order.order_number,
            outcome.history.previous_status.map_or("none", |s| s.as_str()),
            outcome.order.status,
            request.actor.role,
            request.actor.id
        );
        publish_all(self.events.as_ref(), &outcome.events).await;
        Ok(outcome)
    }

    /// Validates and applies a transition inside the caller's transaction
    pub async fn apply_in(
        &self,
        tx: &mut dyn StoreTx,
        request: &TransitionRequest,
    ) -> EngineResult<TransitionOutcome> {
        let mut order = tx
            .lock_order(request.order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", request.order_id))?;

        self.ensure_visible(tx, &order, request).await?;

        let from = order.status;
        let to = request.to;
        check_transition(from, to, request.actor.role)?;
        debug!("Applying {} -> {} to order {}", from, to, order.id);

        let now = Utc::now();
        let mut events = Vec::new();
        let mut delivery = tx.lock_delivery_by_order(order.id).await?;

        match to {
            Confirmed => {
                let reservations = tx.lock_reservations_for_order(order.id).await?;
                let items = tx.find_order_items(order.id).await?;
                let uncovered = uncovered_records(&items, &reservations);
                if !uncovered.is_empty() {
                    let lapsed: Vec<Uuid> = reservations
                        .iter()
                        .filter(|r| r.status == ReservationStatus::Expired)
                        .map(|r| r.id)
                        .collect();
                    return Err(EngineError::business(
                        "Inventory holds for this order have lapsed; retry or cancel the order",
                        Some(serde_json::json!({
                            "lapsed_reservations": lapsed,
                            "inventory_record_ids": uncovered,
                        })),
                    ));
                }

                delivery = Some(match delivery.take() {
                    Some(mut existing) => {
                        existing.status = DeliveryStatus::Assigned;
                        existing.driver_id = None;
                        existing.estimated_arrival = None;
                        existing.departed_at = None;
                        existing.actual_arrival = None;
                        existing.scheduled_date = order.scheduled_delivery_date;
                        existing.updated_at = now;
                        tx.update_delivery(&existing).await?;
                        existing
                    }
                    None => {
                        let created = Delivery {
                            id: Uuid::new_v4(),
                            order_id: order.id,
                            driver_id: None,
                            status: DeliveryStatus::Assigned,
                            scheduled_date: order.scheduled_delivery_date,
                            estimated_arrival: None,
                            departed_at: None,
                            actual_arrival: None,
                            current_latitude: None,
                            current_longitude: None,
                            created_at: now,
                            updated_at: now,
                        };
                        tx.insert_delivery(&created).await?;
                        created
                    }
                });
            }
            Preparing => {
                let mut d = require_delivery(delivery.take(), order.id)?;
                d.estimated_arrival = Some(now + lead_time(self.preparation_lead_time)?);
                d.updated_at = now;
                tx.update_delivery(&d).await?;
                delivery = Some(d);
            }
            OutForDelivery => {
                let mut d = require_delivery(delivery.take(), order.id)?;
                let driver_id = if request.actor.role == Role::Driver {
                    // drivers take deliveries for themselves only
                    if request.driver_id.map_or(false, |named| named != request.actor.id) {
                        return Err(EngineError::invalid_field(
                            "driver_id",
                            "a driver cannot assign a delivery to someone else",
                        ));
                    }
                    request.actor.id
                } else {
                    request.driver_id.or(d.driver_id).ok_or_else(|| {
                        EngineError::invalid_field("driver_id", "a driver must be assigned before departure")
                    })?
                };
                d.driver_id = Some(driver_id);
                d.status = DeliveryStatus::InTransit;
                d.departed_at = Some(now);
                d.updated_at = now;
                tx.update_delivery(&d).await?;
                delivery = Some(d);
            }
            Delivered => {
                let mut d = require_delivery(delivery.take(), order.id)?;
                d.status = DeliveryStatus::Delivered;
                d.actual_arrival = Some(now);
                d.updated_at = now;
                tx.update_delivery(&d).await?;
                delivery = Some(d);

                order.delivered_at = Some(now);
                for reservation in tx.lock_reservations_for_order(order.id).await? {
                    // holds from before a retry were already released
                    if reservation.status == ReservationStatus::Active {
                        self.ledger.commit_locked(tx, reservation).await?;
                    }
                }
            }
            Cancelled | Failed => {
                let reason = request.reason.clone().unwrap_or_else(|| {
                    if to == Failed {
                        "delivery failed".to_string()
                    } else {
                        format!("cancelled by {}", request.actor.role)
                    }
                });

                for reservation in tx.lock_reservations_for_order(order.id).await? {
                    if reservation.status != ReservationStatus::Active {
                        continue;
                    }
                    let (released, outcome) = self.ledger.release_locked(tx, reservation, &reason).await?;
                    if let ReleaseOutcome::Released { .. } = outcome {
                        events.push(released_event(&released));
                    }
                }

                // a cancelled order's delivery will never run
                if let Some(mut d) = delivery.take() {
                    if !d.status.is_terminal() {
                        d.status = DeliveryStatus::Failed;
                        d.updated_at = now;
                        tx.update_delivery(&d).await?;
                    }
                    delivery = Some(d);
                }

                order.cancellation_reason = Some(reason);
                order.cancelled_at = Some(now);
            }
            Pending => {
                // failed -> pending: hold stock again before the order is re-confirmed
                let mut items = tx.find_order_items(order.id).await?;
                items.sort_by_key(|item| (item.inventory_record_id, item.id));
                let ttl = self.ledger.default_ttl();
                for item in &items {
                    let hold = self
                        .ledger
                        .reserve_record_in(tx, item.inventory_record_id, item.quantity, Some(order.id), ttl)
                        .await
                        .map_err(|e| e.shortfall_as_business("Insufficient inventory to retry the order"))?;
                    events.push(reserved_event(&hold.reservation));
                }
                order.cancellation_reason = None;
                order.cancelled_at = None;
            }
        }

        order.status = to;
        order.updated_at = now;
        tx.update_order(&order).await?;

        let history = OrderStatusHistory {
            id: Uuid::new_v4(),
            order_id: order.id,
            previous_status: Some(from),
            new_status: to,
            changed_by: request.actor.id,
            changed_by_role: request.actor.role,
            reason: request.reason.clone(),
            created_at: now,
        };
        tx.insert_status_history(&history).await?;

        events.insert(
            0,
            DomainEvent::OrderStatusChanged(OrderStatusChanged {
                event_id: format!("order.status.changed:{}", history.id),
                order_id: order.id,
                order_number: order.order_number.clone(),
                previous_status: from,
                new_status: to,
                actor_id: request.actor.id,
                actor_role: request.actor.role,
                reason: request.reason.clone(),
                timestamp: now,
            }),
        );

        Ok(TransitionOutcome {
            order,
            history,
            delivery,
            events,
        })
    }

    /// Orders outside the actor's reach look the same as missing ones
    async fn ensure_visible(
        &self,
        tx: &mut dyn StoreTx,
        order: &Order,
        request: &TransitionRequest,
    ) -> EngineResult<()> {
        let actor = request.actor;
        let visible = match actor.role {
            Role::Admin => true,
            Role::Customer => order.customer_id == actor.id,
            Role::Supplier => tx
                .find_order_items(order.id)
                .await?
                .iter()
                .any(|item| item.supplier_id == actor.id),
            Role::Driver => match tx.find_delivery_by_order(order.id).await? {
                Some(d) => match d.driver_id {
                    Some(driver_id) => driver_id == actor.id,
                    // an unassigned delivery can be picked up
                    None => request.to == OutForDelivery,
                },
                None => false,
            },
        };

        if visible {
            Ok(())
        } else {
            debug!("Order {} is not visible to {} {}", order.id, actor.role, actor.id);
            Err(EngineError::not_found("Order", order.id))
        }
    }
}

/// Inventory records whose active holds no longer cover the order's items
///
/// Released holds from an earlier attempt are ignored; only quantity held
/// right now counts.
fn uncovered_records(items: &[OrderItem], reservations: &[Reservation]) -> Vec<Uuid> {
    let mut needed: BTreeMap<Uuid, i64> = BTreeMap::new();
    for item in items {
        *needed.entry(item.inventory_record_id).or_default() += i64::from(item.quantity);
    }
    for hold in reservations {
        if hold.status == ReservationStatus::Active {
            if let Some(quantity) = needed.get_mut(&hold.inventory_record_id) {
                *quantity -= i64::from(hold.quantity);
            }
        }
    }
    needed
        .into_iter()
        .filter(|(_, missing)| *missing > 0)
        .map(|(record, _)| record)
        .collect()
}

fn require_delivery(delivery: Option<Delivery>, order_id: Uuid) -> EngineResult<Delivery> {
    delivery.ok_or_else(|| EngineError::Internal(format!("order {} has no delivery record", order_id)))
}

fn lead_time(lead: Duration) -> EngineResult<chrono::Duration> {
    chrono::Duration::from_std(lead)
        .map_err(|_| EngineError::Internal("preparation lead time is out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ROLES: [Role; 4] = [Role::Customer, Role::Supplier, Role::Driver, Role::Admin];

    fn item(record: Uuid, quantity: i32) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            order_id: Uuid::nil(),
            supplier_id: Uuid::nil(),
            inventory_record_id: record,
            gas_type_id: Uuid::nil(),
            cylinder_size: "6kg".to_string(),
            quantity,
            unit_price: rust_decimal::Decimal::ONE,
            original_price: rust_decimal::Decimal::ONE,
            discount_amount: rust_decimal::Decimal::ZERO,
            total_price: rust_decimal::Decimal::from(quantity),
            pricing_rule_id: None,
            created_at: Utc::now(),
        }
    }

    fn hold(record: Uuid, quantity: i32, status: ReservationStatus) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: Uuid::new_v4(),
            inventory_record_id: record,
            order_id: Some(Uuid::nil()),
            quantity,
            status,
            release_reason: None,
            expires_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_released_holds_from_an_earlier_attempt_are_ignored() {
        let record = Uuid::new_v4();
        let items = [item(record, 2)];
        let holds = [
            hold(record, 2, ReservationStatus::Released),
            hold(record, 2, ReservationStatus::Active),
        ];
        assert!(uncovered_records(&items, &holds).is_empty());
    }

    #[test]
    fn test_expired_or_missing_holds_leave_items_uncovered() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let items = [item(a, 2), item(a, 1), item(b, 4)];

        let holds = [
            hold(a, 2, ReservationStatus::Active),
            hold(a, 1, ReservationStatus::Expired),
            hold(b, 4, ReservationStatus::Active),
        ];
        assert_eq!(uncovered_records(&items, &holds), vec![a]);

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(uncovered_records(&items, &[]), expected);
    }

    #[test]
    fn test_table_entries() {
        assert_eq!(allowed_roles(Pending, Confirmed), &[Role::Supplier, Role::Admin]);
        assert_eq!(
            allowed_roles(Pending, Cancelled),
            &[Role::Customer, Role::Supplier, Role::Admin]
        );
        assert_eq!(allowed_roles(Confirmed, Preparing), &[Role::Supplier, Role::Admin]);
        assert_eq!(
            allowed_roles(Preparing, OutForDelivery),
            &[Role::Supplier, Role::Driver, Role::Admin]
        );
        assert_eq!(allowed_roles(OutForDelivery, Delivered), &[Role::Driver, Role::Admin]);
        assert_eq!(allowed_roles(OutForDelivery, Failed), &[Role::Driver, Role::Admin]);
        assert_eq!(allowed_roles(Failed, Pending), &[Role::Admin]);
        assert_eq!(allowed_roles(Failed, Cancelled), &[Role::Admin]);
    }

    #[test]
    fn test_customer_cannot_confirm() {
        let err = check_transition(Pending, Confirmed, Role::Customer).unwrap_err();
        match err {
            EngineError::Validation { message, .. } => {
                assert!(message.contains("customer"));
                assert!(message.contains("pending"));
                assert!(message.contains("confirmed"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for to in OrderStatus::ALL {
            assert!(allowed_roles(Delivered, to).is_empty());
            assert!(allowed_roles(Cancelled, to).is_empty());
        }
    }

    #[test]
    fn test_same_status_is_rejected() {
        for status in OrderStatus::ALL {
            for role in ROLES {
                assert!(check_transition(status, status, role).is_err());
            }
        }
    }

    #[test]
    fn test_delivered_to_pending_fails_for_every_role() {
        for role in ROLES {
            assert!(matches!(
                check_transition(Delivered, Pending, role),
                Err(EngineError::Validation { .. })
            ));
        }
    }

    fn status_strategy() -> impl Strategy<Value = OrderStatus> {
        prop::sample::select(OrderStatus::ALL.to_vec())
    }

    fn role_strategy() -> impl Strategy<Value = Role> {
        prop::sample::select(ROLES.to_vec())
    }

    proptest! {
        #[test]
        fn prop_check_agrees_with_table(from in status_strategy(), to in status_strategy(), role in role_strategy()) {
            let allowed = allowed_roles(from, to).contains(&role);
            prop_assert_eq!(check_transition(from, to, role).is_ok(), allowed);
        }

        #[test]
        fn prop_admin_can_do_every_existing_transition(from in status_strategy(), to in status_strategy()) {
            if !allowed_roles(from, to).is_empty() {
                prop_assert!(allowed_roles(from, to).contains(&Role::Admin));
            }
        }
    }
}
