use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::auth::{AuthUser, Role};
use crate::delivery::models::{DeliveryStatus, LocationUpdateRequest};
use crate::error::EngineError;
use crate::geo::{estimate_minutes, haversine_km, Coordinates};
use crate::inventory::models::ReservationStatus;
use crate::orders::models::{OrderStatus, OrderType, UpdateStatusRequest};
use crate::testing::{line, order_request, user, TestWorld, HOME};

/// An order for 2 x 6kg already handed to `driver`
async fn out_for_delivery(world: &TestWorld, driver: &AuthUser) -> (Uuid, Uuid) {
    let supplier_id = world.add_supplier("Acme", 4.0, Some((6.60, 3.35))).await;
    let record = world.add_stock(supplier_id, "6kg", 10).await;
    world.add_rule(supplier_id, "6kg", dec!(22.00)).await;
    let supplier = AuthUser {
        id: supplier_id,
        role: Role::Supplier,
        customer_type: None,
    };

    let customer = user(Role::Customer);
    let address = world.add_address(&customer, Some(HOME));
    let order = world
        .engine
        .orders
        .create_order(
            &customer,
            "token",
            order_request(address, vec![line(world.lpg, "6kg", 2)], OrderType::Regular),
        )
        .await
        .unwrap()
        .order;

    for (actor, status) in [
        (&supplier, OrderStatus::Confirmed),
        (&supplier, OrderStatus::Preparing),
        (driver, OrderStatus::OutForDelivery),
    ] {
        world
            .engine
            .orders
            .update_status(
                order.id,
                actor,
                UpdateStatusRequest {
                    status,
                    reason: None,
                    driver_id: None,
                },
            )
            .await
            .unwrap();
    }

    (order.id, record)
}

fn report(latitude: f64, longitude: f64, status: Option<DeliveryStatus>) -> LocationUpdateRequest {
    LocationUpdateRequest {
        latitude,
        longitude,
        status,
        notes: None,
    }
}

#[tokio::test]
async fn test_position_report_updates_delivery_and_estimates_eta() {
    let world = TestWorld::new().await;
    let driver = user(Role::Driver);
    let (order_id, _) = out_for_delivery(&world, &driver).await;
    let before = world.events.published().len();

    let (lat, lon) = (6.60, 3.40);
    let update = world
        .engine
        .tracker
        .update_location(order_id, driver.id, report(lat, lon, None))
        .await
        .unwrap();

    assert_eq!(update.delivery.current_latitude, Some(lat));
    assert_eq!(update.delivery.status, DeliveryStatus::InTransit);

    let distance = haversine_km(Coordinates::new(lat, lon), Coordinates::new(HOME.0, HOME.1));
    let eta = update.eta.unwrap();
    assert!((eta.distance_km - distance).abs() < 1e-9);
    assert_eq!(eta.estimated_minutes, estimate_minutes(distance, 30.0));

    let state = world.store.snapshot().await;
    assert_eq!(state.tracking.len(), 1);
    assert_eq!(state.tracking[0].driver_id, driver.id);

    let published = world.events.published();
    assert_eq!(published.len(), before + 1);
    let event = published.last().unwrap();
    assert_eq!(event.routing_key(), "delivery.location_updated");
    assert_eq!(
        event.event_id(),
        format!("delivery.location_updated:{}", state.tracking[0].id)
    );

    let (channel, payload) = world.events.broadcasts().pop().unwrap();
    assert_eq!(channel, format!("order:{}", order_id));
    assert_eq!(payload["estimatedMinutes"], eta.estimated_minutes);
}

#[tokio::test]
async fn test_report_at_destination_has_zero_eta() {
    let world = TestWorld::new().await;
    let driver = user(Role::Driver);
    let (order_id, _) = out_for_delivery(&world, &driver).await;

    let update = world
        .engine
        .tracker
        .update_location(order_id, driver.id, report(HOME.0, HOME.1, None))
        .await
        .unwrap();
    assert_eq!(update.eta.unwrap().estimated_minutes, 0);
}

#[tokio::test]
async fn test_coordinates_out_of_range_are_rejected() {
    let world = TestWorld::new().await;
    let driver = user(Role::Driver);
    let (order_id, _) = out_for_delivery(&world, &driver).await;

    for (lat, lon) in [(91.0, 0.0), (0.0, 181.0), (f64::NAN, 0.0)] {
        let err = world
            .engine
            .tracker
            .update_location(order_id, driver.id, report(lat, lon, None))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }
    assert!(world.store.snapshot().await.tracking.is_empty());
}

#[tokio::test]
async fn test_other_drivers_cannot_report() {
    let world = TestWorld::new().await;
    let driver = user(Role::Driver);
    let (order_id, _) = out_for_delivery(&world, &driver).await;

    let err = world
        .engine
        .tracker
        .update_location(order_id, Uuid::new_v4(), report(6.6, 3.4, None))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));

    let err = world
        .engine
        .tracker
        .update_location(Uuid::new_v4(), driver.id, report(6.6, 3.4, None))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn test_drivers_cannot_reassign() {
    let world = TestWorld::new().await;
    let driver = user(Role::Driver);
    let (order_id, _) = out_for_delivery(&world, &driver).await;

    let err = world
        .engine
        .tracker
        .update_location(order_id, driver.id, report(6.6, 3.4, Some(DeliveryStatus::Assigned)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
}

#[tokio::test]
async fn test_delivered_report_completes_the_order() {
    let world = TestWorld::new().await;
    let driver = user(Role::Driver);
    let (order_id, record) = out_for_delivery(&world, &driver).await;

    let update = world
        .engine
        .tracker
        .update_location(
            order_id,
            driver.id,
            report(HOME.0, HOME.1, Some(DeliveryStatus::Delivered)),
        )
        .await
        .unwrap();

    assert_eq!(update.delivery.status, DeliveryStatus::Delivered);
    assert!(update.delivery.actual_arrival.is_some());

    let order = world.store.order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
    assert_eq!(world.free(record).await, (8, 0));

    let state = world.store.snapshot().await;
    assert!(state
        .reservations
        .values()
        .filter(|r| r.order_id == Some(order_id))
        .all(|r| r.status == ReservationStatus::Consumed));

    let keys = world.events.routing_keys();
    assert!(keys.ends_with(&["delivery.location_updated", "order.status.changed"]));

    // closed deliveries take no more reports
    let err = world
        .engine
        .tracker
        .update_location(order_id, driver.id, report(HOME.0, HOME.1, None))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
}

#[tokio::test]
async fn test_failed_report_fails_the_order_and_frees_stock() {
    let world = TestWorld::new().await;
    let driver = user(Role::Driver);
    let (order_id, record) = out_for_delivery(&world, &driver).await;

    let request = LocationUpdateRequest {
        notes: Some("gate locked".to_string()),
        ..report(6.55, 3.38, Some(DeliveryStatus::Failed))
    };
    let update = world
        .engine
        .tracker
        .update_location(order_id, driver.id, request)
        .await
        .unwrap();

    assert_eq!(update.delivery.status, DeliveryStatus::Failed);
    let order = world.store.order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(order.cancellation_reason.as_deref(), Some("gate locked"));
    assert_eq!(world.free(record).await, (10, 0));
}
