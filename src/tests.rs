// Router tests: authentication, role gates and error bodies over HTTP

use super::*;
use axum::http::{header, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::{AuthUser, JwtIdentityProvider, Role};
use crate::testing::{user, TestWorld, HOME};

const SECRET: &str = "router-test-secret";

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    world: TestWorld,
    server: TestServer,
    jwt: JwtIdentityProvider,
}

async fn harness() -> Harness {
    let world = TestWorld::new().await;
    let state = AppState {
        engine: world.engine.clone(),
        identity: Arc::new(JwtIdentityProvider::new(SECRET)),
    };
    let server = TestServer::new(create_router(state)).unwrap();

    Harness {
        world,
        server,
        jwt: JwtIdentityProvider::new(SECRET),
    }
}

impl Harness {
    fn as_user(&self, request: TestRequest, user: &AuthUser) -> TestRequest {
        let token = self.jwt.issue(user, 3600).unwrap();
        request.add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        )
    }

    /// Supplier with 5 x 12.5kg priced at 40.00
    async fn stocked_supplier(&self) -> (AuthUser, Uuid) {
        let id = self.world.add_supplier("Acme Gas", 4.5, None).await;
        let record = self.world.add_stock(id, "12.5kg", 5).await;
        self.world.add_rule(id, "12.5kg", dec!(40.00)).await;
        let supplier = AuthUser {
            id,
            role: Role::Supplier,
            customer_type: None,
        };
        (supplier, record)
    }

    fn order_payload(&self, address: Uuid, quantity: i32) -> Value {
        json!({
            "delivery_address_id": address,
            "order_type": "regular",
            "items": [
                { "gas_type_id": self.world.lpg, "cylinder_size": "12.5kg", "quantity": quantity }
            ]
        })
    }
}

fn decimal(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

// ============================================================================
// Health and authentication
// ============================================================================

#[tokio::test]
async fn test_health_needs_no_token() {
    let h = harness().await;
    let response = h.server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn test_missing_or_forged_token_is_unauthorized() {
    let h = harness().await;

    let response = h.server.get("/api/orders").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error_code"], "UNAUTHORIZED");

    let forged = JwtIdentityProvider::new("some-other-secret")
        .issue(&user(Role::Admin), 3600)
        .unwrap();
    let response = h
        .server
        .get("/api/orders")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", forged)).unwrap(),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Orders
// ============================================================================

#[tokio::test]
async fn test_create_order_returns_created_details() {
    let h = harness().await;
    h.stocked_supplier().await;
    let customer = user(Role::Customer);
    let address = h.world.add_address(&customer, Some(HOME));

    let response = h
        .as_user(h.server.post("/api/orders"), &customer)
        .json(&h.order_payload(address, 2))
        .await;

    let status = response.status_code();
    if status != StatusCode::CREATED {
        eprintln!("Response body: {}", response.text());
        panic!("Expected 201 CREATED, got {}", status);
    }

    let body: Value = response.json();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["customer_id"], json!(customer.id));
    assert_eq!(decimal(&body["total_amount"]), dec!(96.00));
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["status_history"].as_array().unwrap().len(), 1);
    assert!(body["delivery"].is_null());
}

#[tokio::test]
async fn test_only_customers_place_orders() {
    let h = harness().await;
    h.stocked_supplier().await;
    let customer = user(Role::Customer);
    let address = h.world.add_address(&customer, Some(HOME));

    let response = h
        .as_user(h.server.post("/api/orders"), &user(Role::Driver))
        .json(&h.order_payload(address, 1))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_order_body_is_bad_request() {
    let h = harness().await;
    let customer = user(Role::Customer);
    let address = h.world.add_address(&customer, Some(HOME));

    let response = h
        .as_user(h.server.post("/api/orders"), &customer)
        .json(&h.order_payload(address, 0))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_shortfall_is_unprocessable_with_items() {
    let h = harness().await;
    let (_, record) = h.stocked_supplier().await;
    let customer = user(Role::Customer);
    let address = h.world.add_address(&customer, Some(HOME));

    let response = h
        .as_user(h.server.post("/api/orders"), &customer)
        .json(&h.order_payload(address, 9))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["error_code"], "BUSINESS_LOGIC_ERROR");
    assert_eq!(body["details"]["unavailable_items"][0]["requested"], 9);
    assert_eq!(h.world.free(record).await, (5, 0));
}

#[tokio::test]
async fn test_status_flow_over_http() {
    let h = harness().await;
    let (supplier, record) = h.stocked_supplier().await;
    let customer = user(Role::Customer);
    let driver = user(Role::Driver);
    let address = h.world.add_address(&customer, Some(HOME));

    let created: Value = h
        .as_user(h.server.post("/api/orders"), &customer)
        .json(&h.order_payload(address, 2))
        .await
        .json();
    let order_id = created["id"].as_str().unwrap().to_string();
    let status_path = format!("/api/orders/{}/status", order_id);

    // customers cannot confirm
    let response = h
        .as_user(h.server.patch(&status_path), &customer)
        .json(&json!({ "status": "confirmed" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = h
        .as_user(h.server.patch(&status_path), &supplier)
        .json(&json!({ "status": "confirmed" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["order"]["status"], "confirmed");
    assert_eq!(body["history"]["previous_status"], "pending");
    assert_eq!(body["delivery"]["status"], "assigned");

    for (actor, status) in [(&supplier, "preparing"), (&driver, "out_for_delivery")] {
        let response = h
            .as_user(h.server.patch(&status_path), actor)
            .json(&json!({ "status": status }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK, "moving to {}", status);
    }

    let response = h
        .as_user(
            h.server.post(&format!("/api/deliveries/{}/location", order_id)),
            &driver,
        )
        .json(&json!({ "latitude": HOME.0, "longitude": HOME.1, "status": "delivered" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["delivery"]["status"], "delivered");
    assert_eq!(body["eta"]["estimated_minutes"], 0);

    let details: Value = h
        .as_user(h.server.get(&format!("/api/orders/{}", order_id)), &customer)
        .await
        .json();
    assert_eq!(details["status"], "delivered");
    assert_eq!(details["status_history"].as_array().unwrap().len(), 5);
    assert_eq!(h.world.free(record).await, (3, 0));
}

#[tokio::test]
async fn test_foreign_orders_are_not_found() {
    let h = harness().await;
    h.stocked_supplier().await;
    let customer = user(Role::Customer);
    let address = h.world.add_address(&customer, Some(HOME));

    let created: Value = h
        .as_user(h.server.post("/api/orders"), &customer)
        .json(&h.order_payload(address, 1))
        .await
        .json();
    let path = format!("/api/orders/{}", created["id"].as_str().unwrap());

    let response = h.as_user(h.server.get(&path), &user(Role::Customer)).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error_code"], "NOT_FOUND");

    let response = h.as_user(h.server.get(&path), &user(Role::Admin)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_list_rejects_bad_filters() {
    let h = harness().await;
    let response = h
        .as_user(
            h.server.get("/api/orders").add_query_param("status", "lost"),
            &user(Role::Admin),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = h
        .as_user(
            h.server
                .get("/api/orders")
                .add_query_param("page", 1)
                .add_query_param("limit", 10),
            &user(Role::Admin),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["limit"], 10);
    assert!(body["orders"].as_array().unwrap().is_empty());
}

// ============================================================================
// Inventory
// ============================================================================

#[tokio::test]
async fn test_reserve_and_release_over_http() {
    let h = harness().await;
    let (supplier, record) = h.stocked_supplier().await;

    let response = h
        .as_user(h.server.post("/api/inventory/reservations"), &supplier)
        .json(&json!({
            "supplier_id": supplier.id,
            "gas_type_id": h.world.lpg,
            "cylinder_size": "12.5KG",
            "quantity": 3
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let reservation: Value = response.json();
    assert_eq!(reservation["status"], "active");
    assert_eq!(h.world.free(record).await, (5, 3));

    let path = format!(
        "/api/inventory/reservations/{}",
        reservation["id"].as_str().unwrap()
    );
    let first: Value = h.as_user(h.server.delete(&path), &supplier).await.json();
    assert_eq!(first["released"], true);
    assert_eq!(first["quantity"], 3);

    let second: Value = h.as_user(h.server.delete(&path), &supplier).await.json();
    assert_eq!(second["released"], false);
    assert_eq!(h.world.free(record).await, (5, 0));
}

#[tokio::test]
async fn test_suppliers_only_touch_their_own_stock() {
    let h = harness().await;
    let (owner, _) = h.stocked_supplier().await;
    let rival = user(Role::Supplier);

    let response = h
        .as_user(h.server.post("/api/inventory/reservations"), &rival)
        .json(&json!({
            "supplier_id": owner.id,
            "gas_type_id": h.world.lpg,
            "cylinder_size": "12.5kg",
            "quantity": 1
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let reservation: Value = h
        .as_user(h.server.post("/api/inventory/reservations"), &owner)
        .json(&json!({
            "supplier_id": owner.id,
            "gas_type_id": h.world.lpg,
            "cylinder_size": "12.5kg",
            "quantity": 1
        }))
        .await
        .json();
    let path = format!(
        "/api/inventory/reservations/{}",
        reservation["id"].as_str().unwrap()
    );
    let response = h.as_user(h.server.delete(&path), &rival).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reserving_too_much_is_unprocessable() {
    let h = harness().await;
    let (supplier, _) = h.stocked_supplier().await;

    let response = h
        .as_user(h.server.post("/api/inventory/reservations"), &user(Role::Admin))
        .json(&json!({
            "supplier_id": supplier.id,
            "gas_type_id": h.world.lpg,
            "cylinder_size": "12.5kg",
            "quantity": 6
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["details"]["available"], 5);
}

#[tokio::test]
async fn test_availability_reports_ledger_stock() {
    let h = harness().await;
    let (supplier, _) = h.stocked_supplier().await;

    let response = h
        .as_user(h.server.post("/api/inventory/availability"), &user(Role::Customer))
        .json(&json!({
            "supplier_id": supplier.id,
            "items": [
                { "gasTypeId": h.world.lpg, "cylinderSize": "12.5kg", "quantity": 4 }
            ]
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let views: Value = response.json();
    assert_eq!(views[0]["available"], true);
    assert_eq!(views[0]["quantity_available"], 5);
    assert_eq!(views[0]["source"], "ledger");
}
