// Gas cylinder order and inventory engine

pub mod auth;
pub mod collaborators;
pub mod config;
pub mod db;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod events;
pub mod geo;
pub mod inventory;
pub mod orders;
pub mod pricing;
pub mod query;
pub mod store;
pub mod suppliers;
pub mod validation;

use axum::{
    extract::FromRef,
    routing::{delete, get, patch, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::IdentityProvider;
use crate::engine::Engine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl FromRef<AppState> for Arc<dyn IdentityProvider> {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Creates and configures the application router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/orders",
            post(orders::handlers::create_order_handler).get(orders::handlers::list_orders_handler),
        )
        .route("/api/orders/:order_id", get(orders::handlers::get_order_handler))
        .route(
            "/api/orders/:order_id/status",
            patch(orders::handlers::update_order_status_handler),
        )
        .route(
            "/api/deliveries/:order_id/location",
            post(delivery::handlers::update_location_handler),
        )
        .route(
            "/api/inventory/reservations",
            post(inventory::handlers::reserve_handler),
        )
        .route(
            "/api/inventory/reservations/:reservation_id",
            delete(inventory::handlers::release_handler),
        )
        .route(
            "/api/inventory/availability",
            post(inventory::handlers::availability_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;
