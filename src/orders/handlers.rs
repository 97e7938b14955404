// HTTP handlers for order endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, Role};
use crate::delivery::models::Delivery;
use crate::error::EngineError;
use crate::orders::models::{
    CreateOrderRequest, Order, OrderDetails, OrderPage, OrderStatusHistory, UpdateStatusRequest,
};
use crate::query::{OrderListParams, QueryValidator};
use crate::AppState;

/// Body returned after a status change
#[derive(Debug, Serialize)]
pub struct StatusUpdateResponse {
    pub order: Order,
    pub history: OrderStatusHistory,
    pub delivery: Option<Delivery>,
}

/// Handler for POST /api/orders
/// Creates a new order for the authenticated customer
pub async fn create_order_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderDetails>), EngineError> {
    user.require_any(&[Role::Customer])?;

    let details = state
        .engine
        .orders
        .create_order(&user.user, &user.token, request)
        .await?;

    Ok((StatusCode::CREATED, Json(details)))
}

/// Handler for GET /api/orders
/// Lists orders visible to the caller with optional filters
pub async fn list_orders_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<OrderListParams>,
) -> Result<Json<OrderPage>, EngineError> {
    user.require_any(&[Role::Customer, Role::Supplier, Role::Admin])?;

    let query = QueryValidator::validate(params)?;
    let page = state.engine.orders.list_orders(&user.user, query).await?;

    Ok(Json(page))
}

/// Handler for GET /api/orders/:order_id
pub async fn get_order_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderDetails>, EngineError> {
    // visibility is checked in the service
    let details = state.engine.orders.get_order(order_id, &user.user).await?;
    Ok(Json(details))
}

/// Handler for PATCH /api/orders/:order_id/status
/// Role rules live in the state machine table
pub async fn update_order_status_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<StatusUpdateResponse>, EngineError> {
    let outcome = state
        .engine
        .orders
        .update_status(order_id, &user.user, request)
        .await?;

    Ok(Json(StatusUpdateResponse {
        order: outcome.order,
        history: outcome.history,
        delivery: outcome.delivery,
    }))
}
