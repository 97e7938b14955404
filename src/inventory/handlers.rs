// HTTP handlers for standalone reservations

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AuthenticatedUser, Role};
use crate::error::EngineError;
use crate::inventory::models::{
    AvailabilityRequest, ItemAvailabilityView, ReleaseOutcome, ReleaseRequest, ReservationResponse,
    ReserveRequest, Sku,
};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub reservation_id: Uuid,
    pub released: bool,
    pub quantity: i32,
}

/// Suppliers act on their own stock only
fn supplier_scope(user: &AuthenticatedUser) -> Option<Uuid> {
    (user.role() == Role::Supplier).then(|| user.id())
}

/// Handler for POST /api/inventory/reservations
pub async fn reserve_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), EngineError> {
    user.require_any(&[Role::Supplier, Role::Admin])?;
    request.validate()?;

    if let Some(supplier_id) = supplier_scope(&user) {
        if supplier_id != request.supplier_id {
            return Err(EngineError::Unauthorized(
                "suppliers may only reserve their own stock".to_string(),
            ));
        }
    }

    let sku = Sku::new(request.supplier_id, request.gas_type_id, request.cylinder_size.as_str());
    let reservation = state
        .engine
        .ledger
        .reserve(
            &sku,
            request.quantity,
            request.order_id,
            request.ttl_seconds.map(Duration::from_secs),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(reservation.into())))
}

/// Handler for DELETE /api/inventory/reservations/:reservation_id
/// Releasing twice answers 200 with `released: false`
pub async fn release_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(reservation_id): Path<Uuid>,
    request: Option<Json<ReleaseRequest>>,
) -> Result<Json<ReleaseResponse>, EngineError> {
    user.require_any(&[Role::Supplier, Role::Admin])?;

    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;
    let reason = request
        .reason
        .unwrap_or_else(|| format!("released by {}", user.role()));

    let outcome = state
        .engine
        .ledger
        .release(reservation_id, &reason, supplier_scope(&user))
        .await?;

    let (released, quantity) = match outcome {
        ReleaseOutcome::Released { quantity } => (true, quantity),
        ReleaseOutcome::AlreadyReleased => (false, 0),
    };
    Ok(Json(ReleaseResponse {
        reservation_id,
        released,
        quantity,
    }))
}

/// Handler for POST /api/inventory/availability
pub async fn availability_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<AvailabilityRequest>,
) -> Result<Json<Vec<ItemAvailabilityView>>, EngineError> {
    request.validate()?;

    let views = state
        .engine
        .ledger
        .check_availability(request.supplier_id, &request.items, &user.token)
        .await?;

    Ok(Json(views))
}
