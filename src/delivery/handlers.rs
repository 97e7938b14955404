// HTTP handlers for delivery tracking

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, Role};
use crate::delivery::models::{LocationUpdate, LocationUpdateRequest};
use crate::error::EngineError;
use crate::AppState;

/// Handler for POST /api/deliveries/:order_id/location
/// Driver position report
pub async fn update_location_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<LocationUpdateRequest>,
) -> Result<Json<LocationUpdate>, EngineError> {
    user.require_any(&[Role::Driver])?;

    let update = state
        .engine
        .tracker
        .update_location(order_id, user.id(), request)
        .await?;

    Ok(Json(update))
}
