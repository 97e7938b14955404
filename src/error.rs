// Error handling for the order & inventory engine
// Provides the crate-wide error type and its HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Result alias used across the engine
pub type EngineResult<T> = Result<T, EngineError>;

/// Main error type for the engine
///
/// Every ledger, pricing, selector, orchestrator and state machine operation
/// returns this type. Each variant maps to one HTTP status class.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed or out-of-range input, or an illegal state transition
    /// Maps to HTTP 400 Bad Request
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<JsonValue>,
    },

    /// Missing resource, or one the caller may not see
    /// Maps to HTTP 404 Not Found
    #[error("{resource} with id {id} not found")]
    NotFound { resource: &'static str, id: String },

    /// No supplier or stock available, conflicting pricing rule, expired hold
    /// Maps to HTTP 422 Unprocessable Entity
    #[error("{message}")]
    BusinessLogic {
        message: String,
        details: Option<JsonValue>,
    },

    /// Raised by the ledger when a reservation does not fit
    /// Rendered to callers as a business logic error
    #[error("insufficient inventory on record {inventory_record_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        inventory_record_id: Uuid,
        requested: i32,
        available: i32,
    },

    /// Missing or invalid bearer token
    /// Maps to HTTP 401 Unauthorized
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Database failures; detail is logged, never returned
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Remote collaborator failures
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Broker / real-time push failures
    #[error("event bus error: {0}")]
    EventBus(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
            details: None,
        }
    }

    /// Validation failure pinned to a single request field
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        EngineError::Validation {
            details: Some(serde_json::json!({ "field": field, "reason": message })),
            message,
        }
    }

    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn business(message: impl Into<String>, details: Option<JsonValue>) -> Self {
        EngineError::BusinessLogic {
            message: message.into(),
            details,
        }
    }

    /// Rewrites a ledger shortfall as a business error listing the item
    ///
    /// Other errors pass through unchanged.
    pub fn shortfall_as_business(self, message: &str) -> Self {
        match self {
            EngineError::InsufficientInventory {
                inventory_record_id,
                requested,
                available,
            } => EngineError::business(
                message,
                Some(serde_json::json!({
                    "unavailable_items": [{
                        "inventory_record_id": inventory_record_id,
                        "requested": requested,
                        "available": available,
                    }]
                })),
            ),
            other => other,
        }
    }

    /// True for the 422 class, including ledger shortfalls
    pub fn is_business_logic(&self) -> bool {
        matches!(
            self,
            EngineError::BusinessLogic { .. } | EngineError::InsufficientInventory { .. }
        )
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Validation { .. } => StatusCode::BAD_REQUEST,
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::BusinessLogic { .. } | EngineError::InsufficientInventory { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            EngineError::Database(_)
            | EngineError::Upstream(_)
            | EngineError::EventBus(_)
            | EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to HTTP status and the client-facing body
    ///
    /// Infrastructure failures are logged in full and returned generically.
    fn to_error_response(&self) -> (StatusCode, ErrorResponse) {
        let status = self.status_code();
        let (error_code, message, details) = match self {
            EngineError::Validation { message, details } => {
                debug!("Validation error: {}", message);
                ("VALIDATION_ERROR", message.clone(), details.clone())
            }
            EngineError::NotFound { .. } => {
                debug!("{}", self);
                ("NOT_FOUND", self.to_string(), None)
            }
            EngineError::BusinessLogic { message, details } => {
                warn!("Business rule rejected request: {}", message);
                ("BUSINESS_LOGIC_ERROR", message.clone(), details.clone())
            }
            EngineError::InsufficientInventory {
                inventory_record_id,
                requested,
                available,
            } => {
                warn!("{}", self);
                (
                    "BUSINESS_LOGIC_ERROR",
                    "Insufficient inventory".to_string(),
                    Some(serde_json::json!({
                        "inventory_record_id": inventory_record_id,
                        "requested": requested,
                        "available": available,
                    })),
                )
            }
            EngineError::Unauthorized(reason) => {
                warn!("Unauthorized request: {}", reason);
                ("UNAUTHORIZED", "Authentication required".to_string(), None)
            }
            EngineError::Database(db_error) => {
                error!("Database error: {:?}", db_error);
                ("INTERNAL_ERROR", "An internal error occurred".to_string(), None)
            }
            EngineError::Upstream(msg) | EngineError::EventBus(msg) | EngineError::Internal(msg) => {
                error!("Internal failure: {}", msg);
                ("INTERNAL_ERROR", "An internal error occurred".to_string(), None)
            }
        };

        (
            status,
            ErrorResponse {
                error_code: error_code.to_string(),
                message,
                details,
                timestamp: Utc::now().to_rfc3339(),
            },
        )
    }
}

/// Consistent error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "VALIDATION_ERROR", "NOT_FOUND")
    pub error_code: String,

    /// Human-readable error message
    pub message: String,

    /// Field- or item-level detail; omitted when None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,

    /// ISO 8601 timestamp of when the error occurred
    pub timestamp: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, error_response) = self.to_error_response();
        (status, Json(error_response)).into_response()
    }
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(errors: validator::ValidationErrors) -> Self {
        EngineError::Validation {
            message: "Request validation failed".to_string(),
            details: Some(serde_json::to_value(&errors).unwrap_or(serde_json::json!({}))),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Upstream(err.to_string())
    }
}

impl From<redis::RedisError> for EngineError {
    fn from(err: redis::RedisError) -> Self {
        EngineError::EventBus(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Internal(format!("serialization failed: {}", err))
    }
}
