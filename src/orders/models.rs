use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::auth::Role;
use crate::delivery::models::Delivery;
use crate::geo::Coordinates;

/// Order status enum representing the lifecycle of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    OutForDelivery,
    Delivered,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Failed,
        OrderStatus::Cancelled,
    ];

    /// Convert status to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// No transition leaves these
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| format!("Invalid order status: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Regular,
    Emergency,
    Recurring,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Regular => "regular",
            OrderType::Emergency => "emergency",
            OrderType::Recurring => "recurring",
        }
    }
}

impl Default for OrderType {
    fn default() -> Self {
        OrderType::Regular
    }
}

impl std::str::FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "regular" => Ok(OrderType::Regular),
            "emergency" => Ok(OrderType::Emergency),
            "recurring" => Ok(OrderType::Recurring),
            _ => Err(format!("Invalid order type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderPriority {
    Normal,
    Urgent,
}

/// Domain model representing an order in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub customer_role: Role,
    pub delivery_address_id: Uuid,
    pub order_type: OrderType,
    pub priority: OrderPriority,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub delivery_fee: Decimal,
    pub emergency_surcharge: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub special_instructions: Option<String>,
    pub scheduled_delivery_date: Option<DateTime<Utc>>,
    /// Destination snapshot taken at creation
    pub delivery_latitude: Option<f64>,
    pub delivery_longitude: Option<f64>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_emergency(&self) -> bool {
        self.order_type == OrderType::Emergency
    }

    pub fn destination(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.delivery_latitude, self.delivery_longitude)
    }
}

/// Domain model representing an item within an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub supplier_id: Uuid,
    pub inventory_record_id: Uuid,
    pub gas_type_id: Uuid,
    pub cylinder_size: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Pre-discount unit price
    pub original_price: Decimal,
    /// Per-unit discount
    pub discount_amount: Decimal,
    pub total_price: Decimal,
    pub pricing_rule_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrderStatusHistory {
    pub id: Uuid,
    pub order_id: Uuid,
    pub previous_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub changed_by: Uuid,
    pub changed_by_role: Role,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request DTO for one order line
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderItemRequest {
    pub gas_type_id: Uuid,
    #[validate(custom = "crate::validation::validate_cylinder_size")]
    pub cylinder_size: String,
    #[validate(range(min = 1, max = 1000, message = "Quantity must be between 1 and 1000"))]
    pub quantity: i32,
}

/// Request DTO for creating a new order
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub delivery_address_id: Uuid,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    #[serde(default)]
    pub order_type: OrderType,
    #[validate(length(max = 1000, message = "Special instructions must be at most 1000 characters"))]
    pub special_instructions: Option<String>,
    pub scheduled_delivery_date: Option<DateTime<Utc>>,
}

/// Request DTO for a status transition
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
    /// Driver taking the delivery on `out_for_delivery`
    pub driver_id: Option<Uuid>,
}

/// Order with its lines, audit trail and delivery
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub status_history: Vec<OrderStatusHistory>,
    pub delivery: Option<Delivery>,
}

#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub page: u32,
    pub limit: u32,
}
