// Order orchestration and lifecycle

pub mod handlers;
pub mod models;
pub mod number;
pub mod price_calculator;
pub mod service;
pub mod status_machine;


pub use models::{
    CreateOrderRequest, Order, OrderDetails, OrderItem, OrderItemRequest, OrderStatus,
    OrderStatusHistory, OrderType, UpdateStatusRequest,
};
pub use price_calculator::{OrderTotals, PriceCalculator};
pub use service::OrderService;
pub use status_machine::{Actor, OrderStateMachine, TransitionOutcome, TransitionRequest};
