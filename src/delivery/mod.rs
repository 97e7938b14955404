// Delivery records and driver tracking

pub mod handlers;
pub mod models;
pub mod tracker;

#[cfg(test)]
mod tests;

pub use models::{Delivery, DeliveryStatus, LocationUpdate, LocationUpdateRequest, TrackingEntry};
pub use tracker::DeliveryTracker;
