// Inventory ledger module
// Stock counts, reservations, and the background reaper

pub mod handlers;
pub mod ledger;
pub mod models;
pub mod reaper;


pub use ledger::{Hold, InventoryLedger};
pub use models::{InventoryRecord, Reservation, ReservationStatus, Sku};
pub use reaper::spawn_reaper;
