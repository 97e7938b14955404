// Supplier catalog models and selection

pub mod models;
pub mod selector;

pub use models::{GasType, Supplier, SupplierOffer, SupplierStock};
pub use selector::SupplierSelector;
