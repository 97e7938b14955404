// Pricing resolver module

pub mod models;
pub mod resolver;

pub use models::{CustomerClass, PriceQuote, PriceRequest, PriceSource, PricingRule};
pub use resolver::PricingResolver;
