// Process and engine configuration
// Read from the environment (optionally seeded from a .env file)

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Weights of the routine-order supplier score
///
/// `score = rating*rating_weight + (reference - distance)*distance_weight
///        + (reference - price_rank)*price_weight`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionWeights {
    pub rating: f64,
    pub distance: f64,
    pub price_rank: f64,
    pub reference: f64,
}

impl Default for SelectionWeights {
    fn default() -> Self {
        Self {
            rating: 0.4,
            distance: 0.3,
            price_rank: 0.3,
            reference: 100.0,
        }
    }
}

/// Delivery fee schedule
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryFeeSchedule {
    pub minimum_fee: Decimal,
    pub per_km_rate: Decimal,
    pub emergency_multiplier: Decimal,
    /// Charged when either end of the trip has no coordinates
    pub default_fee: Decimal,
}

impl Default for DeliveryFeeSchedule {
    fn default() -> Self {
        Self {
            minimum_fee: Decimal::new(500, 2),
            per_km_rate: Decimal::new(50, 2),
            emergency_multiplier: Decimal::new(15, 1),
            default_fee: Decimal::new(1000, 2),
        }
    }
}

/// Last-resort unit prices keyed by cylinder size only
#[derive(Debug, Clone, PartialEq)]
pub struct StaticPriceTable {
    pub by_size: HashMap<String, Decimal>,
    pub fallback: Decimal,
}

impl StaticPriceTable {
    pub fn price_for(&self, cylinder_size: &str) -> Decimal {
        let key = cylinder_size.trim().to_lowercase();
        self.by_size.get(&key).copied().unwrap_or(self.fallback)
    }
}

impl Default for StaticPriceTable {
    fn default() -> Self {
        let by_size = [
            ("3kg", Decimal::new(1200, 2)),
            ("6kg", Decimal::new(2200, 2)),
            ("12.5kg", Decimal::new(4000, 2)),
            ("25kg", Decimal::new(7500, 2)),
            ("50kg", Decimal::new(14000, 2)),
        ]
        .into_iter()
        .map(|(size, price)| (size.to_string(), price))
        .collect();

        Self {
            by_size,
            fallback: Decimal::new(4000, 2),
        }
    }
}

/// Business constants of the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub currency: String,
    /// Fraction, e.g. 0.075 for 7.5 %
    pub tax_rate: Decimal,
    /// Percentage of the item subtotal, e.g. 25 for 25 %
    pub emergency_surcharge_percent: Decimal,
    pub delivery_fees: DeliveryFeeSchedule,
    pub reservation_ttl: Duration,
    pub reaper_interval: Duration,
    pub reaper_batch_size: i64,
    /// Lead time added to "now" when an order enters `preparing`
    pub preparation_lead_time: Duration,
    /// Heuristic driver speed used for ETA; not a routing engine
    pub average_speed_kmh: f64,
    pub selection: SelectionWeights,
    pub static_prices: StaticPriceTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            tax_rate: Decimal::new(75, 3),
            emergency_surcharge_percent: Decimal::from(25),
            delivery_fees: DeliveryFeeSchedule::default(),
            reservation_ttl: Duration::from_secs(30 * 60),
            reaper_interval: Duration::from_secs(60),
            reaper_batch_size: 100,
            preparation_lead_time: Duration::from_secs(60 * 60),
            average_speed_kmh: 30.0,
            selection: SelectionWeights::default(),
            static_prices: StaticPriceTable::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by any engine variables present in the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            currency: std::env::var("CURRENCY").unwrap_or(defaults.currency),
            tax_rate: env_or("TAX_RATE", defaults.tax_rate)?,
            emergency_surcharge_percent: env_or(
                "EMERGENCY_SURCHARGE_PERCENT",
                defaults.emergency_surcharge_percent,
            )?,
            delivery_fees: DeliveryFeeSchedule {
                minimum_fee: env_or("DELIVERY_MINIMUM_FEE", defaults.delivery_fees.minimum_fee)?,
                per_km_rate: env_or("DELIVERY_PER_KM_RATE", defaults.delivery_fees.per_km_rate)?,
                emergency_multiplier: env_or(
                    "DELIVERY_EMERGENCY_MULTIPLIER",
                    defaults.delivery_fees.emergency_multiplier,
                )?,
                default_fee: env_or("DELIVERY_DEFAULT_FEE", defaults.delivery_fees.default_fee)?,
            },
            reservation_ttl: Duration::from_secs(env_or(
                "RESERVATION_TTL_SECONDS",
                defaults.reservation_ttl.as_secs(),
            )?),
            reaper_interval: Duration::from_secs(env_or(
                "REAPER_INTERVAL_SECONDS",
                defaults.reaper_interval.as_secs(),
            )?),
            reaper_batch_size: env_or("REAPER_BATCH_SIZE", defaults.reaper_batch_size)?,
            preparation_lead_time: Duration::from_secs(
                env_or::<u64>("PREPARATION_LEAD_MINUTES", defaults.preparation_lead_time.as_secs() / 60)? * 60,
            ),
            average_speed_kmh: env_or("AVERAGE_SPEED_KMH", defaults.average_speed_kmh)?,
            selection: defaults.selection,
            static_prices: defaults.static_prices,
        })
    }
}

/// Process-level settings owned by the binary
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub supplier_service_url: Option<String>,
    pub address_service_url: Option<String>,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 10)?,
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 8080)?,
            redis_url: optional("REDIS_URL"),
            jwt_secret: required("JWT_SECRET")?,
            supplier_service_url: optional("SUPPLIER_SERVICE_URL"),
            address_service_url: optional("ADDRESS_SERVICE_URL"),
            engine: EngineConfig::from_env()?,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}
