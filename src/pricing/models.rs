use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Customer class used by pricing rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CustomerClass {
    Retail,
    Commercial,
    Industrial,
}

impl CustomerClass {
    /// Maps a raw customer type onto a pricing class
    ///
    /// "household" is priced as retail. Missing or unknown types are retail
    /// too. Called once where a request enters the engine; everything past
    /// that point only sees `CustomerClass`.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("commercial") => CustomerClass::Commercial,
            Some("industrial") => CustomerClass::Industrial,
            Some("household") | Some("retail") | Some("") | None => CustomerClass::Retail,
            Some(other) => {
                tracing::debug!("Unknown customer type '{}', pricing as retail", other);
                CustomerClass::Retail
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerClass::Retail => "retail",
            CustomerClass::Commercial => "commercial",
            CustomerClass::Industrial => "industrial",
        }
    }
}

impl std::fmt::Display for CustomerClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Supplier-defined price for one SKU and customer class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PricingRule {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub gas_type_id: Uuid,
    pub cylinder_size: String,
    pub customer_class: CustomerClass,
    pub base_price: Decimal,
    pub bulk_threshold: Option<i32>,
    /// 0-100
    pub bulk_discount_percent: Option<Decimal>,
    pub priority: i32,
    pub is_active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PricingRule {
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.is_active
            && self.valid_from.map_or(true, |from| from <= at)
            && self.valid_to.map_or(true, |to| at <= to)
    }
}

/// Filter for the rule lookup
#[derive(Debug, Clone, PartialEq)]
pub struct RuleQuery {
    pub supplier_id: Uuid,
    pub gas_type_id: Uuid,
    pub cylinder_size: String,
    pub customer_class: CustomerClass,
    pub at: DateTime<Utc>,
}

/// Everything the resolver needs to price one line
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRequest {
    pub supplier_id: Uuid,
    pub gas_type_id: Uuid,
    pub cylinder_size: String,
    pub quantity: i32,
    pub customer_class: CustomerClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Rule,
    SupplierQuote,
    Default,
}

/// Resolved unit price; `discount` is per unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub unit_price: Decimal,
    pub base_price: Decimal,
    pub discount: Decimal,
    pub rule_id: Option<Uuid>,
    pub source: PriceSource,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_household_is_retail() {
        assert_eq!(CustomerClass::normalize(Some("household")), CustomerClass::Retail);
        assert_eq!(CustomerClass::normalize(Some(" Household ")), CustomerClass::Retail);
        assert_eq!(CustomerClass::normalize(None), CustomerClass::Retail);
        assert_eq!(CustomerClass::normalize(Some("COMMERCIAL")), CustomerClass::Commercial);
        assert_eq!(CustomerClass::normalize(Some("industrial")), CustomerClass::Industrial);
        assert_eq!(CustomerClass::normalize(Some("vip")), CustomerClass::Retail);
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let rule = PricingRule {
            id: Uuid::new_v4(),
            supplier_id: Uuid::new_v4(),
            gas_type_id: Uuid::new_v4(),
            cylinder_size: "6kg".to_string(),
            customer_class: CustomerClass::Retail,
            base_price: Decimal::new(2000, 2),
            bulk_threshold: None,
            bulk_discount_percent: None,
            priority: 0,
            is_active: true,
            valid_from: Some(now - Duration::days(1)),
            valid_to: Some(now + Duration::days(1)),
            created_at: now,
        };
        assert!(rule.is_valid_at(now));
        assert!(!rule.is_valid_at(now + Duration::days(2)));
        assert!(!PricingRule { is_active: false, ..rule }.is_valid_at(now));
    }
}
