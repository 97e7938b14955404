// Pricing resolver
//
// Rule lookup, then the supplier's own quote, then the static size table.
// Only "no usable rule" falls through; a failed rule query aborts the
// enclosing transaction and is returned as is.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::collaborators::{SupplierItem, SupplierService};
use crate::config::StaticPriceTable;
use crate::error::EngineResult;
use crate::orders::price_calculator::round_money;
use crate::pricing::models::{PriceQuote, PriceRequest, PriceSource, PricingRule, RuleQuery};
use crate::store::StoreTx;

/// Remote quotes above 1,000,000.00 per unit are treated as unusable
const MAX_QUOTED_UNIT_PRICE_CENTS: i64 = 100_000_000;

pub struct PricingResolver {
    supplier_service: Arc<dyn SupplierService>,
    static_prices: StaticPriceTable,
}

/// Quote from a single rule at the requested quantity
///
/// The bulk discount applies per unit once `quantity` reaches the threshold.
pub fn apply_rule(rule: &PricingRule, quantity: i32) -> PriceQuote {
    let base_price = rule.base_price;
    let discount = match (rule.bulk_threshold, rule.bulk_discount_percent) {
        (Some(threshold), Some(percent)) if quantity >= threshold => {
            round_money(base_price * percent / Decimal::ONE_HUNDRED)
        }
        _ => Decimal::ZERO,
    };

    PriceQuote {
        unit_price: base_price - discount,
        base_price,
        discount,
        rule_id: Some(rule.id),
        source: PriceSource::Rule,
    }
}

fn rule_is_usable(rule: &PricingRule) -> bool {
    let percent_ok = rule
        .bulk_discount_percent
        .map_or(true, |p| p >= Decimal::ZERO && p <= Decimal::ONE_HUNDRED);
    rule.base_price > Decimal::ZERO && percent_ok
}

impl PricingResolver {
    pub fn new(supplier_service: Arc<dyn SupplierService>, static_prices: StaticPriceTable) -> Self {
        Self {
            supplier_service,
            static_prices,
        }
    }

    /// Full resolution for one order line
    pub async fn price_in(
        &self,
        tx: &mut dyn StoreTx,
        request: &PriceRequest,
        auth_token: &str,
    ) -> EngineResult<PriceQuote> {
        if let Some(quote) = self.rule_quote(tx, request).await? {
            return Ok(quote);
        }
        if let Some(quote) = self.supplier_quote(request, auth_token).await {
            return Ok(quote);
        }
        Ok(self.default_quote(request))
    }

    /// Price used to rank candidates before one is chosen
    ///
    /// Skips the remote quote so ranking never costs a network round trip
    /// per candidate.
    pub async fn indicative_price_in(
        &self,
        tx: &mut dyn StoreTx,
        request: &PriceRequest,
    ) -> EngineResult<Decimal> {
        Ok(match self.rule_quote(tx, request).await? {
            Some(quote) => quote.unit_price,
            None => self.static_prices.price_for(&request.cylinder_size),
        })
    }

    async fn rule_quote(
        &self,
        tx: &mut dyn StoreTx,
        request: &PriceRequest,
    ) -> EngineResult<Option<PriceQuote>> {
        let query = RuleQuery {
            supplier_id: request.supplier_id,
            gas_type_id: request.gas_type_id,
            cylinder_size: request.cylinder_size.clone(),
            customer_class: request.customer_class,
            at: Utc::now(),
        };

        let rules = tx.find_pricing_rules(&query).await?;

        let rule = rules.iter().find(|rule| {
            let usable = rule_is_usable(rule);
            if !usable {
                warn!("Skipping malformed pricing rule {}", rule.id);
            }
            usable
        });

        Ok(rule.map(|rule| {
            debug!("Pricing rule {} applies to supplier {}", rule.id, request.supplier_id);
            apply_rule(rule, request.quantity)
        }))
    }

    async fn supplier_quote(&self, request: &PriceRequest, auth_token: &str) -> Option<PriceQuote> {
        let item = SupplierItem {
            gas_type_id: request.gas_type_id,
            cylinder_size: request.cylinder_size.clone(),
            quantity: request.quantity,
        };

        let quote = match self
            .supplier_service
            .calculate_pricing(request.supplier_id, &[item], request.customer_class, auth_token)
            .await
        {
            Ok(quote) => quote,
            Err(e) => {
                warn!("Supplier {} pricing quote failed: {}", request.supplier_id, e);
                return None;
            }
        };

        let line = quote.items.into_iter().next()?;
        let ceiling = Decimal::new(MAX_QUOTED_UNIT_PRICE_CENTS, 2);
        if line.unit_price <= Decimal::ZERO
            || line.unit_price > ceiling
            || line.discount_amount < Decimal::ZERO
            || line.discount_amount > ceiling
        {
            warn!(
                "Supplier {} quoted an unusable price {} (discount {})",
                request.supplier_id, line.unit_price, line.discount_amount
            );
            return None;
        }

        Some(PriceQuote {
            unit_price: line.unit_price,
            base_price: line.unit_price + line.discount_amount,
            discount: line.discount_amount,
            rule_id: line.pricing_rule_id,
            source: PriceSource::SupplierQuote,
        })
    }

    fn default_quote(&self, request: &PriceRequest) -> PriceQuote {
        let price = self.static_prices.price_for(&request.cylinder_size);
        warn!(
            "No rule or supplier quote for supplier {} ({}); using default price {}",
            request.supplier_id, request.cylinder_size, price
        );
        PriceQuote {
            unit_price: price,
            base_price: price,
            discount: Decimal::ZERO,
            rule_id: None,
            source: PriceSource::Default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{QuotedItem, StaticSupplierService};
    use crate::pricing::models::CustomerClass;
    use crate::store::{EngineStore, MemoryStore};
    use chrono::Duration;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn rule(base: Decimal, threshold: Option<i32>, percent: Option<Decimal>) -> PricingRule {
        PricingRule {
            id: Uuid::new_v4(),
            supplier_id: Uuid::new_v4(),
            gas_type_id: Uuid::new_v4(),
            cylinder_size: "12.5kg".to_string(),
            customer_class: CustomerClass::Retail,
            base_price: base,
            bulk_threshold: threshold,
            bulk_discount_percent: percent,
            priority: 0,
            is_active: true,
            valid_from: None,
            valid_to: None,
            created_at: Utc::now(),
        }
    }

    fn request_for(rule: &PricingRule, quantity: i32) -> PriceRequest {
        PriceRequest {
            supplier_id: rule.supplier_id,
            gas_type_id: rule.gas_type_id,
            cylinder_size: rule.cylinder_size.clone(),
            quantity,
            customer_class: rule.customer_class,
        }
    }

    #[test]
    fn test_bulk_discount_applies_at_threshold() {
        let r = rule(dec!(40.00), Some(10), Some(dec!(5)));
        let below = apply_rule(&r, 9);
        assert_eq!(below.unit_price, dec!(40.00));
        assert_eq!(below.discount, dec!(0));

        let at = apply_rule(&r, 10);
        assert_eq!(at.discount, dec!(2.00));
        assert_eq!(at.unit_price, dec!(38.00));
        assert_eq!(at.base_price, dec!(40.00));
        assert_eq!(at.rule_id, Some(r.id));
    }

    #[tokio::test]
    async fn test_rule_wins_over_remote_quote() {
        let store = MemoryStore::new();
        let r = rule(dec!(40.00), None, None);
        store.insert_pricing_rule(r.clone()).await;

        let suppliers = Arc::new(StaticSupplierService::new());
        let request = request_for(&r, 1);
        suppliers.set_quote(
            r.supplier_id,
            &SupplierItem {
                gas_type_id: r.gas_type_id,
                cylinder_size: r.cylinder_size.clone(),
                quantity: 1,
            },
            QuotedItem {
                unit_price: dec!(1.00),
                discount_amount: dec!(0),
                pricing_rule_id: None,
            },
        );
        let resolver = PricingResolver::new(suppliers, StaticPriceTable::default());

        let mut tx = store.begin().await.unwrap();
        let quote = resolver.price_in(tx.as_mut(), &request, "t").await.unwrap();
        assert_eq!(quote.source, PriceSource::Rule);
        assert_eq!(quote.unit_price, dec!(40.00));
    }

    #[tokio::test]
    async fn test_highest_priority_then_newest_rule_is_used() {
        let store = MemoryStore::new();
        let old = rule(dec!(30.00), None, None);
        let newer = PricingRule {
            id: Uuid::new_v4(),
            base_price: dec!(31.00),
            created_at: old.created_at + Duration::seconds(5),
            ..old.clone()
        };
        let low_priority = PricingRule {
            id: Uuid::new_v4(),
            base_price: dec!(10.00),
            priority: -1,
            created_at: old.created_at + Duration::seconds(10),
            ..old.clone()
        };
        for r in [old.clone(), newer.clone(), low_priority] {
            store.insert_pricing_rule(r).await;
        }
        let resolver = PricingResolver::new(Arc::new(StaticSupplierService::new()), StaticPriceTable::default());

        let mut tx = store.begin().await.unwrap();
        let quote = resolver.price_in(tx.as_mut(), &request_for(&old, 1), "t").await.unwrap();
        assert_eq!(quote.rule_id, Some(newer.id));
    }

    #[tokio::test]
    async fn test_remote_quote_reconstructs_base_price() {
        let store = MemoryStore::new();
        let suppliers = Arc::new(StaticSupplierService::new());
        let request = PriceRequest {
            supplier_id: Uuid::new_v4(),
            gas_type_id: Uuid::new_v4(),
            cylinder_size: "6kg".to_string(),
            quantity: 3,
            customer_class: CustomerClass::Commercial,
        };
        suppliers.set_quote(
            request.supplier_id,
            &SupplierItem {
                gas_type_id: request.gas_type_id,
                cylinder_size: "6kg".to_string(),
                quantity: 3,
            },
            QuotedItem {
                unit_price: dec!(19.50),
                discount_amount: dec!(1.50),
                pricing_rule_id: None,
            },
        );
        let resolver = PricingResolver::new(suppliers, StaticPriceTable::default());

        let mut tx = store.begin().await.unwrap();
        let quote = resolver.price_in(tx.as_mut(), &request, "t").await.unwrap();
        assert_eq!(quote.source, PriceSource::SupplierQuote);
        assert_eq!(quote.base_price, dec!(21.00));
        assert_eq!(quote.discount, dec!(1.50));
    }

    #[tokio::test]
    async fn test_falls_through_to_static_table() {
        let store = MemoryStore::new();
        let resolver = PricingResolver::new(Arc::new(StaticSupplierService::new()), StaticPriceTable::default());
        let request = PriceRequest {
            supplier_id: Uuid::new_v4(),
            gas_type_id: Uuid::new_v4(),
            cylinder_size: "50kg".to_string(),
            quantity: 1,
            customer_class: CustomerClass::Retail,
        };

        let mut tx = store.begin().await.unwrap();
        let quote = resolver.price_in(tx.as_mut(), &request, "t").await.unwrap();
        assert_eq!(quote.source, PriceSource::Default);
        assert_eq!(quote.unit_price, dec!(140.00));
        assert!(quote.unit_price > Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_malformed_rule_is_skipped() {
        let store = MemoryStore::new();
        let bad = rule(dec!(40.00), Some(1), Some(dec!(150)));
        store.insert_pricing_rule(bad.clone()).await;
        let resolver = PricingResolver::new(Arc::new(StaticSupplierService::new()), StaticPriceTable::default());

        let mut tx = store.begin().await.unwrap();
        let quote = resolver.price_in(tx.as_mut(), &request_for(&bad, 2), "t").await.unwrap();
        assert_eq!(quote.source, PriceSource::Default);
    }

    #[tokio::test]
    async fn test_rule_lookup_failure_is_not_a_fallback() {
        let store = MemoryStore::new();
        store.set_pricing_rules_offline(true).await;
        let resolver = PricingResolver::new(Arc::new(StaticSupplierService::new()), StaticPriceTable::default());
        let r = rule(dec!(40.00), None, None);

        let mut tx = store.begin().await.unwrap();
        let err = resolver.price_in(tx.as_mut(), &request_for(&r, 1), "t").await.unwrap_err();
        assert!(matches!(err, crate::error::EngineError::Database(_)));
        assert!(resolver.indicative_price_in(tx.as_mut(), &request_for(&r, 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_absurd_remote_quote_is_ignored() {
        let store = MemoryStore::new();
        let suppliers = Arc::new(StaticSupplierService::new());
        let request = PriceRequest {
            supplier_id: Uuid::new_v4(),
            gas_type_id: Uuid::new_v4(),
            cylinder_size: "6kg".to_string(),
            quantity: 1,
            customer_class: CustomerClass::Retail,
        };
        suppliers.set_quote(
            request.supplier_id,
            &SupplierItem {
                gas_type_id: request.gas_type_id,
                cylinder_size: "6kg".to_string(),
                quantity: 1,
            },
            QuotedItem {
                unit_price: Decimal::MAX,
                discount_amount: dec!(0),
                pricing_rule_id: None,
            },
        );
        let resolver = PricingResolver::new(suppliers, StaticPriceTable::default());

        let mut tx = store.begin().await.unwrap();
        let quote = resolver.price_in(tx.as_mut(), &request, "t").await.unwrap();
        assert_eq!(quote.source, PriceSource::Default);
        assert_eq!(quote.unit_price, dec!(22.00));
    }

    proptest! {
        #[test]
        fn prop_rule_quote_is_consistent(
            base_cents in 1i64..100_000,
            percent in 0u32..=100,
            threshold in 1i32..50,
            quantity in 1i32..100,
        ) {
            let r = rule(Decimal::new(base_cents, 2), Some(threshold), Some(Decimal::from(percent)));
            let quote = apply_rule(&r, quantity);
            prop_assert_eq!(quote.unit_price + quote.discount, quote.base_price);
            prop_assert!(quote.discount >= Decimal::ZERO);
            prop_assert!(quote.unit_price >= Decimal::ZERO);
            if quantity < threshold {
                prop_assert_eq!(quote.discount, Decimal::ZERO);
            }
        }
    }
}
