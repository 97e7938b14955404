use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::{DeliveryFeeSchedule, EngineConfig};
use crate::error::{EngineError, EngineResult};

/// Rounds to the smallest currency unit, halves away from zero
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Monetary breakdown of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub delivery_fee: Decimal,
    pub emergency_surcharge: Decimal,
    pub total_amount: Decimal,
}

/// Service for calculating order prices and subtotals
pub struct PriceCalculator;

impl PriceCalculator {
    /// Total of one line (`unit_price * quantity`), rounded
    pub fn line_total(quantity: i32, unit_price: Decimal) -> EngineResult<Decimal> {
        Decimal::from(quantity)
            .checked_mul(unit_price)
            .map(round_money)
            .ok_or_else(|| {
                EngineError::invalid_field(
                    "unit_price",
                    format!("{} x {} is out of range", quantity, unit_price),
                )
            })
    }

    /// Sum of rounded line totals
    pub fn subtotal(line_totals: &[Decimal]) -> Decimal {
        line_totals.iter().sum()
    }

    /// Surcharge kept apart from the subtotal so it can be refunded on its own
    pub fn emergency_surcharge(subtotal: Decimal, percent: Decimal, is_emergency: bool) -> Decimal {
        if !is_emergency {
            return Decimal::ZERO;
        }
        round_money(subtotal * percent / Decimal::ONE_HUNDRED)
    }

    pub fn tax(subtotal: Decimal, tax_rate: Decimal) -> Decimal {
        round_money(subtotal * tax_rate)
    }

    /// `max(minimum, per_km * km)`, times the emergency multiplier
    ///
    /// Without a distance (missing coordinates) the flat default fee applies.
    pub fn delivery_fee(schedule: &DeliveryFeeSchedule, distance_km: Option<f64>, is_emergency: bool) -> Decimal {
        let distance = match distance_km.and_then(Decimal::from_f64) {
            Some(km) if km >= Decimal::ZERO => km,
            _ => return schedule.default_fee,
        };

        let mut fee = (schedule.per_km_rate * distance).max(schedule.minimum_fee);
        if is_emergency {
            fee *= schedule.emergency_multiplier;
        }
        round_money(fee)
    }

    pub fn totals(
        config: &EngineConfig,
        line_totals: &[Decimal],
        delivery_distance_km: Option<f64>,
        is_emergency: bool,
    ) -> OrderTotals {
        let subtotal = Self::subtotal(line_totals);
        let emergency_surcharge =
            Self::emergency_surcharge(subtotal, config.emergency_surcharge_percent, is_emergency);
        let tax_amount = Self::tax(subtotal, config.tax_rate);
        let delivery_fee = Self::delivery_fee(&config.delivery_fees, delivery_distance_km, is_emergency);

        OrderTotals {
            subtotal,
            tax_amount,
            delivery_fee,
            emergency_surcharge,
            total_amount: subtotal + tax_amount + delivery_fee + emergency_surcharge,
        }
    }
}
