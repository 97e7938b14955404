// Supplier selector
//
// Emergency orders go to the nearest supplier. Routine orders take the best
// weighted score of rating, distance and price rank.

use std::cmp::Ordering;

use crate::config::SelectionWeights;
use crate::error::{EngineError, EngineResult};
use crate::suppliers::models::SupplierOffer;

/// A candidate with the score it was ranked by
#[derive(Debug, Clone, PartialEq)]
pub struct RankedOffer {
    pub offer: SupplierOffer,
    /// Routine score, or the distance for emergency ranking
    pub score: f64,
    /// 1-based position by ascending price
    pub price_rank: usize,
}

pub struct SupplierSelector {
    weights: SelectionWeights,
}

impl SupplierSelector {
    pub fn new(weights: SelectionWeights) -> Self {
        Self { weights }
    }

    /// `rating*w_r + (reference - distance)*w_d + (reference - price_rank)*w_p`
    pub fn routine_score(&self, offer: &SupplierOffer, price_rank: usize) -> f64 {
        let w = &self.weights;
        offer.rating * w.rating
            + (w.reference - offer.distance_km) * w.distance
            + (w.reference - price_rank as f64) * w.price_rank
    }

    /// Candidates best first
    ///
    /// Ties are broken by supplier id so equal inputs always rank the same.
    pub fn rank(&self, candidates: &[SupplierOffer], is_emergency: bool) -> Vec<RankedOffer> {
        let mut by_price: Vec<&SupplierOffer> = candidates.iter().collect();
        by_price.sort_by(|a, b| {
            a.unit_price
                .cmp(&b.unit_price)
                .then_with(|| a.supplier_id.cmp(&b.supplier_id))
        });

        let mut ranked: Vec<RankedOffer> = candidates
            .iter()
            .map(|offer| {
                let price_rank = by_price
                    .iter()
                    .position(|o| std::ptr::eq(*o, offer))
                    .map_or(candidates.len(), |i| i + 1);
                let score = if is_emergency {
                    offer.distance_km
                } else {
                    self.routine_score(offer, price_rank)
                };
                RankedOffer {
                    offer: offer.clone(),
                    score,
                    price_rank,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            let primary = if is_emergency {
                a.score.partial_cmp(&b.score)
            } else {
                b.score.partial_cmp(&a.score)
            };
            primary
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.offer.supplier_id.cmp(&b.offer.supplier_id))
        });
        ranked
    }

    pub fn select(&self, candidates: &[SupplierOffer], is_emergency: bool) -> EngineResult<SupplierOffer> {
        self.rank(candidates, is_emergency)
            .into_iter()
            .next()
            .map(|ranked| ranked.offer)
            .ok_or_else(|| EngineError::business("No supplier available", None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn offer(id: u128, rating: f64, distance_km: f64, unit_price: Decimal) -> SupplierOffer {
        SupplierOffer {
            supplier_id: Uuid::from_u128(id),
            supplier_name: format!("supplier-{}", id),
            inventory_record_id: Uuid::from_u128(1000 + id),
            rating,
            distance_km,
            unit_price,
        }
    }

    fn selector() -> SupplierSelector {
        SupplierSelector::new(SelectionWeights::default())
    }

    #[test]
    fn test_empty_candidates_is_business_error() {
        let err = selector().select(&[], false).unwrap_err();
        assert!(err.is_business_logic());
    }

    #[test]
    fn test_routine_scores_are_exact() {
        let candidates = vec![
            offer(1, 4.5, 10.0, dec!(40.00)),
            offer(2, 3.0, 2.0, dec!(38.00)),
        ];
        let ranked = selector().rank(&candidates, false);

        // supplier 2: 3.0*0.4 + 98*0.3 + 99*0.3 = 60.3
        // supplier 1: 4.5*0.4 + 90*0.3 + 98*0.3 = 58.2
        assert_eq!(ranked[0].offer.supplier_id, Uuid::from_u128(2));
        assert_eq!(ranked[0].price_rank, 1);
        assert!((ranked[0].score - 60.3).abs() < 1e-9);
        assert!((ranked[1].score - 58.2).abs() < 1e-9);
    }

    #[test]
    fn test_emergency_picks_nearest() {
        let candidates = vec![
            offer(1, 5.0, 8.0, dec!(10.00)),
            offer(2, 1.0, 3.5, dec!(90.00)),
            offer(3, 4.0, 12.0, dec!(20.00)),
        ];
        let chosen = selector().select(&candidates, true).unwrap();
        assert_eq!(chosen.supplier_id, Uuid::from_u128(2));
    }

    #[test]
    fn test_emergency_ties_break_by_supplier_id() {
        let candidates = vec![
            offer(9, 5.0, 4.0, dec!(10.00)),
            offer(3, 1.0, 4.0, dec!(90.00)),
        ];
        let chosen = selector().select(&candidates, true).unwrap();
        assert_eq!(chosen.supplier_id, Uuid::from_u128(3));
    }

    proptest! {
        #[test]
        fn prop_selection_ignores_input_order(
            seeds in prop::collection::vec((0.0f64..5.0, 0.0f64..150.0, 100i64..20_000), 1..8),
            emergency in any::<bool>(),
        ) {
            let candidates: Vec<SupplierOffer> = seeds
                .iter()
                .enumerate()
                .map(|(i, (rating, distance, cents))| offer(i as u128 + 1, *rating, *distance, Decimal::new(*cents, 2)))
                .collect();
            let mut reversed = candidates.clone();
            reversed.reverse();

            let a = selector().select(&candidates, emergency).unwrap();
            let b = selector().select(&reversed, emergency).unwrap();
            prop_assert_eq!(a.supplier_id, b.supplier_id);
        }

        #[test]
        fn prop_emergency_choice_is_nearest(
            distances in prop::collection::vec(0.0f64..500.0, 1..10),
        ) {
            let candidates: Vec<SupplierOffer> = distances
                .iter()
                .enumerate()
                .map(|(i, d)| offer(i as u128 + 1, 3.0, *d, dec!(20.00)))
                .collect();
            let chosen = selector().select(&candidates, true).unwrap();
            let nearest = distances.iter().cloned().fold(f64::INFINITY, f64::min);
            prop_assert_eq!(chosen.distance_km, nearest);
        }
    }
}
