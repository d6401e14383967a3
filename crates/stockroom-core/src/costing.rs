//! # Weighted-Average Costing
//!
//! Blends the cost of a new batch into the cost of the units already on hand.
//!
//! ```text
//! newAvg = quantity == 0
//!        ? batchCost
//!        : (avg × quantity + batchCost × batchQty) / (quantity + batchQty)
//! ```
//!
//! Selling prices are derived from this blended cost rather than the newest
//! batch, so the price reflects every unit that is still on the shelf. When
//! stock returns to zero the history is forgotten: the next batch sets the
//! average outright.

use crate::money::{div_round, Money};

/// Returns the average unit cost after receiving a batch.
///
/// Rounded half away from zero to whole currency units.
///
/// ## Example
/// ```rust
/// use stockroom_core::costing::weighted_average_cost;
/// use stockroom_core::money::Money;
///
/// let avg = weighted_average_cost(10, Money::from_units(100), 10, Money::from_units(200));
/// assert_eq!(avg.units(), 150);
/// ```
pub fn weighted_average_cost(
    on_hand: i64,
    current_average: Money,
    batch_quantity: i64,
    batch_cost: Money,
) -> Money {
    if on_hand <= 0 {
        return batch_cost;
    }

    let total_units = on_hand as i128 + batch_quantity as i128;
    if total_units <= 0 {
        return batch_cost;
    }

    let value = current_average.units() as i128 * on_hand as i128
        + batch_cost.units() as i128 * batch_quantity as i128;

    Money::from_units(div_round(value, total_units) as i64)
}

/// Value of `quantity` units at `unit_cost`, for the ledger's `total_cost`.
#[inline]
pub fn movement_value(unit_cost: Money, quantity: i64) -> Money {
    unit_cost.multiply_quantity(quantity.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_batch_sets_average() {
        let avg = weighted_average_cost(0, Money::from_units(999), 10, Money::from_units(100));
        assert_eq!(avg.units(), 100);
    }

    #[test]
    fn test_blends_two_batches() {
        let avg = weighted_average_cost(10, Money::from_units(100), 10, Money::from_units(200));
        assert_eq!(avg.units(), 150);

        let avg = weighted_average_cost(30, Money::from_units(100), 10, Money::from_units(300));
        assert_eq!(avg.units(), 150);
    }

    #[test]
    fn test_zero_cost_batch_dilutes() {
        let avg = weighted_average_cost(10, Money::from_units(100), 10, Money::zero());
        assert_eq!(avg.units(), 50);
    }

    #[test]
    fn test_movement_value_uses_magnitude() {
        assert_eq!(movement_value(Money::from_units(150), -4).units(), 600);
    }

    proptest! {
        /// Sequential blending of batches with one shared cost never drifts.
        #[test]
        fn prop_uniform_cost_is_stable(
            cost in 0i64..1_000_000,
            batches in proptest::collection::vec(1i64..10_000, 1..20),
        ) {
            let mut on_hand = 0;
            let mut avg = Money::zero();
            for qty in batches {
                avg = weighted_average_cost(on_hand, avg, qty, Money::from_units(cost));
                on_hand += qty;
            }
            prop_assert_eq!(avg.units(), cost);
        }

        /// Two batches from empty match Σ(cost·qty)/Σqty, rounded.
        #[test]
        fn prop_two_batches_match_exact_mean(
            c1 in 0i64..100_000, q1 in 1i64..10_000,
            c2 in 0i64..100_000, q2 in 1i64..10_000,
        ) {
            let first = weighted_average_cost(0, Money::zero(), q1, Money::from_units(c1));
            let avg = weighted_average_cost(q1, first, q2, Money::from_units(c2));
            let exact = div_round(c1 as i128 * q1 as i128 + c2 as i128 * q2 as i128, (q1 + q2) as i128);
            prop_assert_eq!(avg.units() as i128, exact);
        }

        /// The average always lies between the cheapest and dearest batch.
        #[test]
        fn prop_average_is_bounded(
            avg in 0i64..100_000, on_hand in 1i64..10_000,
            cost in 0i64..100_000, qty in 1i64..10_000,
        ) {
            let blended = weighted_average_cost(on_hand, Money::from_units(avg), qty, Money::from_units(cost));
            prop_assert!(blended.units() >= avg.min(cost));
            prop_assert!(blended.units() <= avg.max(cost));
        }
    }
}
