//! # Pricing Calculator
//!
//! Turns a unit cost, a profit target and a discount into the selling price
//! the catalog shows.
//!
//! ## Formula
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  basePrice     = cost × (1 + targetProfit / 100)                        │
//! │  finalPrice    = basePrice × (1 − discount / 100)                       │
//! │  profitPerItem = finalPrice − cost                                      │
//! │  margin        = profitPerItem / finalPrice × 100   (0 if final ≤ 0)    │
//! │  markup        = profitPerItem / cost × 100         (0 if cost ≤ 0)     │
//! │                                                                         │
//! │  Example: cost 150, target 30%, discount 0%                             │
//! │    base 195, final 195, profit 45, margin 23.08%, markup 30.00%         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `finalPrice` is derived from the exact base price, not the rounded one, so
//! rounding happens once per output.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::{div_round, Money, Percent};
use crate::validation::{validate_discount, validate_target_profit, validate_unit_cost, ValidationResult};

/// Output of the Pricing Calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricingBreakdown {
    /// Price before discount.
    pub base_price: Money,
    /// Price after discount (what the customer pays).
    pub final_price: Money,
    /// `final_price − cost`; negative when the discount eats the margin.
    pub profit_per_item: Money,
    /// Profit as a share of the final price.
    pub margin: Percent,
    /// Profit as a share of the cost.
    pub markup: Percent,
}

/// Computes selling prices from a unit cost.
///
/// ## Arguments
/// * `cost` - Unit cost (normally the item's weighted-average cost)
/// * `target_profit` - Desired markup over cost
/// * `discount` - Discount off the base price, 0%..=100%
///
/// ## Returns
/// All-zero output when `cost` is zero (e.g., a return with no reconstructible
/// cost); never NaN-like values.
///
/// ## Example
/// ```rust
/// use stockroom_core::money::{Money, Percent};
/// use stockroom_core::pricing::calculate_pricing;
///
/// let p = calculate_pricing(Money::from_units(100), Percent::from_percent(50), Percent::from_percent(10)).unwrap();
/// assert_eq!(p.base_price.units(), 150);
/// assert_eq!(p.final_price.units(), 135);
/// assert_eq!(p.profit_per_item.units(), 35);
/// ```
pub fn calculate_pricing(
    cost: Money,
    target_profit: Percent,
    discount: Percent,
) -> ValidationResult<PricingBreakdown> {
    validate_unit_cost(cost.units())?;
    validate_target_profit(target_profit.bps())?;
    validate_discount(discount.bps())?;

    if cost.is_zero() {
        return Ok(PricingBreakdown::default());
    }

    let cost_units = cost.units() as i128;
    let uplift = 10_000 + target_profit.bps() as i128;
    let keep = 10_000 - discount.bps() as i128;

    let base_price = div_round(cost_units * uplift, 10_000) as i64;
    let final_price = div_round(cost_units * uplift * keep, 100_000_000) as i64;
    let profit = final_price - cost.units();

    let margin = if final_price <= 0 {
        0
    } else {
        div_round(profit as i128 * 10_000, final_price as i128) as i64
    };

    let markup = if cost.units() <= 0 {
        0
    } else {
        div_round(profit as i128 * 10_000, cost_units) as i64
    };

    Ok(PricingBreakdown {
        base_price: Money::from_units(base_price),
        final_price: Money::from_units(final_price),
        profit_per_item: Money::from_units(profit),
        margin: Percent::from_bps(margin),
        markup: Percent::from_bps(markup),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
