//! # Movement Planning
//!
//! Pure computation of what a stock movement does to an item and which ledger
//! row records it. Nothing here touches storage: the executor in
//! `stockroom-inventory` persists a plan with a version check and retries by
//! re-planning against a fresh read.
//!
//! ## The Three Primitives
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  plan_stock_in    quantity += n   avg blended, prices re-derived   IN   │
//! │  plan_stock_out   quantity -= n   valued at avg, avg unchanged     OUT  │
//! │  plan_adjust      quantity  = n   valued at avg, avg unchanged  ADJUST  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::costing::{movement_value, weighted_average_cost};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, Percent};
use crate::pricing::{calculate_pricing, PricingBreakdown};
use crate::types::{InventoryItem, InventoryTransaction, TransactionReason, TransactionType};
use crate::validation::{
    validate_counted_quantity, validate_on_hand_after, validate_quantity, validate_reason_for,
    validate_reference, validate_unit_cost,
};

// =============================================================================
// Requests
// =============================================================================

/// Units received into stock.
///
/// ## Example
/// ```rust
/// use stockroom_core::money::{Money, Percent};
/// use stockroom_core::movement::StockInRequest;
///
/// let request = StockInRequest::restock(10, Money::from_units(100))
///     .target_profit(Percent::from_percent(30))
///     .reference("PO-2291")
///     .performed_by("warehouse@shop");
/// assert_eq!(request.quantity, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockInRequest {
    pub quantity: i64,
    /// Batch unit cost. For `return`, `None` or zero means "use the item's
    /// average cost".
    pub unit_cost: Option<Money>,
    /// Falls back to the item's cached profit target.
    pub target_profit: Option<Percent>,
    /// Falls back to the item's cached discount.
    pub discount: Option<Percent>,
    pub reason: TransactionReason,
    pub reference: Option<String>,
    pub performed_by: Option<String>,
    pub notes: Option<String>,
}

impl StockInRequest {
    pub fn new(quantity: i64, reason: TransactionReason) -> Self {
        StockInRequest {
            quantity,
            unit_cost: None,
            target_profit: None,
            discount: None,
            reason,
            reference: None,
            performed_by: None,
            notes: None,
        }
    }

    /// A supplier delivery at a known unit cost.
    pub fn restock(quantity: i64, unit_cost: Money) -> Self {
        Self::new(quantity, TransactionReason::Restock).unit_cost(unit_cost)
    }

    pub fn unit_cost(mut self, cost: Money) -> Self {
        self.unit_cost = Some(cost);
        self
    }

    pub fn target_profit(mut self, profit: Percent) -> Self {
        self.target_profit = Some(profit);
        self
    }

    pub fn discount(mut self, discount: Percent) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn performed_by(mut self, user: impl Into<String>) -> Self {
        self.performed_by = Some(user.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Units leaving stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockOutRequest {
    pub quantity: i64,
    pub reason: TransactionReason,
    pub reference: Option<String>,
    pub performed_by: Option<String>,
    pub notes: Option<String>,
}

impl StockOutRequest {
    pub fn new(quantity: i64, reason: TransactionReason) -> Self {
        StockOutRequest {
            quantity,
            reason,
            reference: None,
            performed_by: None,
            notes: None,
        }
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn performed_by(mut self, user: impl Into<String>) -> Self {
        self.performed_by = Some(user.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Absolute quantity from a physical stocktake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustRequest {
    pub new_quantity: i64,
    pub reason: TransactionReason,
    pub performed_by: Option<String>,
    pub notes: Option<String>,
}

impl AdjustRequest {
    pub fn new(new_quantity: i64, reason: TransactionReason) -> Self {
        AdjustRequest {
            new_quantity,
            reason,
            performed_by: None,
            notes: None,
        }
    }

    pub fn performed_by(mut self, user: impl Into<String>) -> Self {
        self.performed_by = Some(user.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

// =============================================================================
// Plan
// =============================================================================

/// The after-state of an item plus the ledger row recording the change.
///
/// `item.version` still carries the version the plan was computed from; the
/// store bumps it when the compare-and-swap succeeds. `transaction.seq` is 0
/// until the ledger assigns one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementPlan {
    pub item: InventoryItem,
    pub transaction: InventoryTransaction,
    /// A return had no cost and the item no average: valued at zero.
    pub cost_fallback: bool,
}

impl MovementPlan {
    pub fn kind(&self) -> TransactionType {
        self.transaction.transaction_type
    }

    pub fn reason(&self) -> TransactionReason {
        self.transaction.reason
    }

    pub fn reference(&self) -> Option<&str> {
        self.transaction.reference.as_deref()
    }
}

// =============================================================================
// Planning
// =============================================================================

/// Plans a stock-in.
///
/// ## Rules
/// - quantity must be positive
/// - `return` without a cost uses the current average cost
/// - the new average blends old and new units; prices derive from it
pub fn plan_stock_in(
    item: &InventoryItem,
    request: &StockInRequest,
    now: DateTime<Utc>,
) -> CoreResult<MovementPlan> {
    validate_quantity(request.quantity)?;
    validate_reason_for(TransactionType::In, request.reason)?;
    ensure_active(item)?;
    validate_on_hand_after(item.quantity, request.quantity)?;
    let reference = normalize_reference(request.reference.as_deref())?;

    let mut cost_fallback = false;
    let unit_cost = match request.unit_cost {
        Some(cost) if !cost.is_zero() => {
            validate_unit_cost(cost.units())?;
            cost
        }
        _ if request.reason.is_order_restock() => {
            if item.average_cost().is_zero() {
                cost_fallback = true;
            }
            item.average_cost()
        }
        Some(cost) => cost,
        None => {
            return Err(ValidationError::Required {
                field: "cost price".to_string(),
            }
            .into())
        }
    };

    let target_profit = request.target_profit.unwrap_or_else(|| item.target_profit());
    let discount = request.discount.unwrap_or_else(|| item.discount());

    let new_average =
        weighted_average_cost(item.quantity, item.average_cost(), request.quantity, unit_cost);
    let pricing = calculate_pricing(new_average, target_profit, discount)?;

    let mut after = item.clone();
    after.quantity = item.quantity + request.quantity;
    after.cost_price = unit_cost.units();
    after.average_cost_price = new_average.units();
    after.selling_price = pricing.base_price.units();
    after.final_price = pricing.final_price.units();
    after.discount_bps = discount.bps();
    after.target_profit_bps = target_profit.bps();
    after.updated_at = now;

    let transaction = ledger_row(LedgerDraft {
        before: item,
        after: &after,
        kind: TransactionType::In,
        reason: request.reason,
        unit_cost,
        pricing: Some((target_profit, discount, pricing)),
        reference,
        performed_by: request.performed_by.clone(),
        notes: request.notes.clone(),
        now,
    });

    Ok(MovementPlan {
        item: after,
        transaction,
        cost_fallback,
    })
}

/// Plans a stock-out.
///
/// Checks on-hand quantity only. Callers that must respect other orders'
/// reservations compare against `InventoryItem::available` themselves.
pub fn plan_stock_out(
    item: &InventoryItem,
    request: &StockOutRequest,
    now: DateTime<Utc>,
) -> CoreResult<MovementPlan> {
    validate_quantity(request.quantity)?;
    validate_reason_for(TransactionType::Out, request.reason)?;
    ensure_active(item)?;
    let reference = normalize_reference(request.reference.as_deref())?;

    if item.quantity < request.quantity {
        return Err(CoreError::InsufficientStock {
            item: item.label(),
            available: item.quantity,
            requested: request.quantity,
        });
    }

    let mut after = item.clone();
    after.quantity = item.quantity - request.quantity;
    after.updated_at = now;

    let transaction = ledger_row(LedgerDraft {
        before: item,
        after: &after,
        kind: TransactionType::Out,
        reason: request.reason,
        unit_cost: item.average_cost(),
        pricing: None,
        reference,
        performed_by: request.performed_by.clone(),
        notes: request.notes.clone(),
        now,
    });

    Ok(MovementPlan {
        item: after,
        transaction,
        cost_fallback: false,
    })
}

/// Plans an absolute adjustment. The change may be negative or zero.
pub fn plan_adjust(
    item: &InventoryItem,
    request: &AdjustRequest,
    now: DateTime<Utc>,
) -> CoreResult<MovementPlan> {
    validate_counted_quantity(request.new_quantity)?;
    validate_reason_for(TransactionType::Adjust, request.reason)?;
    ensure_active(item)?;

    let mut after = item.clone();
    after.quantity = request.new_quantity;
    after.updated_at = now;

    let transaction = ledger_row(LedgerDraft {
        before: item,
        after: &after,
        kind: TransactionType::Adjust,
        reason: request.reason,
        unit_cost: item.average_cost(),
        pricing: None,
        reference: None,
        performed_by: request.performed_by.clone(),
        notes: request.notes.clone(),
        now,
    });

    Ok(MovementPlan {
        item: after,
        transaction,
        cost_fallback: false,
    })
}

// =============================================================================
// Helpers
// =============================================================================

fn ensure_active(item: &InventoryItem) -> CoreResult<()> {
    if !item.is_active {
        return Err(CoreError::not_found("Inventory item", item.label()));
    }
    Ok(())
}

fn normalize_reference(reference: Option<&str>) -> CoreResult<Option<String>> {
    match reference {
        Some(r) => Ok(Some(validate_reference(r)?)),
        None => Ok(None),
    }
}

struct LedgerDraft<'a> {
    before: &'a InventoryItem,
    after: &'a InventoryItem,
    kind: TransactionType,
    reason: TransactionReason,
    unit_cost: Money,
    pricing: Option<(Percent, Percent, PricingBreakdown)>,
    reference: Option<String>,
    performed_by: Option<String>,
    notes: Option<String>,
    now: DateTime<Utc>,
}

fn ledger_row(draft: LedgerDraft<'_>) -> InventoryTransaction {
    let change = draft.after.quantity - draft.before.quantity;
    let (target_profit, discount, pricing) = match draft.pricing {
        Some((profit, discount, pricing)) => (Some(profit), Some(discount), Some(pricing)),
        None => (None, None, None),
    };

    InventoryTransaction {
        seq: 0,
        id: Uuid::new_v4().to_string(),
        inventory_item_id: draft.before.id.clone(),
        transaction_type: draft.kind,
        quantity_before: draft.before.quantity,
        quantity_change: change,
        quantity_after: draft.after.quantity,
        cost_price: draft.unit_cost.units(),
        average_cost_price_before: draft.before.average_cost_price,
        average_cost_price_after: draft.after.average_cost_price,
        total_cost: movement_value(draft.unit_cost, change).units(),
        target_profit_bps: target_profit.map(|p| p.bps()),
        discount_bps: discount.map(|d| d.bps()),
        base_price: pricing.map(|p| p.base_price.units()),
        final_price: pricing.map(|p| p.final_price.units()),
        profit_per_item: pricing.map(|p| p.profit_per_item.units()),
        margin_bps: pricing.map(|p| p.margin.bps()),
        markup_bps: pricing.map(|p| p.markup.bps()),
        reason: draft.reason,
        reference: draft.reference,
        performed_by: draft.performed_by,
        notes: draft.notes,
        created_at: draft.now,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemKey;
    use crate::{MAX_MOVEMENT_QUANTITY, MAX_ON_HAND_QUANTITY, MAX_UNIT_COST};

    fn empty_item() -> InventoryItem {
        InventoryItem::new(&ItemKey::new("p1", "v1", "M"), "TEE-BLK-M", 10, Utc::now())
    }

    fn apply(item: &InventoryItem, plan: MovementPlan) -> InventoryItem {
        assert_eq!(plan.item.id, item.id);
        plan.item
    }

    #[test]
    fn test_two_batches_blend_cost_and_price() {
        let item = empty_item();
        let now = Utc::now();

        let first = plan_stock_in(
            &item,
            &StockInRequest::restock(10, Money::from_units(100)).target_profit(Percent::from_percent(30)),
            now,
        )
        .unwrap();
        assert_eq!(first.transaction.quantity_before, 0);
        assert_eq!(first.transaction.quantity_after, 10);
        let item = apply(&item, first);
        assert_eq!(item.average_cost_price, 100);

        let second = plan_stock_in(
            &item,
            &StockInRequest::restock(10, Money::from_units(200)).target_profit(Percent::from_percent(30)),
            now,
        )
        .unwrap();
        let tx = second.transaction.clone();
        let item = apply(&item, second);

        assert_eq!(item.quantity, 20);
        assert_eq!(item.cost_price, 200);
        assert_eq!(item.average_cost_price, 150);
        assert_eq!(item.selling_price, 195);
        assert_eq!(item.final_price, 195);

        assert_eq!(tx.transaction_type, TransactionType::In);
        assert_eq!(tx.average_cost_price_before, 100);
        assert_eq!(tx.average_cost_price_after, 150);
        assert_eq!(tx.total_cost, 2000);
        assert_eq!(tx.base_price, Some(195));
        assert_eq!(tx.margin_bps, Some(2308));
    }

    #[test]
    fn test_stock_in_rejects_non_positive_quantity() {
        let item = empty_item();
        let err = plan_stock_in(&item, &StockInRequest::restock(0, Money::from_units(1)), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::MustBePositive { .. })));
    }

    #[test]
    fn test_restock_requires_cost() {
        let item = empty_item();
        let err = plan_stock_in(&item, &StockInRequest::new(5, TransactionReason::Restock), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::Required { .. })));
    }

    #[test]
    fn test_cost_and_on_hand_bounds() {
        let item = empty_item();

        let largest = plan_stock_in(
            &item,
            &StockInRequest::restock(MAX_MOVEMENT_QUANTITY, Money::from_units(MAX_UNIT_COST)),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(largest.transaction.total_cost, MAX_MOVEMENT_QUANTITY * MAX_UNIT_COST);

        let err = plan_stock_in(
            &item,
            &StockInRequest::restock(1_000_000, Money::from_units(10_000_000_000_000)),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::OutOfRange { .. })));

        let mut full = empty_item();
        full.quantity = MAX_ON_HAND_QUANTITY;
        full.average_cost_price = MAX_UNIT_COST;
        let err = plan_stock_in(&full, &StockInRequest::restock(1, Money::from_units(1)), Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { ref field, .. }) if field == "quantity on hand"
        ));

        let emptied = plan_adjust(&full, &AdjustRequest::new(0, TransactionReason::Adjustment), Utc::now())
            .unwrap();
        assert_eq!(emptied.transaction.total_cost, MAX_ON_HAND_QUANTITY * MAX_UNIT_COST);
    }

    #[test]
    fn test_order_restock_without_cost_uses_average() {
        let mut item = empty_item();
        item.quantity = 6;
        item.average_cost_price = 40;

        for reason in [TransactionReason::Cancelled, TransactionReason::DeliveryFailed] {
            let plan = plan_stock_in(&item, &StockInRequest::new(2, reason), Utc::now()).unwrap();
            assert_eq!(plan.transaction.cost_price, 40);
            assert_eq!(plan.item.average_cost_price, 40);
        }
    }

    #[test]
    fn test_return_without_cost_uses_average() {
        let mut item = empty_item();
        item.quantity = 4;
        item.average_cost_price = 150;
        item.target_profit_bps = 3000;

        let plan = plan_stock_in(&item, &StockInRequest::new(2, TransactionReason::Return), Utc::now())
            .unwrap();
        assert!(!plan.cost_fallback);
        assert_eq!(plan.transaction.cost_price, 150);
        assert_eq!(plan.item.average_cost_price, 150);
        assert_eq!(plan.item.selling_price, 195);
    }

    #[test]
    fn test_return_without_any_cost_falls_back_to_zero() {
        let item = empty_item();
        let plan = plan_stock_in(
            &item,
            &StockInRequest::new(1, TransactionReason::Return).unit_cost(Money::zero()),
            Utc::now(),
        )
        .unwrap();
        assert!(plan.cost_fallback);
        assert_eq!(plan.item.average_cost_price, 0);
        assert_eq!(plan.item.final_price, 0);
    }

    #[test]
    fn test_stock_out_checks_on_hand_only() {
        let mut item = empty_item();
        item.quantity = 5;
        item.reserved_quantity = 5;
        item.average_cost_price = 120;

        let plan = plan_stock_out(&item, &StockOutRequest::new(5, TransactionReason::Sale), Utc::now())
            .unwrap();
        assert_eq!(plan.item.quantity, 0);
        assert_eq!(plan.item.reserved_quantity, 5);
        assert_eq!(plan.transaction.quantity_change, -5);
        assert_eq!(plan.transaction.cost_price, 120);
        assert_eq!(plan.transaction.total_cost, 600);
        assert_eq!(plan.transaction.average_cost_price_after, 120);
        assert_eq!(plan.transaction.base_price, None);

        let err = plan_stock_out(&item, &StockOutRequest::new(6, TransactionReason::Sale), Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientStock {
                item: "TEE-BLK-M (size M)".to_string(),
                available: 5,
                requested: 6,
            }
        );
    }

    #[test]
    fn test_adjust_records_signed_change() {
        let mut item = empty_item();
        item.quantity = 12;
        item.average_cost_price = 50;

        let plan = plan_adjust(&item, &AdjustRequest::new(9, TransactionReason::Adjustment), Utc::now())
            .unwrap();
        assert_eq!(plan.transaction.quantity_after, 9);
        assert_eq!(plan.transaction.quantity_change, -3);
        assert_eq!(plan.transaction.total_cost, 150);
        assert_eq!(plan.transaction.reference, None);
    }

    #[test]
    fn test_retired_item_rejects_movements() {
        let mut item = empty_item();
        item.is_active = false;
        let err = plan_stock_in(&item, &StockInRequest::restock(1, Money::from_units(1)), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_reference_is_trimmed_and_validated() {
        let mut item = empty_item();
        item.quantity = 3;
        let plan = plan_stock_out(
            &item,
            &StockOutRequest::new(1, TransactionReason::Sale).reference("  ord-7 "),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(plan.reference(), Some("ord-7"));

        let err = plan_stock_out(
            &item,
            &StockOutRequest::new(1, TransactionReason::Sale).reference("  "),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::Required { .. })));
    }
}
