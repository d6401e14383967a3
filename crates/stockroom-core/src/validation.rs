//! # Validation Module
//!
//! Input validation for stock movements, reservations and pricing inputs.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Validation Layers                                    │
//! │                                                                         │
//! │  Layer 1: Input validation (THIS MODULE)                               │
//! │  └── quantity > 0, cost ∈ [0, MAX], discount ∈ [0,100], reason fits  │
//! │                                                                         │
//! │  Layer 2: Inventory rules (movement planning)                          │
//! │  └── on-hand ≥ requested, duplicate reference                           │
//! │                                                                         │
//! │  Layer 3: Database constraints (stockroom-db)                           │
//! │  └── unique (product, variant, size), CHECK quantity >= 0               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every validator runs before any write; a failure means nothing changed.

use crate::error::ValidationError;
use crate::types::{ItemKey, TransactionReason, TransactionType};
use crate::{
    MAX_MOVEMENT_QUANTITY, MAX_ON_HAND_QUANTITY, MAX_REFERENCE_LEN, MAX_TARGET_PROFIT_BPS,
    MAX_UNIT_COST,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a movement or reservation quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_MOVEMENT_QUANTITY
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::validate_quantity;
///
/// assert!(validate_quantity(5).is_ok());
/// assert!(validate_quantity(0).is_err());
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_MOVEMENT_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_MOVEMENT_QUANTITY,
        });
    }

    Ok(())
}

/// Validates the target of an absolute stock adjustment (stocktake count).
pub fn validate_counted_quantity(qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "new quantity".to_string(),
        });
    }

    if qty > MAX_MOVEMENT_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "new quantity".to_string(),
            min: 0,
            max: MAX_MOVEMENT_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a unit cost. Zero is allowed (free samples, unknown returns).
pub fn validate_unit_cost(units: i64) -> ValidationResult<()> {
    if units < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "cost price".to_string(),
        });
    }

    if units > MAX_UNIT_COST {
        return Err(ValidationError::OutOfRange {
            field: "cost price".to_string(),
            min: 0,
            max: MAX_UNIT_COST,
        });
    }

    Ok(())
}

/// Validates the on-hand quantity a stock-in would leave behind.
pub fn validate_on_hand_after(on_hand: i64, incoming: i64) -> ValidationResult<()> {
    if on_hand.saturating_add(incoming) > MAX_ON_HAND_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity on hand".to_string(),
            min: 0,
            max: MAX_ON_HAND_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a discount in basis points (0% to 100%).
pub fn validate_discount(bps: i64) -> ValidationResult<()> {
    if !(0..=10_000).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: "percent discount".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

/// Validates a target profit in basis points.
pub fn validate_target_profit(bps: i64) -> ValidationResult<()> {
    if bps < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "target profit percent".to_string(),
        });
    }

    if bps > MAX_TARGET_PROFIT_BPS {
        return Err(ValidationError::OutOfRange {
            field: "target profit percent".to_string(),
            min: 0,
            max: MAX_TARGET_PROFIT_BPS,
        });
    }

    Ok(())
}

/// Validates a low-stock threshold.
pub fn validate_low_stock_threshold(threshold: i64) -> ValidationResult<()> {
    if threshold < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "low stock threshold".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates an external correlation reference (order id, PO number).
///
/// ## Returns
/// The trimmed reference.
pub fn validate_reference(reference: &str) -> ValidationResult<String> {
    let reference = reference.trim();

    if reference.is_empty() {
        return Err(ValidationError::Required {
            field: "reference".to_string(),
        });
    }

    if reference.len() > MAX_REFERENCE_LEN {
        return Err(ValidationError::TooLong {
            field: "reference".to_string(),
            max: MAX_REFERENCE_LEN,
        });
    }

    Ok(reference.to_string())
}

/// Validates that every part of an item key is present.
pub fn validate_item_key(key: &ItemKey) -> ValidationResult<()> {
    for (field, value) in [
        ("product id", &key.product_id),
        ("variant id", &key.variant_id),
        ("size", &key.size),
    ] {
        if value.trim().is_empty() {
            return Err(ValidationError::Required {
                field: field.to_string(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Ledger Vocabulary
// =============================================================================

/// Checks that a reason belongs to the movement type it is recorded under.
///
/// ## Rules
/// ```text
/// IN      restock, return, cancelled, delivery_failed, rollback, adjustment
/// OUT     sale, damage, adjustment
/// ADJUST  adjustment, damage
/// ```
pub fn validate_reason_for(
    kind: TransactionType,
    reason: TransactionReason,
) -> ValidationResult<()> {
    let allowed = TransactionReason::allowed_for(kind);
    if allowed.contains(&reason) {
        return Ok(());
    }

    Err(ValidationError::NotAllowed {
        field: format!("{} reason", kind),
        allowed: allowed.iter().map(|r| r.to_string()).collect(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
