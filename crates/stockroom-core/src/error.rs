//! # Error Types
//!
//! Domain-specific error types for stockroom-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockroom-core errors (this file)                                     │
//! │  ├── CoreError        - Inventory rule violations                      │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockroom-db errors                                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  stockroom-inventory errors                                            │
//! │  └── InventoryError   - What collaborators see                         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → InventoryError ← DbError          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (SKU, size, reference)
//! 3. Order-facing messages name the product/size that is unavailable

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Inventory rule violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Inventory item or SKU cannot be found.
    ///
    /// ## When This Occurs
    /// - The variant subsystem has not assigned a SKU to the size yet
    /// - The size was removed from its variant (item retired)
    /// - An item id does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// On-hand quantity is below the requested quantity.
    ///
    /// ## User Workflow
    /// ```text
    /// Shipper assigned to order (needs 5 × SHIRT-RED-M)
    ///      │
    ///      ▼
    /// Pre-validate on-hand: quantity = 3
    ///      │
    ///      ▼
    /// InsufficientStock { item: "SHIRT-RED-M (size M)", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Order page shows: "Only 3 left of SHIRT-RED-M (size M)"
    /// ```
    #[error("Insufficient stock for {item}: available {available}, requested {requested}")]
    InsufficientStock {
        item: String,
        available: i64,
        requested: i64,
    },

    /// Available quantity (on-hand minus reserved) is below the request.
    #[error("Cannot reserve {requested} of {item}: only {available} available")]
    ReservationUnavailable {
        item: String,
        available: i64,
        requested: i64,
    },

    /// A movement with the same idempotency key was already applied.
    ///
    /// ## When This Occurs
    /// - Webhook replays
    /// - Double-submitted admin forms
    /// - A retried fulfillment request
    #[error("Duplicate transaction for reference '{reference}' (existing transaction {existing_id})")]
    DuplicateTransaction {
        existing_id: String,
        reference: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any state is touched; the exact reason is returned to the
/// administrative caller per item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., unknown ledger reason).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
