//! # stockroom-core: Pure Inventory Logic
//!
//! This crate is the **heart** of the inventory core. Everything that decides
//! *what* a stock movement does lives here as pure functions; the database and
//! service crates only decide *when* and *where* it is persisted.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Stockroom Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Collaborators (orders, admin surface, catalog)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   stockroom-inventory: executor, reservations, saga, projector  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ stockroom-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌─────────┐  │   │
//! │  │  │  money  │ │ pricing │ │ costing │ │ movement │ │ stock_  │  │   │
//! │  │  │ Percent │ │ Calc.   │ │ W.A.C.  │ │ planning │ │ status  │  │   │
//! │  │  └─────────┘ └─────────┘ └─────────┘ └──────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │           stockroom-db: SQLite item store and ledger            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Inventory items, ledger rows, reservations, orders
//! - [`money`] - Integer money and basis-point percentages
//! - [`pricing`] - Pricing Calculator (cost + margin target + discount)
//! - [`costing`] - Weighted-average cost blending
//! - [`movement`] - Pure planning of stock-in / stock-out / adjust
//! - [`stock_status`] - Per-product stock-status rollup
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use stockroom_core::money::{Money, Percent};
//! use stockroom_core::pricing::calculate_pricing;
//!
//! let pricing = calculate_pricing(
//!     Money::from_units(150),
//!     Percent::from_percent(30),
//!     Percent::zero(),
//! )
//! .unwrap();
//!
//! assert_eq!(pricing.base_price.units(), 195);
//! assert_eq!(pricing.final_price.units(), 195);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod costing;
pub mod error;
pub mod money;
pub mod movement;
pub mod pricing;
pub mod stock_status;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, Percent};
pub use movement::{AdjustRequest, MovementPlan, StockInRequest, StockOutRequest};
pub use pricing::PricingBreakdown;
pub use stock_status::{ProductStockInfo, StockStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Low-stock threshold given to newly created inventory items.
///
/// Items carry their own threshold, seeded from this value unless the
/// service configuration overrides it.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Largest quantity accepted by a single stock movement or reservation line.
pub const MAX_MOVEMENT_QUANTITY: i64 = 1_000_000;

/// Largest on-hand quantity a stock-in may leave on one item.
pub const MAX_ON_HAND_QUANTITY: i64 = 1_000_000_000;

/// Largest unit cost, in whole currency units.
///
/// With on-hand capped at [`MAX_ON_HAND_QUANTITY`], every cost × quantity
/// product stays below `i64::MAX`.
pub const MAX_UNIT_COST: i64 = 1_000_000_000;

/// Largest target profit, in basis points (10,000%).
pub const MAX_TARGET_PROFIT_BPS: i64 = 1_000_000;

/// Maximum length of an external correlation reference (order id, PO number).
pub const MAX_REFERENCE_LEN: usize = 100;
