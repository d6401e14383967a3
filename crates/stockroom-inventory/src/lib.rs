//! # stockroom-inventory: Inventory Services for Stockroom
//!
//! Orchestrates stock movements, reservations and order fulfillment on top of
//! the pure rules in `stockroom-core` and the stores in `stockroom-db`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Layers                                 │
//! │                                                                         │
//! │  Order component / admin surface / catalog                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              stockroom-inventory (THIS CRATE)                   │   │
//! │  │                                                                 │   │
//! │  │  InventoryService                                               │   │
//! │  │   ├── InventoryItemStore      get-or-create, lookups            │   │
//! │  │   ├── StockMovementExecutor   version CAS + retry               │   │
//! │  │   ├── ReservationManager      all-or-nothing holds              │   │
//! │  │   ├── FulfillmentSaga         deduct / compensate / restock     │   │
//! │  │   ├── StockStatusProjector    StockChanged → catalog cache      │   │
//! │  │   └── CompensationWorker      outbox retries with backoff       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                         │                                       │
//! │       ▼                         ▼                                       │
//! │  stockroom-core (pure)     stockroom-db (SQLite)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`service`] - The facade collaborators call
//! - [`store`] - Inventory Item Store
//! - [`movement`] - Stock Movement Executor
//! - [`reservation`] - Reservation Manager
//! - [`saga`] - Order Fulfillment Saga
//! - [`projection`] - Stock-status projection
//! - [`compensation`] - Compensation outbox worker
//! - [`collaborators`] - Traits for the systems around the core
//! - [`events`] - Stock change notifications
//! - [`config`] - TOML + environment configuration
//! - [`telemetry`] - Tracing setup
//! - [`error`] - Service error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod collaborators;
pub mod compensation;
pub mod config;
pub mod error;
pub mod events;
pub mod movement;
pub mod projection;
pub mod reservation;
pub mod saga;
pub mod service;
pub mod store;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use collaborators::{
    InMemoryStockStatusCache, OrderReferences, StaticOrderReferences, StaticVariantCatalog,
    StockStatusSink, VariantCatalog,
};
pub use compensation::{CompensationWorker, CompensationWorkerHandle, PassSummary};
pub use config::InventoryConfig;
pub use error::{CollaboratorError, ConfigError, InventoryError, InventoryResult};
pub use events::{StockChangeKind, StockChangeListener, StockChanged};
pub use movement::MovementReceipt;
pub use service::{Collaborators, InventoryService, SizeRemoval};
pub use telemetry::init_tracing;
