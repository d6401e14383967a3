//! # Repository Module
//!
//! Database repository implementations for the inventory core.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stockroom-inventory services                                          │
//! │       │                                                                 │
//! │       │  db.items().apply_movement(&plan)                              │
//! │       ▼                                                                 │
//! │  InventoryItemRepository      Item Store + movement CAS                │
//! │  ReservationRepository        conditional reserve / release            │
//! │  LedgerRepository             append-only movement history             │
//! │  CompensationQueueRepository  failed compensations outbox              │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod compensation;
pub mod item;
pub mod ledger;
pub mod reservation;
