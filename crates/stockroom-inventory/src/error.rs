//! # Inventory Error Types
//!
//! Error types for the inventory services.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Inventory Error Categories                          │
//! │                                                                         │
//! │  ┌─────────────────────────┐  ┌─────────────────┐  ┌─────────────────┐ │
//! │  │  Domain (CoreError)     │  │   Storage       │  │  Collaborators  │ │
//! │  │                         │  │                 │  │                 │ │
//! │  │  NotFound               │  │  Database       │  │  Timeout        │ │
//! │  │  InsufficientStock      │  │  Concurrency-   │  │  Collaborator   │ │
//! │  │  ReservationUnavailable │  │    Conflict     │  │                 │ │
//! │  │  DuplicateTransaction   │  │                 │  │                 │ │
//! │  │  Validation             │  │                 │  │                 │ │
//! │  └─────────────────────────┘  └─────────────────┘  └─────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │  Config         │  ConfigError (file, parse, invalid value)         │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Domain errors are returned before anything is written. Storage and
//! collaborator errors may surface mid-saga, after compensation ran.

use thiserror::Error;

use stockroom_core::{CoreError, ValidationError};
use stockroom_db::DbError;

/// Result type alias for inventory operations.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Inventory service error.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// An inventory rule rejected the operation.
    #[error(transparent)]
    Core(CoreError),

    /// The store failed.
    #[error("Database error: {0}")]
    Database(DbError),

    /// The version check kept failing under concurrent writers.
    #[error("Inventory item {item_id} kept changing; gave up after {attempts} attempts")]
    ConcurrencyConflict { item_id: String, attempts: u32 },

    /// A collaborator did not answer in time.
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// A collaborator answered with an error.
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A background task is no longer listening.
    #[error("Channel error: {0}")]
    ChannelClosed(String),
}

impl InventoryError {
    /// The domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            InventoryError::Core(err) => Some(err),
            _ => None,
        }
    }

    /// True when a duplicate reference was rejected.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, InventoryError::Core(CoreError::DuplicateTransaction { .. }))
    }

    /// True for lookup failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, InventoryError::Core(CoreError::NotFound { .. }))
    }
}

impl From<CoreError> for InventoryError {
    fn from(err: CoreError) -> Self {
        InventoryError::Core(err)
    }
}

impl From<ValidationError> for InventoryError {
    fn from(err: ValidationError) -> Self {
        InventoryError::Core(CoreError::Validation(err))
    }
}

/// Store lookups that miss are domain `NotFound`, not storage failures.
impl From<DbError> for InventoryError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => InventoryError::Core(CoreError::NotFound { entity, id }),
            other => InventoryError::Database(other),
        }
    }
}

// =============================================================================
// Collaborator Errors
// =============================================================================

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The collaborator is down or refused the call.
    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    /// The collaborator answered with something unusable.
    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse { service: String, message: String },
}

impl CollaboratorError {
    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        CollaboratorError::Unavailable {
            service: service.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting has an unusable value.
    #[error("Invalid inventory configuration: {0}")]
    Invalid(String),

    /// The config file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be written back as TOML.
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No path was given and the platform has no config directory.
    #[error("No config path available")]
    NoConfigPath,
}
