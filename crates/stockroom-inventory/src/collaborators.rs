//! # Collaborators
//!
//! Narrow interfaces to the systems around the inventory core.
//!
//! ## Boundaries
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Variant subsystem ──── VariantCatalog ─────► Item Store (get-or-create)│
//! │                         (key → SKU)                                     │
//! │                                                                         │
//! │  Order subsystem ────── OrderReferences ────► remove_size               │
//! │                         (is the size still on an order?)                │
//! │                                                                         │
//! │  Catalog cache ◄─────── StockStatusSink ◄──── Stock-status projector    │
//! │                         (ProductStockInfo)                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every call is wrapped in [`bounded`] by the services, so a hung
//! collaborator costs at most `concurrency.collaborator_timeout_ms`.
//!
//! The in-memory implementations back the tests and the seed binary.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;

use stockroom_core::{ItemKey, ProductStockInfo};

use crate::error::{CollaboratorError, InventoryError, InventoryResult};

// =============================================================================
// Traits
// =============================================================================

/// Resolves the SKU the variant subsystem assigned to a size.
#[async_trait]
pub trait VariantCatalog: Send + Sync {
    /// `None` while the size has no SKU yet.
    async fn sku_for(&self, key: &ItemKey) -> Result<Option<String>, CollaboratorError>;
}

/// Tells whether any order still points at a size.
#[async_trait]
pub trait OrderReferences: Send + Sync {
    async fn is_referenced(&self, key: &ItemKey) -> Result<bool, CollaboratorError>;
}

/// Receives recomputed product stock status (the catalog's cache).
#[async_trait]
pub trait StockStatusSink: Send + Sync {
    async fn publish(&self, info: &ProductStockInfo) -> Result<(), CollaboratorError>;
}

/// Runs a collaborator call with a deadline.
pub async fn bounded<T, F>(operation: &str, limit: Duration, call: F) -> InventoryResult<T>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(InventoryError::Timeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

// =============================================================================
// In-Memory Implementations
// =============================================================================

/// Variant catalog backed by a map.
#[derive(Debug, Default)]
pub struct StaticVariantCatalog {
    skus: RwLock<HashMap<ItemKey, String>>,
}

impl StaticVariantCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`assign`](Self::assign).
    pub fn with_sku(mut self, key: ItemKey, sku: impl Into<String>) -> Self {
        self.skus.get_mut().insert(key, sku.into());
        self
    }

    pub async fn assign(&self, key: ItemKey, sku: impl Into<String>) {
        self.skus.write().await.insert(key, sku.into());
    }

    pub async fn unassign(&self, key: &ItemKey) {
        self.skus.write().await.remove(key);
    }
}

#[async_trait]
impl VariantCatalog for StaticVariantCatalog {
    async fn sku_for(&self, key: &ItemKey) -> Result<Option<String>, CollaboratorError> {
        Ok(self.skus.read().await.get(key).cloned())
    }
}

/// Order references backed by a set of keys.
#[derive(Debug, Default)]
pub struct StaticOrderReferences {
    referenced: RwLock<HashSet<ItemKey>>,
}

impl StaticOrderReferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, key: ItemKey) {
        self.referenced.write().await.insert(key);
    }

    pub async fn remove(&self, key: &ItemKey) {
        self.referenced.write().await.remove(key);
    }
}

#[async_trait]
impl OrderReferences for StaticOrderReferences {
    async fn is_referenced(&self, key: &ItemKey) -> Result<bool, CollaboratorError> {
        Ok(self.referenced.read().await.contains(key))
    }
}

/// Keeps the latest stock status per product.
#[derive(Debug, Default)]
pub struct InMemoryStockStatusCache {
    latest: RwLock<HashMap<String, ProductStockInfo>>,
}

impl InMemoryStockStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, product_id: &str) -> Option<ProductStockInfo> {
        self.latest.read().await.get(product_id).cloned()
    }
}

#[async_trait]
impl StockStatusSink for InMemoryStockStatusCache {
    async fn publish(&self, info: &ProductStockInfo) -> Result<(), CollaboratorError> {
        self.latest
            .write()
            .await
            .insert(info.product_id.clone(), info.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hanging;

    #[async_trait]
    impl VariantCatalog for Hanging {
        async fn sku_for(&self, _key: &ItemKey) -> Result<Option<String>, CollaboratorError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_static_catalog() {
        let catalog = StaticVariantCatalog::new();
        let key = ItemKey::new("p1", "v1", "M");
        assert_eq!(catalog.sku_for(&key).await.unwrap(), None);

        catalog.assign(key.clone(), "TEE-M").await;
        assert_eq!(catalog.sku_for(&key).await.unwrap().as_deref(), Some("TEE-M"));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let key = ItemKey::new("p1", "v1", "M");
        let err = bounded("variant catalog", Duration::from_millis(20), Hanging.sku_for(&key))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Timeout { timeout_ms: 20, .. }));
    }

    #[tokio::test]
    async fn test_bounded_passes_errors_through() {
        let err = bounded::<(), _>("catalog cache", Duration::from_secs(1), async {
            Err(CollaboratorError::unavailable("catalog cache", "connection refused"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, InventoryError::Collaborator(_)));
    }
}
