//! # Inventory Item Store
//!
//! Lookups and lazy creation of stock records.
//!
//! ## Get-or-Create
//! ```text
//! get_or_create(product, variant, size)
//!      │
//!      ├── active row exists ─────────────► return it
//!      │
//!      ├── VariantCatalog::sku_for(key) ───► None ──► NotFound("SKU")
//!      │
//!      └── insert_if_absent(quantity 0, costs 0, default threshold)
//!            (a retired row for the key is reactivated instead)
//! ```

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use stockroom_core::validation::validate_item_key;
use stockroom_core::{CoreError, InventoryItem, ItemKey};
use stockroom_db::Database;

use crate::collaborators::{bounded, VariantCatalog};
use crate::error::InventoryResult;

/// Item Store service over the item repository and the variant catalog.
#[derive(Clone)]
pub struct InventoryItemStore {
    db: Database,
    catalog: Arc<dyn VariantCatalog>,
    default_low_stock_threshold: i64,
    collaborator_timeout: Duration,
}

impl InventoryItemStore {
    pub fn new(
        db: Database,
        catalog: Arc<dyn VariantCatalog>,
        default_low_stock_threshold: i64,
        collaborator_timeout: Duration,
    ) -> Self {
        InventoryItemStore {
            db,
            catalog,
            default_low_stock_threshold,
            collaborator_timeout,
        }
    }

    /// Returns the active item for a key, creating it on first reference.
    ///
    /// ## Errors
    /// * `NotFound` - the variant subsystem has not assigned a SKU
    /// * `Timeout` - the variant catalog did not answer in time
    pub async fn get_or_create(&self, key: &ItemKey) -> InventoryResult<InventoryItem> {
        validate_item_key(key)?;

        if let Some(item) = self.db.items().find_by_key(key).await? {
            if item.is_active {
                return Ok(item);
            }
            debug!(key = %key, "Item retired; checking whether the size was reassigned");
        }

        let sku = bounded(
            "variant catalog lookup",
            self.collaborator_timeout,
            self.catalog.sku_for(key),
        )
        .await?
        .ok_or_else(|| CoreError::not_found("SKU", key.to_string()))?;

        let candidate = InventoryItem::new(key, sku, self.default_low_stock_threshold, Utc::now());
        let item = self.db.items().insert_if_absent(&candidate).await?;

        if item.id == candidate.id {
            info!(id = %item.id, sku = %item.sku, key = %key, "Inventory item created");
        }

        Ok(item)
    }

    /// Item for a key, active or retired.
    pub async fn find(&self, key: &ItemKey) -> InventoryResult<Option<InventoryItem>> {
        Ok(self.db.items().find_by_key(key).await?)
    }

    /// Item by id, active or retired.
    ///
    /// ## Errors
    /// * `NotFound` - no such item
    pub async fn get(&self, id: &str) -> InventoryResult<InventoryItem> {
        self.db
            .items()
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Inventory item", id).into())
    }

    /// Active item for a key.
    ///
    /// ## Errors
    /// * `NotFound` - missing or retired
    pub async fn get_active(&self, key: &ItemKey) -> InventoryResult<InventoryItem> {
        match self.db.items().find_by_key(key).await? {
            Some(item) if item.is_active => Ok(item),
            _ => Err(CoreError::not_found("Inventory item", key.to_string()).into()),
        }
    }

    pub async fn find_by_product(&self, product_id: &str) -> InventoryResult<Vec<InventoryItem>> {
        Ok(self.db.items().find_by_product(product_id).await?)
    }

    pub async fn find_by_variant(&self, variant_id: &str) -> InventoryResult<Vec<InventoryItem>> {
        Ok(self.db.items().find_by_variant(variant_id).await?)
    }

    pub async fn list_low_stock(&self, limit: u32) -> InventoryResult<Vec<InventoryItem>> {
        Ok(self.db.items().list_low_stock(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticVariantCatalog;

    async fn store(catalog: StaticVariantCatalog) -> InventoryItemStore {
        let db = Database::in_memory().await.unwrap();
        InventoryItemStore::new(db, Arc::new(catalog), 10, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_get_or_create_is_lazy_and_stable() {
        let key = ItemKey::new("p1", "v1", "M");
        let store = store(StaticVariantCatalog::new().with_sku(key.clone(), "TEE-BLK-M")).await;

        let first = store.get_or_create(&key).await.unwrap();
        assert_eq!(first.quantity, 0);
        assert_eq!(first.average_cost_price, 0);
        assert_eq!(first.low_stock_threshold, 10);
        assert_eq!(first.sku, "TEE-BLK-M");

        let second = store.get_or_create(&key).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_unassigned_size_is_not_found() {
        let store = store(StaticVariantCatalog::new()).await;
        let err = store
            .get_or_create(&ItemKey::new("p1", "v1", "XXL"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_blank_key_is_rejected() {
        let store = store(StaticVariantCatalog::new()).await;
        let err = store.get_or_create(&ItemKey::new("p1", "", "M")).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_get_unknown_id() {
        let store = store(StaticVariantCatalog::new()).await;
        assert!(store.get("missing").await.unwrap_err().is_not_found());
    }
}
