//! # Inventory Item Repository
//!
//! The Item Store: one stock record per (product, variant, size).
//!
//! ## Movement Write (version compare-and-swap)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  read item (version = v)         ── outside the transaction            │
//! │  plan movement (stockroom-core)                                         │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    UPDATE inventory_items SET ..., version = v + 1                     │
//! │      WHERE id = ? AND version = v AND is_active = 1                    │
//! │      0 rows → ROLLBACK, Stale (caller re-reads and re-plans)           │
//! │    duplicate guard lookup                                               │
//! │      hit    → ROLLBACK, Duplicate                                       │
//! │    INSERT ledger row                                                    │
//! │    sale OUT: consume the order's hold / rollback IN: restore it         │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The UPDATE runs first so the transaction holds SQLite's write lock before
//! it reads anything; a deferred read upgraded to a write can fail outright
//! under WAL.
//!
//! `reserved_quantity` is only written through the reservation repository's
//! helpers, so a sale and the hold it consumes land in one commit.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::{ledger, reservation};
use stockroom_core::{
    InventoryItem, InventoryTransaction, ItemKey, MovementPlan, TransactionReason, TransactionType,
};

/// Result of a compare-and-swap movement write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovementOutcome {
    /// Committed; the item as stored and the ledger row with its `seq`.
    Applied {
        item: InventoryItem,
        transaction: InventoryTransaction,
    },
    /// The item changed (or was retired) after it was read.
    Stale,
    /// The duplicate guard found an earlier movement; nothing was written.
    Duplicate(InventoryTransaction),
}

/// Repository for inventory item operations.
#[derive(Debug, Clone)]
pub struct InventoryItemRepository {
    pool: SqlitePool,
}

impl InventoryItemRepository {
    /// Creates a new InventoryItemRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryItemRepository { pool }
    }

    /// Gets an item by its id, active or retired.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<InventoryItem>> {
        let item = sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    /// Gets an item by its business key, active or retired.
    pub async fn find_by_key(&self, key: &ItemKey) -> DbResult<Option<InventoryItem>> {
        let item = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT * FROM inventory_items
            WHERE product_id = ?1 AND variant_id = ?2 AND size = ?3
            "#,
        )
        .bind(&key.product_id)
        .bind(&key.variant_id)
        .bind(&key.size)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Inserts `item` unless its key already exists, then returns the stored row.
    ///
    /// ## Concurrency
    /// Two callers racing on the same key both get the single row that won.
    /// A retired row is reactivated: the size was assigned again.
    pub async fn insert_if_absent(&self, item: &InventoryItem) -> DbResult<InventoryItem> {
        debug!(key = %item.key(), sku = %item.sku, "Get-or-create inventory item");

        sqlx::query(
            r#"
            INSERT INTO inventory_items (
                id, product_id, variant_id, size, sku,
                quantity, reserved_quantity,
                cost_price, average_cost_price, selling_price,
                discount_bps, final_price, target_profit_bps,
                low_stock_threshold, is_active, version,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7,
                ?8, ?9, ?10,
                ?11, ?12, ?13,
                ?14, ?15, ?16,
                ?17, ?18
            )
            ON CONFLICT (product_id, variant_id, size) DO UPDATE SET
                is_active = 1,
                version = inventory_items.version + 1,
                updated_at = excluded.updated_at
            WHERE inventory_items.is_active = 0
            "#,
        )
        .bind(&item.id)
        .bind(&item.product_id)
        .bind(&item.variant_id)
        .bind(&item.size)
        .bind(&item.sku)
        .bind(item.quantity)
        .bind(item.reserved_quantity)
        .bind(item.cost_price)
        .bind(item.average_cost_price)
        .bind(item.selling_price)
        .bind(item.discount_bps)
        .bind(item.final_price)
        .bind(item.target_profit_bps)
        .bind(item.low_stock_threshold)
        .bind(item.is_active)
        .bind(item.version)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        let stored = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT * FROM inventory_items
            WHERE product_id = ?1 AND variant_id = ?2 AND size = ?3
            "#,
        )
        .bind(&item.product_id)
        .bind(&item.variant_id)
        .bind(&item.size)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    /// Active items of a product.
    pub async fn find_by_product(&self, product_id: &str) -> DbResult<Vec<InventoryItem>> {
        let items = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT * FROM inventory_items
            WHERE product_id = ?1 AND is_active = 1
            ORDER BY variant_id, size
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Active items (sizes) of a variant.
    pub async fn find_by_variant(&self, variant_id: &str) -> DbResult<Vec<InventoryItem>> {
        let items = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT * FROM inventory_items
            WHERE variant_id = ?1 AND is_active = 1
            ORDER BY size
            "#,
        )
        .bind(variant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Active items at or below their own threshold, emptiest first.
    pub async fn list_low_stock(&self, limit: u32) -> DbResult<Vec<InventoryItem>> {
        let items = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT * FROM inventory_items
            WHERE is_active = 1 AND quantity <= low_stock_threshold
            ORDER BY quantity ASC, sku ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Applies a planned movement with a version check.
    ///
    /// The duplicate guard runs for IN and OUT movements that carry a
    /// reference. A referenced sale consumes the order's hold on the item and
    /// a referenced rollback restores it.
    pub async fn apply_movement(&self, plan: &MovementPlan) -> DbResult<MovementOutcome> {
        let item = &plan.item;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE inventory_items SET
                quantity = ?1,
                cost_price = ?2,
                average_cost_price = ?3,
                selling_price = ?4,
                discount_bps = ?5,
                final_price = ?6,
                target_profit_bps = ?7,
                updated_at = ?8,
                version = version + 1
            WHERE id = ?9 AND version = ?10 AND is_active = 1
            "#,
        )
        .bind(item.quantity)
        .bind(item.cost_price)
        .bind(item.average_cost_price)
        .bind(item.selling_price)
        .bind(item.discount_bps)
        .bind(item.final_price)
        .bind(item.target_profit_bps)
        .bind(item.updated_at)
        .bind(&item.id)
        .bind(item.version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(id = %item.id, version = item.version, "Stale item version");
            return Ok(MovementOutcome::Stale);
        }

        if let Some(reference) = plan.reference() {
            if plan.kind() != TransactionType::Adjust {
                let duplicate =
                    ledger::find_duplicate_in(&mut tx, &item.id, plan.kind(), plan.reason(), reference)
                        .await?;
                if let Some(existing) = duplicate {
                    tx.rollback().await?;
                    return Ok(MovementOutcome::Duplicate(existing));
                }
            }
        }

        let mut transaction = plan.transaction.clone();
        transaction.seq = ledger::insert_entry(&mut tx, &transaction).await?;

        if let Some(reference) = plan.reference() {
            match (plan.kind(), plan.reason()) {
                (TransactionType::Out, TransactionReason::Sale) => {
                    reservation::consume_in(&mut tx, &item.id, reference, item.updated_at).await?;
                }
                (TransactionType::In, TransactionReason::Rollback) => {
                    reservation::restore_in(&mut tx, &item.id, reference).await?;
                }
                _ => {}
            }
        }

        let stored = sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items WHERE id = ?1")
            .bind(&item.id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(MovementOutcome::Applied {
            item: stored,
            transaction,
        })
    }

    /// Marks an item inactive; it stays for history and references.
    ///
    /// Returns `false` if the item does not exist.
    pub async fn retire(&self, id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items SET
                is_active = 0,
                updated_at = ?2,
                version = version + 1
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes an item only while it holds no stock and no reservations.
    ///
    /// Returns whether a row was deleted. Ledger rows are kept.
    pub async fn delete_if_empty(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM inventory_items
            WHERE id = ?1 AND quantity = 0 AND reserved_quantity = 0
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Counts active items (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inventory_items WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use stockroom_core::movement::{plan_adjust, plan_stock_in, plan_stock_out};
    use stockroom_core::{AdjustRequest, Money, StockInRequest, StockOutRequest, TransactionReason};

    async fn seeded(db: &Database) -> InventoryItem {
        let item = InventoryItem::new(&ItemKey::new("p1", "v1", "M"), "TEE-BLK-M", 10, Utc::now());
        db.items().insert_if_absent(&item).await.unwrap()
    }

    async fn restock(db: &Database, item: &InventoryItem, qty: i64, cost: i64) -> InventoryItem {
        let plan = plan_stock_in(item, &StockInRequest::restock(qty, Money::from_units(cost)), Utc::now())
            .unwrap();
        match db.items().apply_movement(&plan).await.unwrap() {
            MovementOutcome::Applied { item, .. } => item,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_get_or_create() {
        let db = Database::in_memory().await.unwrap();
        let first = seeded(&db).await;

        let again = InventoryItem::new(&ItemKey::new("p1", "v1", "M"), "OTHER-SKU", 3, Utc::now());
        let stored = db.items().insert_if_absent(&again).await.unwrap();

        assert_eq!(stored.id, first.id);
        assert_eq!(stored.sku, "TEE-BLK-M");
        assert_eq!(db.items().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_apply_movement_bumps_version_and_appends_ledger() {
        let db = Database::in_memory().await.unwrap();
        let item = seeded(&db).await;

        let plan = plan_stock_in(&item, &StockInRequest::restock(10, Money::from_units(100)), Utc::now())
            .unwrap();
        let outcome = db.items().apply_movement(&plan).await.unwrap();

        let MovementOutcome::Applied { item: stored, transaction } = outcome else {
            panic!("movement not applied");
        };
        assert_eq!(stored.quantity, 10);
        assert_eq!(stored.version, item.version + 1);
        assert!(transaction.seq > 0);

        let history = db.ledger().list_for_item(&item.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, transaction.id);
        assert_eq!(history[0].quantity_after, 10);
    }

    #[tokio::test]
    async fn test_stale_version_writes_nothing() {
        let db = Database::in_memory().await.unwrap();
        let item = seeded(&db).await;
        restock(&db, &item, 5, 100).await;

        // `item` still carries the version before the restock.
        let plan = plan_adjust(&item, &AdjustRequest::new(1, TransactionReason::Adjustment), Utc::now())
            .unwrap();
        assert_eq!(db.items().apply_movement(&plan).await.unwrap(), MovementOutcome::Stale);

        let stored = db.items().get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 5);
        assert_eq!(db.ledger().count_for_item(&item.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_reference_is_rejected_inside_transaction() {
        let db = Database::in_memory().await.unwrap();
        let item = seeded(&db).await;
        let item = restock(&db, &item, 10, 100).await;

        let request = StockOutRequest::new(2, TransactionReason::Sale).reference("order-1");
        let plan = plan_stock_out(&item, &request, Utc::now()).unwrap();
        let MovementOutcome::Applied { item, transaction } = db.items().apply_movement(&plan).await.unwrap()
        else {
            panic!("first sale not applied");
        };

        let plan = plan_stock_out(&item, &request, Utc::now()).unwrap();
        let outcome = db.items().apply_movement(&plan).await.unwrap();
        assert!(matches!(outcome, MovementOutcome::Duplicate(ref existing) if existing.id == transaction.id));

        let stored = db.items().get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 8);
        assert_eq!(stored.version, item.version);
    }

    #[tokio::test]
    async fn test_retired_item_rejects_movement_and_can_be_deleted_when_empty() {
        let db = Database::in_memory().await.unwrap();
        let item = seeded(&db).await;
        let item = restock(&db, &item, 3, 100).await;

        assert!(db.items().retire(&item.id, Utc::now()).await.unwrap());
        assert!(db.items().find_by_product("p1").await.unwrap().is_empty());

        let plan = plan_stock_out(&item, &StockOutRequest::new(1, TransactionReason::Damage), Utc::now())
            .unwrap();
        assert_eq!(db.items().apply_movement(&plan).await.unwrap(), MovementOutcome::Stale);

        assert!(!db.items().delete_if_empty(&item.id).await.unwrap());

        let empty = seeded(&db).await;
        assert!(empty.is_active, "re-assigned size reactivates the record");
    }

    #[tokio::test]
    async fn test_low_stock_listing() {
        let db = Database::in_memory().await.unwrap();
        let item = seeded(&db).await;
        restock(&db, &item, 50, 10).await;

        let small = InventoryItem::new(&ItemKey::new("p1", "v1", "S"), "TEE-BLK-S", 10, Utc::now());
        let small = db.items().insert_if_absent(&small).await.unwrap();
        restock(&db, &small, 4, 10).await;

        let low = db.items().list_low_stock(10).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].sku, "TEE-BLK-S");

        let sizes = db.items().find_by_variant("v1").await.unwrap();
        assert_eq!(sizes.iter().map(|i| i.size.as_str()).collect::<Vec<_>>(), ["M", "S"]);
    }
}
