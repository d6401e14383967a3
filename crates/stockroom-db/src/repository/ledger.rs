//! # Ledger Repository
//!
//! Append-only log of every stock movement.
//!
//! ## Write Path
//! Rows are only ever written inside the movement transaction opened by
//! [`InventoryItemRepository::apply_movement`](super::item::InventoryItemRepository::apply_movement),
//! so an item update never commits without its ledger row. Triggers in the
//! schema reject UPDATE and DELETE.
//!
//! ## Duplicate Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Lookup key: (item, type, reason, reference)                            │
//! │                                                                         │
//! │  restock/return/damage/...   any earlier row with the key → duplicate   │
//! │                                                                         │
//! │  sale OUT  ◄──► rollback IN  (same item + reference)                    │
//! │    Only the most recent row of the pair counts:                         │
//! │      OUT sale                    → second OUT sale is a duplicate       │
//! │      OUT sale, IN rollback       → OUT sale allowed again (saga retry)  │
//! │      OUT sale, IN rollback       → second IN rollback is a duplicate    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use stockroom_core::{InventoryTransaction, TransactionReason, TransactionType};

/// Repository for ledger reads.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Gets a ledger row by its id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<InventoryTransaction>> {
        let row = sqlx::query_as::<_, InventoryTransaction>(
            "SELECT * FROM inventory_transactions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Every movement of an item in commit order.
    pub async fn list_for_item(&self, item_id: &str) -> DbResult<Vec<InventoryTransaction>> {
        let rows = sqlx::query_as::<_, InventoryTransaction>(
            r#"
            SELECT * FROM inventory_transactions
            WHERE inventory_item_id = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Every movement recorded against an external reference (order id).
    pub async fn list_by_reference(&self, reference: &str) -> DbResult<Vec<InventoryTransaction>> {
        let rows = sqlx::query_as::<_, InventoryTransaction>(
            r#"
            SELECT * FROM inventory_transactions
            WHERE reference = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Runs the duplicate guard outside a movement (diagnostics, tests).
    pub async fn find_duplicate(
        &self,
        item_id: &str,
        kind: TransactionType,
        reason: TransactionReason,
        reference: &str,
    ) -> DbResult<Option<InventoryTransaction>> {
        let mut conn = self.pool.acquire().await?;
        find_duplicate_in(&mut conn, item_id, kind, reason, reference).await
    }

    /// Number of ledger rows for an item.
    pub async fn count_for_item(&self, item_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM inventory_transactions WHERE inventory_item_id = ?1",
        )
        .bind(item_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// =============================================================================
// Transaction-Scoped Helpers
// =============================================================================

/// Appends a ledger row and returns its sequence number.
pub(crate) async fn insert_entry(
    conn: &mut SqliteConnection,
    entry: &InventoryTransaction,
) -> DbResult<i64> {
    debug!(
        id = %entry.id,
        item_id = %entry.inventory_item_id,
        kind = %entry.transaction_type,
        change = entry.quantity_change,
        "Appending ledger row"
    );

    let result = sqlx::query(
        r#"
        INSERT INTO inventory_transactions (
            id, inventory_item_id, transaction_type,
            quantity_before, quantity_change, quantity_after,
            cost_price, average_cost_price_before, average_cost_price_after, total_cost,
            target_profit_bps, discount_bps, base_price, final_price,
            profit_per_item, margin_bps, markup_bps,
            reason, reference, performed_by, notes, created_at
        ) VALUES (
            ?1, ?2, ?3,
            ?4, ?5, ?6,
            ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14,
            ?15, ?16, ?17,
            ?18, ?19, ?20, ?21, ?22
        )
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.inventory_item_id)
    .bind(entry.transaction_type)
    .bind(entry.quantity_before)
    .bind(entry.quantity_change)
    .bind(entry.quantity_after)
    .bind(entry.cost_price)
    .bind(entry.average_cost_price_before)
    .bind(entry.average_cost_price_after)
    .bind(entry.total_cost)
    .bind(entry.target_profit_bps)
    .bind(entry.discount_bps)
    .bind(entry.base_price)
    .bind(entry.final_price)
    .bind(entry.profit_per_item)
    .bind(entry.margin_bps)
    .bind(entry.markup_bps)
    .bind(entry.reason)
    .bind(&entry.reference)
    .bind(&entry.performed_by)
    .bind(&entry.notes)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Looks up an earlier movement that makes this one a duplicate.
pub(crate) async fn find_duplicate_in(
    conn: &mut SqliteConnection,
    item_id: &str,
    kind: TransactionType,
    reason: TransactionReason,
    reference: &str,
) -> DbResult<Option<InventoryTransaction>> {
    let (other_kind, other_reason) = reason.saga_counterpart().unwrap_or((kind, reason));

    let latest = sqlx::query_as::<_, InventoryTransaction>(
        r#"
        SELECT * FROM inventory_transactions
        WHERE inventory_item_id = ?1
          AND reference = ?2
          AND ((transaction_type = ?3 AND reason = ?4)
            OR (transaction_type = ?5 AND reason = ?6))
        ORDER BY seq DESC
        LIMIT 1
        "#,
    )
    .bind(item_id)
    .bind(reference)
    .bind(kind)
    .bind(reason)
    .bind(other_kind)
    .bind(other_reason)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(latest.filter(|row| row.transaction_type == kind && row.reason == reason))
}
