//! # Compensation Queue Repository
//!
//! Outbox for saga compensations that could not be applied.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  deductForOrder                                                         │
//! │    line A deducted, line B fails                                        │
//! │    rollback stock-in for A fails too                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT INTO compensation_queue (item A, qty, unit cost, order id)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMPENSATION WORKER (background)                                      │
//! │    1. SELECT unresolved rows with attempts < max                        │
//! │    2. stock-in (reason rollback, reference order id)                   │
//! │       a. applied or duplicate → resolved_at = NOW()                     │
//! │       b. failed               → attempts += 1, last_error = ?           │
//! │                                                                         │
//! │  Rows past max attempts stay unresolved for manual reconciliation.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockroom_core::CompensationEntry;

/// A compensation to be queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCompensation {
    pub inventory_item_id: String,
    pub quantity: i64,
    pub unit_cost: i64,
    pub reference: String,
    pub performed_by: Option<String>,
    pub failure: String,
    /// Error of the compensation attempt made inside the saga.
    pub first_error: String,
}

/// Repository for compensation outbox operations.
#[derive(Debug, Clone)]
pub struct CompensationQueueRepository {
    pool: SqlitePool,
}

impl CompensationQueueRepository {
    /// Creates a new CompensationQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CompensationQueueRepository { pool }
    }

    /// Queues a failed compensation. The saga's own attempt counts as the first.
    pub async fn enqueue(&self, new: NewCompensation) -> DbResult<CompensationEntry> {
        let now = Utc::now();

        debug!(
            item_id = %new.inventory_item_id,
            reference = %new.reference,
            quantity = new.quantity,
            "Queuing compensation"
        );

        let entry = CompensationEntry {
            id: Uuid::new_v4().to_string(),
            inventory_item_id: new.inventory_item_id,
            quantity: new.quantity,
            unit_cost: new.unit_cost,
            reference: new.reference,
            performed_by: new.performed_by,
            failure: new.failure,
            attempts: 1,
            last_error: Some(new.first_error),
            created_at: now,
            attempted_at: Some(now),
            resolved_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO compensation_queue (
                id, inventory_item_id, quantity, unit_cost, reference,
                performed_by, failure, attempts, last_error,
                created_at, attempted_at, resolved_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9,
                ?10, ?11, ?12
            )
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.inventory_item_id)
        .bind(entry.quantity)
        .bind(entry.unit_cost)
        .bind(&entry.reference)
        .bind(&entry.performed_by)
        .bind(&entry.failure)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.attempted_at)
        .bind(entry.resolved_at)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Unresolved entries that still have attempts left, oldest first.
    pub async fn get_retryable(&self, max_attempts: u32, limit: u32) -> DbResult<Vec<CompensationEntry>> {
        let entries = sqlx::query_as::<_, CompensationEntry>(
            r#"
            SELECT * FROM compensation_queue
            WHERE resolved_at IS NULL AND attempts < ?1
            ORDER BY created_at ASC
            LIMIT ?2
            "#,
        )
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Every unresolved entry, including exhausted ones.
    pub async fn list_unresolved(&self) -> DbResult<Vec<CompensationEntry>> {
        let entries = sqlx::query_as::<_, CompensationEntry>(
            r#"
            SELECT * FROM compensation_queue
            WHERE resolved_at IS NULL
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Marks an entry as applied.
    pub async fn mark_resolved(&self, id: &str, now: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE compensation_queue SET
                resolved_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Compensation entry", id));
        }

        Ok(())
    }

    /// Records a failed retry.
    pub async fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE compensation_queue SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Compensation entry", id));
        }

        Ok(())
    }

    /// Counts unresolved entries.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM compensation_queue WHERE resolved_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
