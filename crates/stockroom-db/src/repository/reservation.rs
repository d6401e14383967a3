//! # Reservation Repository
//!
//! Holds units for pending orders without moving them.
//!
//! ## Atomic Reserve
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    UPDATE inventory_items                                               │
//! │       SET reserved_quantity = reserved_quantity + q                     │
//! │     WHERE id = ?                                                        │
//! │       AND is_active = 1                                                 │
//! │       AND quantity >= reserved_quantity + q                             │
//! │       AND no active reservation for (item, correlation)                 │
//! │    1 row → INSERT reservation (active)   COMMIT                         │
//! │    0 rows → inspect why (already held / retired / short)   ROLLBACK     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The guard and the increment are one statement, so concurrent reservers
//! can never push `reserved_quantity` past `quantity`.
//!
//! ## Release
//! Decrements by the amount on the active reservation row, clamped at zero,
//! and marks the row released. Releasing twice is a no-op.
//!
//! ## Consume / Restore
//! A sale OUT for an order consumes that order's hold inside the movement
//! transaction, so on-hand and reserved drop in the same commit. The rollback
//! IN that compensates the sale puts the hold back, guarded like a reserve.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockroom_core::{InventoryItem, InventoryReservation, ReservationStatus};

/// Result of a reserve attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Units are now held.
    Reserved(InventoryReservation),
    /// An active reservation for this order already holds the item.
    AlreadyReserved(InventoryReservation),
    /// Not enough unreserved stock; nothing changed.
    Unavailable { on_hand: i64, available: i64 },
    /// The item was retired; nothing changed.
    Inactive,
}

/// Repository for reservation operations.
#[derive(Debug, Clone)]
pub struct ReservationRepository {
    pool: SqlitePool,
}

impl ReservationRepository {
    /// Creates a new ReservationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReservationRepository { pool }
    }

    /// Reserves `quantity` units of an item for `correlation_id`.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - The item does not exist
    pub async fn reserve(
        &self,
        item_id: &str,
        correlation_id: &str,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> DbResult<ReserveOutcome> {
        debug!(item_id = %item_id, correlation_id = %correlation_id, quantity, "Reserving stock");

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE inventory_items SET
                reserved_quantity = reserved_quantity + ?1,
                updated_at = ?2
            WHERE id = ?3
              AND is_active = 1
              AND quantity >= reserved_quantity + ?1
              AND NOT EXISTS (
                  SELECT 1 FROM inventory_reservations
                  WHERE inventory_item_id = ?3
                    AND correlation_id = ?4
                    AND status = 'active'
              )
            "#,
        )
        .bind(quantity)
        .bind(now)
        .bind(item_id)
        .bind(correlation_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let existing = sqlx::query_as::<_, InventoryReservation>(
                r#"
                SELECT * FROM inventory_reservations
                WHERE inventory_item_id = ?1 AND correlation_id = ?2 AND status = 'active'
                "#,
            )
            .bind(item_id)
            .bind(correlation_id)
            .fetch_optional(&mut *tx)
            .await?;

            let item = sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items WHERE id = ?1")
                .bind(item_id)
                .fetch_optional(&mut *tx)
                .await?;

            tx.rollback().await?;

            return match (existing, item) {
                (_, None) => Err(DbError::not_found("Inventory item", item_id)),
                (Some(reservation), Some(_)) => Ok(ReserveOutcome::AlreadyReserved(reservation)),
                (None, Some(item)) if !item.is_active => Ok(ReserveOutcome::Inactive),
                (None, Some(item)) => Ok(ReserveOutcome::Unavailable {
                    on_hand: item.quantity,
                    available: item.available(),
                }),
            };
        }

        let reservation = InventoryReservation {
            id: Uuid::new_v4().to_string(),
            inventory_item_id: item_id.to_string(),
            correlation_id: correlation_id.to_string(),
            quantity,
            status: ReservationStatus::Active,
            created_at: now,
            released_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO inventory_reservations (
                id, inventory_item_id, correlation_id, quantity, status, created_at, released_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&reservation.id)
        .bind(&reservation.inventory_item_id)
        .bind(&reservation.correlation_id)
        .bind(reservation.quantity)
        .bind(reservation.status)
        .bind(reservation.created_at)
        .bind(reservation.released_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ReserveOutcome::Reserved(reservation))
    }

    /// Releases the active reservation of an item for `correlation_id`.
    ///
    /// ## Returns
    /// The released reservation, or `None` when nothing was held.
    pub async fn release(
        &self,
        item_id: &str,
        correlation_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<InventoryReservation>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE inventory_items SET
                reserved_quantity = MAX(reserved_quantity - (
                    SELECT quantity FROM inventory_reservations
                    WHERE inventory_item_id = ?1 AND correlation_id = ?2 AND status = 'active'
                ), 0),
                updated_at = ?3
            WHERE id = ?1
              AND EXISTS (
                  SELECT 1 FROM inventory_reservations
                  WHERE inventory_item_id = ?1 AND correlation_id = ?2 AND status = 'active'
              )
            "#,
        )
        .bind(item_id)
        .bind(correlation_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(item_id = %item_id, correlation_id = %correlation_id, "Nothing reserved to release");
            return Ok(None);
        }

        let mut reservation = sqlx::query_as::<_, InventoryReservation>(
            r#"
            SELECT * FROM inventory_reservations
            WHERE inventory_item_id = ?1 AND correlation_id = ?2 AND status = 'active'
            "#,
        )
        .bind(item_id)
        .bind(correlation_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE inventory_reservations SET
                status = 'released',
                released_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(&reservation.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        reservation.status = ReservationStatus::Released;
        reservation.released_at = Some(now);

        debug!(
            item_id = %item_id,
            correlation_id = %correlation_id,
            quantity = reservation.quantity,
            "Released reservation"
        );

        Ok(Some(reservation))
    }

    /// The active reservation of an item for an order, if any.
    pub async fn find_active(
        &self,
        item_id: &str,
        correlation_id: &str,
    ) -> DbResult<Option<InventoryReservation>> {
        let reservation = sqlx::query_as::<_, InventoryReservation>(
            r#"
            SELECT * FROM inventory_reservations
            WHERE inventory_item_id = ?1 AND correlation_id = ?2 AND status = 'active'
            "#,
        )
        .bind(item_id)
        .bind(correlation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reservation)
    }

    /// Every reservation row of an order, oldest first.
    pub async fn list_for_correlation(
        &self,
        correlation_id: &str,
    ) -> DbResult<Vec<InventoryReservation>> {
        let rows = sqlx::query_as::<_, InventoryReservation>(
            r#"
            SELECT * FROM inventory_reservations
            WHERE correlation_id = ?1
            ORDER BY created_at ASC
            "#,
        )
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// Consumes the active hold of `correlation_id` on an item.
///
/// Runs inside a movement transaction. Returns the consumed hold, if any.
pub(crate) async fn consume_in(
    conn: &mut SqliteConnection,
    item_id: &str,
    correlation_id: &str,
    now: DateTime<Utc>,
) -> DbResult<Option<InventoryReservation>> {
    let hold = sqlx::query_as::<_, InventoryReservation>(
        r#"
        SELECT * FROM inventory_reservations
        WHERE inventory_item_id = ?1 AND correlation_id = ?2 AND status = 'active'
        "#,
    )
    .bind(item_id)
    .bind(correlation_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(mut hold) = hold else {
        return Ok(None);
    };

    sqlx::query(
        r#"
        UPDATE inventory_items SET
            reserved_quantity = MAX(reserved_quantity - ?2, 0)
        WHERE id = ?1
        "#,
    )
    .bind(item_id)
    .bind(hold.quantity)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        UPDATE inventory_reservations SET
            status = 'consumed',
            released_at = ?2
        WHERE id = ?1
        "#,
    )
    .bind(&hold.id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    debug!(item_id = %item_id, correlation_id = %correlation_id, quantity = hold.quantity, "Hold consumed");

    hold.status = ReservationStatus::Consumed;
    hold.released_at = Some(now);
    Ok(Some(hold))
}

/// Re-activates the latest consumed hold of `correlation_id` on an item.
///
/// Runs inside a movement transaction, after on-hand was restored. The hold
/// comes back only while `quantity >= reserved_quantity + hold`; otherwise it
/// stays consumed.
pub(crate) async fn restore_in(
    conn: &mut SqliteConnection,
    item_id: &str,
    correlation_id: &str,
) -> DbResult<Option<InventoryReservation>> {
    let hold = sqlx::query_as::<_, InventoryReservation>(
        r#"
        SELECT * FROM inventory_reservations
        WHERE inventory_item_id = ?1 AND correlation_id = ?2 AND status = 'consumed'
          AND NOT EXISTS (
              SELECT 1 FROM inventory_reservations
              WHERE inventory_item_id = ?1 AND correlation_id = ?2 AND status = 'active'
          )
        ORDER BY released_at DESC
        LIMIT 1
        "#,
    )
    .bind(item_id)
    .bind(correlation_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(mut hold) = hold else {
        return Ok(None);
    };

    let result = sqlx::query(
        r#"
        UPDATE inventory_items SET
            reserved_quantity = reserved_quantity + ?2
        WHERE id = ?1
          AND quantity >= reserved_quantity + ?2
        "#,
    )
    .bind(item_id)
    .bind(hold.quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        debug!(item_id = %item_id, correlation_id = %correlation_id, "Hold not restored: stock taken meanwhile");
        return Ok(None);
    }

    sqlx::query(
        r#"
        UPDATE inventory_reservations SET
            status = 'active',
            released_at = NULL
        WHERE id = ?1
        "#,
    )
    .bind(&hold.id)
    .execute(&mut *conn)
    .await?;

    debug!(item_id = %item_id, correlation_id = %correlation_id, quantity = hold.quantity, "Hold restored");

    hold.status = ReservationStatus::Active;
    hold.released_at = None;
    Ok(Some(hold))
}

// =============================================================================
// Unit Tests
// =============================================================================
