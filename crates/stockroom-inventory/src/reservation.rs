//! # Reservation Manager
//!
//! Holds stock for orders between placement and fulfillment.
//!
//! ## Multi-Line Reserve
//! ```text
//! reserve([A×2, B×1, A×1], "ORD-7")
//!      │  aggregate by key: A×3, B×1
//!      ▼
//!  A: conditional UPDATE reserved += 3 WHERE quantity >= reserved + 3  ✓
//!  B: conditional UPDATE reserved += 1 ...                             ✗
//!      │
//!      ▼
//!  release A (only what THIS call reserved)
//!  ReservationUnavailable { item: "B-SKU (size M)", available, requested }
//! ```
//!
//! Lines already actively reserved for the same order are left alone, both
//! on success and when undoing a failed call.

use chrono::Utc;
use tracing::{debug, info, warn};

use stockroom_core::validation::{validate_quantity, validate_reference};
use stockroom_core::{CoreError, InventoryReservation, ItemKey, LineItem};
use stockroom_db::{Database, ReserveOutcome};

use crate::error::InventoryResult;
use crate::events::{SharedListener, StockChangeKind, StockChanged};
use crate::store::InventoryItemStore;

/// Sums quantities per key, keeping first-seen order.
pub(crate) fn aggregate_lines(lines: &[LineItem]) -> InventoryResult<Vec<(ItemKey, i64)>> {
    let mut totals: Vec<(ItemKey, i64)> = Vec::new();

    for line in lines {
        validate_quantity(line.quantity)?;
        match totals.iter_mut().find(|(key, _)| *key == line.key) {
            Some((_, total)) => *total += line.quantity,
            None => totals.push((line.key.clone(), line.quantity)),
        }
    }

    Ok(totals)
}

/// Reservation Manager.
#[derive(Clone)]
pub struct ReservationManager {
    db: Database,
    store: InventoryItemStore,
    listener: SharedListener,
}

impl ReservationManager {
    pub fn new(db: Database, store: InventoryItemStore, listener: SharedListener) -> Self {
        ReservationManager { db, store, listener }
    }

    /// Reserves every line for `correlation_id`, or nothing.
    ///
    /// ## Returns
    /// The active reservations covering the lines (new or pre-existing).
    ///
    /// ## Errors
    /// * `ReservationUnavailable` - first line without enough unreserved stock
    /// * `NotFound` - a line's size has no SKU, or its item is retired
    pub async fn reserve(
        &self,
        lines: &[LineItem],
        correlation_id: &str,
    ) -> InventoryResult<Vec<InventoryReservation>> {
        let correlation_id = validate_reference(correlation_id)?;
        let totals = aggregate_lines(lines)?;

        let mut held = Vec::with_capacity(totals.len());
        let mut taken: Vec<String> = Vec::new();

        for (key, quantity) in &totals {
            let result = self.reserve_one(key, *quantity, &correlation_id).await;

            match result {
                Ok((reservation, fresh)) => {
                    if fresh {
                        taken.push(reservation.inventory_item_id.clone());
                    }
                    held.push(reservation);
                }
                Err(e) => {
                    self.undo(&taken, &correlation_id).await;
                    return Err(e);
                }
            }
        }

        info!(
            correlation_id = %correlation_id,
            lines = totals.len(),
            new = taken.len(),
            "Order stock reserved"
        );

        Ok(held)
    }

    async fn reserve_one(
        &self,
        key: &ItemKey,
        quantity: i64,
        correlation_id: &str,
    ) -> InventoryResult<(InventoryReservation, bool)> {
        // First reservation creates the item at zero stock; retired items stay retired.
        let item = match self.store.find(key).await? {
            Some(item) if item.is_active => item,
            Some(_) => return Err(CoreError::not_found("Inventory item", key.to_string()).into()),
            None => self.store.get_or_create(key).await?,
        };

        match self
            .db
            .reservations()
            .reserve(&item.id, correlation_id, quantity, Utc::now())
            .await?
        {
            ReserveOutcome::Reserved(reservation) => {
                debug!(item_id = %item.id, quantity, "Reserved");
                self.notify(StockChangeKind::Reserved, &item.id).await;
                Ok((reservation, true))
            }
            ReserveOutcome::AlreadyReserved(reservation) => {
                debug!(item_id = %item.id, correlation_id, "Already reserved for this order");
                Ok((reservation, false))
            }
            ReserveOutcome::Unavailable { available, .. } => Err(CoreError::ReservationUnavailable {
                item: item.label(),
                available,
                requested: quantity,
            }
            .into()),
            ReserveOutcome::Inactive => {
                Err(CoreError::not_found("Inventory item", key.to_string()).into())
            }
        }
    }

    async fn undo(&self, item_ids: &[String], correlation_id: &str) {
        for item_id in item_ids.iter().rev() {
            if let Err(e) = self
                .db
                .reservations()
                .release(item_id, correlation_id, Utc::now())
                .await
            {
                warn!(
                    item_id = %item_id,
                    correlation_id,
                    error = %e,
                    "Failed to undo partial reservation"
                );
            } else {
                self.notify(StockChangeKind::Released, item_id).await;
            }
        }
    }

    /// Releases the order's reservation on every line.
    ///
    /// Lines with no active reservation (never reserved, already released,
    /// or unknown items) are skipped.
    pub async fn release(
        &self,
        lines: &[LineItem],
        correlation_id: &str,
    ) -> InventoryResult<Vec<InventoryReservation>> {
        let correlation_id = validate_reference(correlation_id)?;
        let totals = aggregate_lines(lines)?;
        let mut released = Vec::new();

        for (key, _) in &totals {
            let Some(item) = self.store.find(key).await? else {
                debug!(key = %key, "Release skipped: no inventory item");
                continue;
            };

            if let Some(reservation) = self
                .db
                .reservations()
                .release(&item.id, &correlation_id, Utc::now())
                .await?
            {
                self.notify(StockChangeKind::Released, &item.id).await;
                released.push(reservation);
            }
        }

        info!(
            correlation_id = %correlation_id,
            released = released.len(),
            "Order reservation released"
        );

        Ok(released)
    }

    async fn notify(&self, kind: StockChangeKind, item_id: &str) {
        match self.db.items().get_by_id(item_id).await {
            Ok(Some(item)) => {
                self.listener
                    .on_stock_changed(&StockChanged::new(kind, &item))
                    .await
            }
            Ok(None) => {}
            Err(e) => warn!(item_id, error = %e, "Could not load item for stock change event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticVariantCatalog;
    use crate::events::NoopListener;
    use crate::movement::{RetryPolicy, StockMovementExecutor};
    use std::sync::Arc;
    use std::time::Duration;
    use stockroom_core::{Money, StockInRequest};

    struct Fixture {
        db: Database,
        manager: ReservationManager,
        shirt: ItemKey,
        hat: ItemKey,
    }

    async fn fixture(shirt_qty: i64, hat_qty: i64) -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let shirt = ItemKey::new("p1", "v1", "M");
        let hat = ItemKey::new("p2", "v2", "OS");
        let catalog = StaticVariantCatalog::new()
            .with_sku(shirt.clone(), "SHIRT-M")
            .with_sku(hat.clone(), "HAT-OS")
            .with_sku(ItemKey::new("p3", "v3", "L"), "SOCK-L");
        let store = InventoryItemStore::new(db.clone(), Arc::new(catalog), 10, Duration::from_secs(1));
        let executor = StockMovementExecutor::new(db.clone(), Arc::new(NoopListener), RetryPolicy::default());

        for (key, qty) in [(&shirt, shirt_qty), (&hat, hat_qty)] {
            let item = store.get_or_create(key).await.unwrap();
            if qty > 0 {
                executor
                    .stock_in(&item.id, &StockInRequest::restock(qty, Money::from_units(10)))
                    .await
                    .unwrap();
            }
        }

        let manager = ReservationManager::new(db.clone(), store, Arc::new(NoopListener));
        Fixture { db, manager, shirt, hat }
    }

    async fn reserved(db: &Database, key: &ItemKey) -> i64 {
        db.items().find_by_key(key).await.unwrap().unwrap().reserved_quantity
    }

    #[tokio::test]
    async fn test_reserve_five_then_six_fails() {
        let f = fixture(10, 0).await;

        f.manager
            .reserve(&[LineItem::new(f.shirt.clone(), 5)], "ORD-1")
            .await
            .unwrap();

        let err = f
            .manager
            .reserve(&[LineItem::new(f.shirt.clone(), 6)], "ORD-2")
            .await
            .unwrap_err();

        match err.as_core() {
            Some(CoreError::ReservationUnavailable { item, available, requested }) => {
                assert_eq!(item, "SHIRT-M (size M)");
                assert_eq!(*available, 5);
                assert_eq!(*requested, 6);
            }
            other => panic!("expected ReservationUnavailable, got {:?}", other),
        }
        assert_eq!(reserved(&f.db, &f.shirt).await, 5);
    }

    #[tokio::test]
    async fn test_failed_line_undoes_earlier_lines() {
        let f = fixture(10, 1).await;

        let err = f
            .manager
            .reserve(
                &[LineItem::new(f.shirt.clone(), 4), LineItem::new(f.hat.clone(), 2)],
                "ORD-1",
            )
            .await
            .unwrap_err();

        assert!(matches!(err.as_core(), Some(CoreError::ReservationUnavailable { .. })));
        assert_eq!(reserved(&f.db, &f.shirt).await, 0);
        assert_eq!(reserved(&f.db, &f.hat).await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_lines_are_summed() {
        let f = fixture(10, 0).await;
        f.manager
            .reserve(
                &[LineItem::new(f.shirt.clone(), 2), LineItem::new(f.shirt.clone(), 3)],
                "ORD-1",
            )
            .await
            .unwrap();
        assert_eq!(reserved(&f.db, &f.shirt).await, 5);
    }

    #[tokio::test]
    async fn test_reserve_is_idempotent_per_order() {
        let f = fixture(10, 0).await;
        let lines = [LineItem::new(f.shirt.clone(), 4)];

        f.manager.reserve(&lines, "ORD-1").await.unwrap();
        f.manager.reserve(&lines, "ORD-1").await.unwrap();
        assert_eq!(reserved(&f.db, &f.shirt).await, 4);
    }

    #[tokio::test]
    async fn test_retry_after_failure_keeps_existing_hold() {
        let f = fixture(10, 1).await;
        f.manager
            .reserve(&[LineItem::new(f.shirt.clone(), 3)], "ORD-1")
            .await
            .unwrap();

        // Second attempt for the same order adds a line that cannot be held.
        f.manager
            .reserve(
                &[LineItem::new(f.shirt.clone(), 3), LineItem::new(f.hat.clone(), 5)],
                "ORD-1",
            )
            .await
            .unwrap_err();

        assert_eq!(reserved(&f.db, &f.shirt).await, 3);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let f = fixture(10, 0).await;
        let lines = [LineItem::new(f.shirt.clone(), 4)];
        f.manager.reserve(&lines, "ORD-1").await.unwrap();

        assert_eq!(f.manager.release(&lines, "ORD-1").await.unwrap().len(), 1);
        assert_eq!(f.manager.release(&lines, "ORD-1").await.unwrap().len(), 0);
        assert_eq!(reserved(&f.db, &f.shirt).await, 0);
    }

    #[tokio::test]
    async fn test_release_skips_unknown_items() {
        let f = fixture(10, 0).await;
        let released = f
            .manager
            .release(&[LineItem::new(ItemKey::new("px", "vx", "S"), 1)], "ORD-1")
            .await
            .unwrap();
        assert!(released.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_item_cannot_be_reserved() {
        let f = fixture(10, 0).await;
        let err = f
            .manager
            .reserve(&[LineItem::new(ItemKey::new("px", "vx", "S"), 1)], "ORD-1")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_never_stocked_size_is_created_then_refused() {
        let f = fixture(10, 0).await;
        let socks = ItemKey::new("p3", "v3", "L");

        let err = f
            .manager
            .reserve(&[LineItem::new(socks.clone(), 1)], "ORD-1")
            .await
            .unwrap_err();

        match err.as_core() {
            Some(CoreError::ReservationUnavailable { item, available, requested }) => {
                assert_eq!(item, "SOCK-L (size L)");
                assert_eq!((*available, *requested), (0, 1));
            }
            other => panic!("expected ReservationUnavailable, got {:?}", other),
        }

        let created = f.db.items().find_by_key(&socks).await.unwrap().unwrap();
        assert_eq!((created.quantity, created.reserved_quantity), (0, 0));
    }

    #[tokio::test]
    async fn test_retired_item_cannot_be_reserved() {
        let f = fixture(10, 0).await;
        let shirt = f.db.items().find_by_key(&f.shirt).await.unwrap().unwrap();
        f.db.items().retire(&shirt.id, Utc::now()).await.unwrap();

        let err = f
            .manager
            .reserve(&[LineItem::new(f.shirt.clone(), 1)], "ORD-1")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!f.db.items().find_by_key(&f.shirt).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_concurrent_reservers_never_exceed_on_hand() {
        let f = fixture(10, 0).await;

        let mut handles = Vec::new();
        for n in 0..25 {
            let manager = f.manager.clone();
            let lines = vec![LineItem::new(f.shirt.clone(), 1)];
            handles.push(tokio::spawn(async move {
                manager.reserve(&lines, &format!("ORD-{}", n)).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        let item = f.db.items().find_by_key(&f.shirt).await.unwrap().unwrap();
        assert_eq!(succeeded, 10);
        assert_eq!(item.reserved_quantity, 10);
        assert!(item.reserved_quantity <= item.quantity);
    }
}
