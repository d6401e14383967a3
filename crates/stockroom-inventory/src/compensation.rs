//! # Compensation Worker
//!
//! Drains the compensation outbox: rollback stock-ins the saga could not
//! apply when an order deduction failed.
//!
//! ## Retry Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Compensation Worker                               │
//! │                                                                         │
//! │  ┌──────────────┐     get_retryable(max_attempts, batch_size)          │
//! │  │  pass        │ ◄── attempts < max_attempts, oldest first             │
//! │  └──────┬───────┘                                                       │
//! │         │  stock_in(rollback, reference = order id, unit cost)          │
//! │         ├── applied ──────────────► mark_resolved                      │
//! │         ├── duplicate (already in) ► mark_resolved                      │
//! │         └── other error ──────────► mark_failed (attempts + 1)          │
//! │                                                                         │
//! │  all good → wait poll_interval; failures → exponential backoff          │
//! │  attempts exhausted → ERROR critical, left for pending_reconciliation   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use stockroom_core::{CompensationEntry, Money, StockInRequest, TransactionReason};
use stockroom_db::Database;

use crate::config::CompensationSettings;
use crate::error::{InventoryError, InventoryResult};
use crate::movement::StockMovementExecutor;

/// Outcome counts of one pass over the outbox.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub applied: usize,
    pub already_applied: usize,
    pub failed: usize,
}

/// Backoff between passes that left failures behind.
fn failure_backoff(settings: &CompensationSettings) -> ExponentialBackoff {
    let initial = Duration::from_millis(settings.initial_backoff_ms);
    ExponentialBackoff {
        current_interval: initial,
        initial_interval: initial,
        max_interval: Duration::from_secs(settings.max_backoff_secs),
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// Retries queued compensations.
pub struct CompensationWorker {
    db: Database,
    executor: StockMovementExecutor,
    settings: CompensationSettings,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running worker.
#[derive(Clone)]
pub struct CompensationWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CompensationWorkerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> InventoryResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| InventoryError::ChannelClosed("Compensation worker already stopped".into()))
    }
}

impl CompensationWorker {
    /// Creates a worker and the handle that stops it.
    pub fn new(
        db: Database,
        executor: StockMovementExecutor,
        settings: CompensationSettings,
    ) -> (Self, CompensationWorkerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = CompensationWorker {
            db,
            executor,
            settings,
            shutdown_rx,
        };

        (worker, CompensationWorkerHandle { shutdown_tx })
    }

    /// Runs the retry loop until shutdown. Spawn it as a background task.
    pub async fn run(mut self) {
        info!("Compensation worker starting");

        let poll_interval = Duration::from_secs(self.settings.poll_interval_secs);
        let mut backoff = failure_backoff(&self.settings);

        let mut wait = Duration::ZERO;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    wait = match self.process_pending().await {
                        Ok(summary) if summary.failed == 0 => {
                            backoff.reset();
                            poll_interval
                        }
                        Ok(_) => backoff.next_backoff().unwrap_or(poll_interval),
                        Err(e) => {
                            error!(error = %e, "Compensation pass failed");
                            backoff.next_backoff().unwrap_or(poll_interval)
                        }
                    };
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Compensation worker shutting down");
                    break;
                }
            }
        }

        info!("Compensation worker stopped");
    }

    /// Runs one pass over the retryable entries.
    pub async fn process_pending(&self) -> InventoryResult<PassSummary> {
        let entries = self
            .db
            .compensations()
            .get_retryable(self.settings.max_attempts, self.settings.batch_size)
            .await?;

        let mut summary = PassSummary::default();
        if entries.is_empty() {
            debug!("No pending compensations");
            return Ok(summary);
        }

        info!(count = entries.len(), "Retrying queued compensations");

        for entry in &entries {
            self.retry(entry, &mut summary).await?;
        }

        Ok(summary)
    }

    async fn retry(&self, entry: &CompensationEntry, summary: &mut PassSummary) -> InventoryResult<()> {
        let queue = self.db.compensations();

        let mut request = StockInRequest::new(entry.quantity, TransactionReason::Rollback)
            .unit_cost(Money::from_units(entry.unit_cost))
            .reference(&entry.reference)
            .notes(format!("Reconciled rollback: {}", entry.failure));
        if let Some(user) = &entry.performed_by {
            request = request.performed_by(user);
        }

        match self.executor.stock_in(&entry.inventory_item_id, &request).await {
            Ok(receipt) => {
                queue.mark_resolved(&entry.id, Utc::now()).await?;
                info!(
                    id = %entry.id,
                    item_id = %entry.inventory_item_id,
                    reference = %entry.reference,
                    quantity = entry.quantity,
                    seq = receipt.transaction.seq,
                    "Queued compensation applied"
                );
                summary.applied += 1;
            }
            Err(e) if e.is_duplicate() => {
                queue.mark_resolved(&entry.id, Utc::now()).await?;
                info!(id = %entry.id, reference = %entry.reference, "Compensation was already applied");
                summary.already_applied += 1;
            }
            Err(e) => {
                queue.mark_failed(&entry.id, &e.to_string(), Utc::now()).await?;
                summary.failed += 1;

                let attempts = entry.attempts + 1;
                if attempts >= i64::from(self.settings.max_attempts) {
                    error!(
                        critical = true,
                        id = %entry.id,
                        item_id = %entry.inventory_item_id,
                        reference = %entry.reference,
                        attempts,
                        error = %e,
                        "Compensation retries exhausted; manual reconciliation required"
                    );
                } else {
                    warn!(
                        id = %entry.id,
                        reference = %entry.reference,
                        attempts,
                        error = %e,
                        "Compensation retry failed"
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopListener;
    use crate::movement::RetryPolicy;
    use std::sync::Arc;
    use stockroom_core::{InventoryItem, ItemKey, StockOutRequest};
    use stockroom_db::NewCompensation;

    struct Fixture {
        db: Database,
        executor: StockMovementExecutor,
        item: InventoryItem,
    }

    /// An item with 10 units, 3 of them sold for ORD-1.
    async fn fixture() -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let item = db
            .items()
            .insert_if_absent(&InventoryItem::new(
                &ItemKey::new("p1", "v1", "M"),
                "TEE-M",
                10,
                Utc::now(),
            ))
            .await
            .unwrap();
        let executor = StockMovementExecutor::new(db.clone(), Arc::new(NoopListener), RetryPolicy::default());

        executor
            .stock_in(&item.id, &StockInRequest::restock(10, Money::from_units(25)))
            .await
            .unwrap();
        executor
            .stock_out(
                &item.id,
                &StockOutRequest::new(3, TransactionReason::Sale).reference("ORD-1"),
            )
            .await
            .unwrap();

        Fixture { db, executor, item }
    }

    fn entry(item_id: &str) -> NewCompensation {
        NewCompensation {
            inventory_item_id: item_id.to_string(),
            quantity: 3,
            unit_cost: 25,
            reference: "ORD-1".to_string(),
            performed_by: Some("shipper-1".to_string()),
            failure: "Insufficient stock for HAT-OS (size OS)".to_string(),
            first_error: "database is locked".to_string(),
        }
    }

    fn settings(max_attempts: u32) -> CompensationSettings {
        CompensationSettings {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_secs: 1,
            poll_interval_secs: 1,
            batch_size: 10,
        }
    }

    async fn quantity(f: &Fixture) -> i64 {
        f.db.items().get_by_id(&f.item.id).await.unwrap().unwrap().quantity
    }

    #[tokio::test]
    async fn test_pending_compensation_is_applied_once() {
        let f = fixture().await;
        f.db.compensations().enqueue(entry(&f.item.id)).await.unwrap();
        f.db.compensations().enqueue(entry(&f.item.id)).await.unwrap();

        let (worker, _handle) = CompensationWorker::new(f.db.clone(), f.executor.clone(), settings(5));
        let summary = worker.process_pending().await.unwrap();

        assert_eq!(
            summary,
            PassSummary {
                applied: 1,
                already_applied: 1,
                failed: 0
            }
        );
        assert_eq!(quantity(&f).await, 10);
        assert_eq!(f.db.compensations().count_pending().await.unwrap(), 0);

        let history = f.db.ledger().list_for_item(&f.item.id).await.unwrap();
        let rollback = history.last().unwrap();
        assert_eq!(rollback.reason, TransactionReason::Rollback);
        assert_eq!(rollback.cost_price, 25);
        assert_eq!(rollback.performed_by.as_deref(), Some("shipper-1"));
    }

    #[tokio::test]
    async fn test_failure_counts_attempts_until_exhausted() {
        let f = fixture().await;
        f.db.compensations().enqueue(entry(&f.item.id)).await.unwrap();
        f.db.items().retire(&f.item.id, Utc::now()).await.unwrap();

        let (worker, _handle) = CompensationWorker::new(f.db.clone(), f.executor.clone(), settings(3));

        assert_eq!(worker.process_pending().await.unwrap().failed, 1);
        assert_eq!(worker.process_pending().await.unwrap().failed, 1);
        // attempts = 3: no longer retried, still unresolved
        assert_eq!(worker.process_pending().await.unwrap(), PassSummary::default());

        let pending = f.db.compensations().list_unresolved().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 3);
        assert!(pending[0].last_error.as_deref().unwrap_or("").contains("not found"));
        assert_eq!(quantity(&f).await, 7);
    }

    #[test]
    fn test_failure_backoff_starts_at_initial_interval() {
        let mut backoff = failure_backoff(&CompensationSettings {
            initial_backoff_ms: 20,
            ..settings(5)
        });

        let first = backoff.next_backoff().unwrap();
        assert!(first <= Duration::from_millis(30), "first wait was {:?}", first);

        backoff.reset();
        assert!(backoff.next_backoff().unwrap() <= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_run_loop_drains_and_stops() {
        let f = fixture().await;
        f.db.compensations().enqueue(entry(&f.item.id)).await.unwrap();

        let (worker, handle) = CompensationWorker::new(f.db.clone(), f.executor.clone(), settings(5));
        let task = tokio::spawn(worker.run());

        let mut drained = false;
        for _ in 0..100 {
            if f.db.compensations().count_pending().await.unwrap() == 0 {
                drained = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(drained);

        handle.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(quantity(&f).await, 10);
    }
}
