use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::services::transactions::TransactionService;
use crate::store::LedgerStore;
use crate::utils::error::AppError;

/// One armed expiry: revisit `transaction_id` at `fire_at`.
#[derive(Debug, Clone)]
pub struct ExpiryJob {
    pub transaction_id: Uuid,
    pub fire_at: DateTime<Utc>,
}

/// Delayed-execution facility for transaction expiry.
///
/// `schedule` never blocks the caller; jobs flow over a channel to a
/// dispatcher task that sleeps until each horizon and then drives the
/// expiry transition. Durability comes from the transactions table itself:
/// the pending rows are the due-time index, and `rearm_pending` replays
/// them on boot, so in-process timers lost to a restart are recreated.
/// Delivery is at-least-once; a duplicate or late firing is harmless
/// because the expiry transition re-checks the current status.
#[derive(Clone)]
pub struct ExpiryScheduler {
    jobs: UnboundedSender<ExpiryJob>,
}

impl ExpiryScheduler {
    pub fn new() -> (Self, UnboundedReceiver<ExpiryJob>) {
        let (jobs, inbox) = mpsc::unbounded_channel();
        (Self { jobs }, inbox)
    }

    /// Arms a one-shot expiry. Losing the job (dispatcher gone) is logged,
    /// not fatal: the boot-time rescan will pick the transaction up again.
    pub fn schedule(&self, transaction_id: Uuid, fire_at: DateTime<Utc>) {
        let job = ExpiryJob {
            transaction_id,
            fire_at,
        };
        if self.jobs.send(job).is_err() {
            warn!(
                %transaction_id,
                "expiry dispatcher is not running; transaction will be rearmed on next boot"
            );
        }
    }

    /// Consumes the inbox, spawning a sleep-until-then-expire task per job.
    pub fn spawn_dispatcher(
        mut inbox: UnboundedReceiver<ExpiryJob>,
        service: Arc<TransactionService>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(job) = inbox.recv().await {
                let service = service.clone();
                tokio::spawn(async move {
                    // Past-due horizons (rearmed after a long downtime)
                    // collapse to an immediate firing.
                    let delay = (job.fire_at - Utc::now())
                        .to_std()
                        .unwrap_or(StdDuration::ZERO);
                    tokio::time::sleep(delay).await;
                    if let Err(err) = service.expire_transaction(job.transaction_id).await {
                        error!(
                            error = ?err,
                            transaction_id = %job.transaction_id,
                            "failed to expire transaction"
                        );
                    }
                });
            }
        })
    }

    /// Rearms every still-pending transaction from the durable index.
    pub async fn rearm_pending(&self, store: &dyn LedgerStore) -> Result<usize, AppError> {
        let due = store.pending_expiries().await?;
        let count = due.len();
        for (transaction_id, fire_at) in due {
            self.schedule(transaction_id, fire_at);
        }
        if count > 0 {
            info!(count, "rearmed pending transaction expiries");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{InMemoryArtifactStore, RecordingMailer};
    use crate::models::TransactionStatus;
    use crate::services::transactions::{CartItem, CreateTransactionRequest, TransactionService};
    use crate::store::InMemoryLedgerStore;
    use chrono::Duration;

    fn service_with_window(
        store: Arc<InMemoryLedgerStore>,
        window: Duration,
    ) -> Arc<TransactionService> {
        let (scheduler, inbox) = ExpiryScheduler::new();
        let service = Arc::new(TransactionService::new(
            store,
            Arc::new(InMemoryArtifactStore::new()),
            Arc::new(RecordingMailer::new()),
            scheduler,
            window,
        ));
        ExpiryScheduler::spawn_dispatcher(inbox, service.clone());
        service
    }

    fn single_item(ticket_id: Uuid, quantity: i32) -> CreateTransactionRequest {
        CreateTransactionRequest {
            payload: vec![CartItem {
                ticket_id,
                quantity,
            }],
            voucher_id: None,
            use_points: None,
            email: None,
        }
    }

    #[tokio::test]
    async fn test_armed_timer_expires_pending_transaction() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let organizer = store.seed_user("Org", "org@example.com");
        let buyer = store.seed_user("Buyer", "buyer@example.com");
        let event = store.seed_event(organizer.id, "Rust Meetup");
        let ticket = store.seed_ticket(event.id, "Regular", 100, 5);

        let service = service_with_window(store.clone(), Duration::milliseconds(50));
        let tx = service
            .create_transaction(single_item(ticket.id, 2), buyer.id)
            .await
            .unwrap();
        assert_eq!(store.ticket_stock(ticket.id), Some(3));

        tokio::time::sleep(StdDuration::from_millis(400)).await;

        let (loaded, _) = service.get_transaction(&tx.reference, buyer.id).await.unwrap();
        assert_eq!(loaded.status, TransactionStatus::Expired);
        assert_eq!(store.ticket_stock(ticket.id), Some(5));
    }

    #[tokio::test]
    async fn test_finalized_transaction_survives_late_firing() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let organizer = store.seed_user("Org", "org@example.com");
        let buyer = store.seed_user("Buyer", "buyer@example.com");
        let event = store.seed_event(organizer.id, "Rust Meetup");
        let ticket = store.seed_ticket(event.id, "Regular", 100, 5);

        let service = service_with_window(store.clone(), Duration::milliseconds(150));
        let tx = service
            .create_transaction(single_item(ticket.id, 1), buyer.id)
            .await
            .unwrap();
        service
            .upload_payment_proof(&tx.reference, b"proof", buyer.id)
            .await
            .unwrap();
        service
            .accept_transaction(&tx.reference, organizer.id)
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(500)).await;

        let (loaded, _) = service.get_transaction(&tx.reference, buyer.id).await.unwrap();
        assert_eq!(loaded.status, TransactionStatus::Done);
        assert_eq!(store.ticket_stock(ticket.id), Some(4));
    }

    #[tokio::test]
    async fn test_rearm_pending_replays_overdue_transactions() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let organizer = store.seed_user("Org", "org@example.com");
        let buyer = store.seed_user("Buyer", "buyer@example.com");
        let event = store.seed_event(organizer.id, "Rust Meetup");
        let ticket = store.seed_ticket(event.id, "Regular", 100, 5);

        // First process: timers armed but lost before firing.
        let (lost_scheduler, lost_inbox) = ExpiryScheduler::new();
        let first = Arc::new(TransactionService::new(
            store.clone(),
            Arc::new(InMemoryArtifactStore::new()),
            Arc::new(RecordingMailer::new()),
            lost_scheduler,
            Duration::milliseconds(10),
        ));
        let tx = first
            .create_transaction(single_item(ticket.id, 2), buyer.id)
            .await
            .unwrap();
        drop(lost_inbox);
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert_eq!(store.ticket_stock(ticket.id), Some(3));

        // Second process: boot rescan picks the overdue row back up.
        let (scheduler, inbox) = ExpiryScheduler::new();
        let second = Arc::new(TransactionService::new(
            store.clone(),
            Arc::new(InMemoryArtifactStore::new()),
            Arc::new(RecordingMailer::new()),
            scheduler.clone(),
            Duration::milliseconds(10),
        ));
        ExpiryScheduler::spawn_dispatcher(inbox, second.clone());
        let rearmed = scheduler.rearm_pending(store.as_ref()).await.unwrap();
        assert_eq!(rearmed, 1);

        tokio::time::sleep(StdDuration::from_millis(300)).await;
        let (loaded, _) = second.get_transaction(&tx.reference, buyer.id).await.unwrap();
        assert_eq!(loaded.status, TransactionStatus::Expired);
        assert_eq!(store.ticket_stock(ticket.id), Some(5));
    }
}
