use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Event, EventAttendee, RewardEntry, Ticket, Transaction, TransactionDetail, TransactionStatus,
    User, Voucher,
};
use crate::store::{
    LedgerStore, Page, ReleaseOutcome, ReleaseReceipt, ReservationPlan,
};
use crate::utils::error::AppError;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    tickets: HashMap<Uuid, Ticket>,
    vouchers: HashMap<Uuid, Voucher>,
    rewards: Vec<RewardEntry>,
    transactions: HashMap<Uuid, Transaction>,
    details: Vec<TransactionDetail>,
    attendees: HashMap<(Uuid, Uuid), EventAttendee>,
}

/// Single-mutex ledger with the same guard semantics as the Postgres store.
/// Backs the test suite and local development without a database.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<State>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("ledger state poisoned")
    }

    pub fn seed_user(&self, name: &str, email: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.lock().users.insert(user.id, user.clone());
        user
    }

    pub fn seed_event(&self, organizer_id: Uuid, title: &str) -> Event {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            organizer_id,
            title: title.to_string(),
            description: None,
            location: "Jakarta".to_string(),
            start_time: now + chrono::Duration::days(30),
            end_time: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.lock().events.insert(event.id, event.clone());
        event
    }

    pub fn seed_ticket(&self, event_id: Uuid, name: &str, price: i64, stock: i32) -> Ticket {
        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            event_id,
            name: name.to_string(),
            price,
            stock,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.lock().tickets.insert(ticket.id, ticket.clone());
        ticket
    }

    pub fn seed_voucher(
        &self,
        event_id: Uuid,
        code: &str,
        value: i64,
        expires_at: DateTime<Utc>,
    ) -> Voucher {
        let now = Utc::now();
        let voucher = Voucher {
            id: Uuid::new_v4(),
            event_id,
            code: code.to_string(),
            value,
            expires_at,
            created_at: now,
            deleted_at: None,
        };
        self.lock().vouchers.insert(voucher.id, voucher.clone());
        voucher
    }

    pub fn award_points(&self, user_id: Uuid, points: i64, expires_at: Option<DateTime<Utc>>) {
        self.lock().rewards.push(RewardEntry {
            id: Uuid::new_v4(),
            user_id,
            points,
            triggered_by_id: None,
            expires_at,
            created_at: Utc::now(),
        });
    }

    /// Test accessor: current stock of a ticket.
    pub fn ticket_stock(&self, ticket_id: Uuid) -> Option<i32> {
        self.lock().tickets.get(&ticket_id).map(|t| t.stock)
    }

    /// Test accessor: attendee aggregate for an (event, user) pair.
    pub fn attendee(&self, event_id: Uuid, user_id: Uuid) -> Option<EventAttendee> {
        self.lock().attendees.get(&(event_id, user_id)).cloned()
    }

    /// Test accessor: full reward ledger for a user, in append order.
    pub fn reward_entries(&self, user_id: Uuid) -> Vec<RewardEntry> {
        self.lock()
            .rewards
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    fn balance_locked(state: &State, user_id: Uuid, now: DateTime<Utc>) -> i64 {
        let sum: i64 = state
            .rewards
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter(|r| r.expires_at.map_or(true, |exp| exp > now))
            .map(|r| r.points)
            .sum();
        sum.max(0)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn event_by_id(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        Ok(self
            .lock()
            .events
            .get(&id)
            .filter(|e| e.deleted_at.is_none())
            .cloned())
    }

    async fn tickets_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Ticket>, AppError> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.tickets.get(id))
            .filter(|t| t.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn voucher_by_id(&self, id: Uuid) -> Result<Option<Voucher>, AppError> {
        Ok(self
            .lock()
            .vouchers
            .get(&id)
            .filter(|v| v.deleted_at.is_none())
            .cloned())
    }

    async fn points_balance(&self, user_id: Uuid) -> Result<i64, AppError> {
        Ok(Self::balance_locked(&self.lock(), user_id, Utc::now()))
    }

    async fn commit_reservation(&self, plan: ReservationPlan) -> Result<Transaction, AppError> {
        let mut state = self.lock();
        let now = Utc::now();

        // Guarded decrements, applied line by line; any miss unwinds the
        // lines already applied so the whole unit is a no-op, exactly like
        // the rolled-back database transaction.
        let mut applied: Vec<(Uuid, i32)> = Vec::new();
        for line in &plan.lines {
            let ok = match state.tickets.get_mut(&line.ticket_id) {
                Some(t) if t.deleted_at.is_none() && t.stock >= line.quantity => {
                    t.stock -= line.quantity;
                    t.updated_at = now;
                    applied.push((line.ticket_id, line.quantity));
                    true
                }
                _ => false,
            };
            if !ok {
                for (ticket_id, quantity) in applied {
                    if let Some(t) = state.tickets.get_mut(&ticket_id) {
                        t.stock += quantity;
                    }
                }
                return Err(AppError::Conflict(format!(
                    "insufficient stock for ticket {}",
                    line.ticket_id
                )));
            }
        }

        let transaction = Transaction {
            id: Uuid::new_v4(),
            reference: plan.reference.clone(),
            user_id: plan.user_id,
            event_id: plan.event_id,
            total_amount: plan.total_amount,
            discount_amount: plan.discount_amount,
            final_amount: plan.final_amount,
            status: TransactionStatus::WaitingForPayment,
            payment_proof: None,
            used_voucher_id: plan.used_voucher_id,
            used_points: plan.used_points,
            expires_at: plan.expires_at,
            confirmed_at: None,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        };

        for line in &plan.lines {
            state.details.push(TransactionDetail {
                id: Uuid::new_v4(),
                transaction_id: transaction.id,
                ticket_id: line.ticket_id,
                quantity: line.quantity,
                price: line.price,
            });
        }

        if let Some(points) = plan.used_points {
            state.rewards.push(RewardEntry {
                id: Uuid::new_v4(),
                user_id: plan.user_id,
                points: -points,
                triggered_by_id: Some(plan.user_id),
                expires_at: None,
                created_at: now,
            });
        }

        state
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, AppError> {
        Ok(self
            .lock()
            .transactions
            .values()
            .find(|t| t.reference == reference)
            .cloned())
    }

    async fn details_for(&self, transaction_id: Uuid) -> Result<Vec<TransactionDetail>, AppError> {
        Ok(self
            .lock()
            .details
            .iter()
            .filter(|d| d.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn record_payment_proof(
        &self,
        transaction_id: Uuid,
        proof: &str,
    ) -> Result<bool, AppError> {
        let mut state = self.lock();
        match state.transactions.get_mut(&transaction_id) {
            Some(t) if t.status.is_pending() => {
                t.status = TransactionStatus::WaitingForConfirmation;
                t.payment_proof = Some(proof.to_string());
                t.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finalize_accept(&self, transaction_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.lock();
        let now = Utc::now();

        let (event_id, user_id, final_amount) = match state.transactions.get_mut(&transaction_id) {
            Some(t) if t.status == TransactionStatus::WaitingForConfirmation => {
                t.status = TransactionStatus::Done;
                t.confirmed_at = Some(now);
                t.updated_at = now;
                (t.event_id, t.user_id, t.final_amount)
            }
            _ => return Ok(false),
        };

        let ticket_count: i32 = state
            .details
            .iter()
            .filter(|d| d.transaction_id == transaction_id)
            .map(|d| d.quantity)
            .sum();

        let attendee = state
            .attendees
            .entry((event_id, user_id))
            .or_insert_with(|| EventAttendee {
                id: Uuid::new_v4(),
                event_id,
                user_id,
                ticket_count: 0,
                total_paid: 0,
                created_at: now,
                updated_at: now,
            });
        attendee.ticket_count += ticket_count;
        attendee.total_paid += final_amount;
        attendee.updated_at = now;

        Ok(true)
    }

    async fn finalize_release(
        &self,
        transaction_id: Uuid,
        outcome: ReleaseOutcome,
    ) -> Result<Option<ReleaseReceipt>, AppError> {
        let mut state = self.lock();
        let now = Utc::now();

        let (user_id, used_points, proof) = match state.transactions.get_mut(&transaction_id) {
            Some(t) if t.status.is_pending() => {
                t.status = match outcome {
                    ReleaseOutcome::Rejected => TransactionStatus::Rejected,
                    ReleaseOutcome::Expired => TransactionStatus::Expired,
                };
                t.canceled_at = Some(now);
                t.updated_at = now;
                (t.user_id, t.used_points, t.payment_proof.take())
            }
            _ => return Ok(None),
        };

        let restore: Vec<(Uuid, i32)> = state
            .details
            .iter()
            .filter(|d| d.transaction_id == transaction_id)
            .map(|d| (d.ticket_id, d.quantity))
            .collect();
        for (ticket_id, quantity) in restore {
            if let Some(t) = state.tickets.get_mut(&ticket_id) {
                t.stock += quantity;
                t.updated_at = now;
            }
        }

        if let Some(points) = used_points {
            if points > 0 {
                state.rewards.push(RewardEntry {
                    id: Uuid::new_v4(),
                    user_id,
                    points,
                    triggered_by_id: Some(user_id),
                    expires_at: None,
                    created_at: now,
                });
            }
        }

        Ok(Some(ReleaseReceipt {
            proof_to_remove: proof,
        }))
    }

    async fn transactions_for_user(
        &self,
        user_id: Uuid,
        search: Option<&str>,
        page: Page,
    ) -> Result<(Vec<Transaction>, i64), AppError> {
        let state = self.lock();
        let needle = search.map(str::to_lowercase);
        let mut rows: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .filter(|t| match &needle {
                Some(needle) => state
                    .events
                    .get(&t.event_id)
                    .map_or(false, |e| e.title.to_lowercase().contains(needle)),
                None => true,
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = rows.len() as i64;
        let rows = rows
            .into_iter()
            .skip(page.offset().max(0) as usize)
            .take(page.limit.max(0) as usize)
            .collect();
        Ok((rows, total))
    }

    async fn transactions_for_organizer(
        &self,
        organizer_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Transaction>, i64), AppError> {
        let state = self.lock();
        let mut rows: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| {
                state
                    .events
                    .get(&t.event_id)
                    .map_or(false, |e| e.organizer_id == organizer_id)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = rows.len() as i64;
        let rows = rows
            .into_iter()
            .skip(page.offset().max(0) as usize)
            .take(page.limit.max(0) as usize)
            .collect();
        Ok((rows, total))
    }

    async fn pending_expiries(&self) -> Result<Vec<(Uuid, DateTime<Utc>)>, AppError> {
        Ok(self
            .lock()
            .transactions
            .values()
            .filter(|t| t.status.is_pending())
            .map(|t| (t.id, t.expires_at))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ReservationLine;

    fn plan_for(store: &InMemoryLedgerStore, quantity: i32) -> (ReservationPlan, Ticket) {
        let organizer = store.seed_user("Org", "org@example.com");
        let buyer = store.seed_user("Buyer", "buyer@example.com");
        let event = store.seed_event(organizer.id, "Rust Meetup");
        let ticket = store.seed_ticket(event.id, "Regular", 100, 5);
        let plan = ReservationPlan {
            reference: "ABC123XYZ0".to_string(),
            user_id: buyer.id,
            event_id: event.id,
            total_amount: 100 * i64::from(quantity),
            discount_amount: 0,
            final_amount: 100 * i64::from(quantity),
            lines: vec![ReservationLine {
                ticket_id: ticket.id,
                quantity,
                price: 100,
            }],
            used_voucher_id: None,
            used_points: None,
            expires_at: Utc::now() + chrono::Duration::hours(2),
        };
        (plan, ticket)
    }

    #[tokio::test]
    async fn test_commit_reservation_decrements_stock() {
        let store = InMemoryLedgerStore::new();
        let (plan, ticket) = plan_for(&store, 2);

        let tx = store.commit_reservation(plan).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::WaitingForPayment);
        assert_eq!(store.ticket_stock(ticket.id), Some(3));
        assert_eq!(store.details_for(tx.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_reservation_shortfall_unwinds_everything() {
        let store = InMemoryLedgerStore::new();
        let (mut plan, ticket) = plan_for(&store, 2);
        // Second line over-asks; the first line's decrement must be undone.
        plan.lines.push(ReservationLine {
            ticket_id: ticket.id,
            quantity: 4,
            price: 100,
        });

        let err = store.commit_reservation(plan).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.ticket_stock(ticket.id), Some(5));
    }

    #[tokio::test]
    async fn test_release_restores_stock_and_points() {
        let store = InMemoryLedgerStore::new();
        let (mut plan, ticket) = plan_for(&store, 3);
        plan.used_points = Some(20);
        store.award_points(plan.user_id, 20, None);
        let buyer = plan.user_id;

        let tx = store.commit_reservation(plan).await.unwrap();
        assert_eq!(store.points_balance(buyer).await.unwrap(), 0);

        let receipt = store
            .finalize_release(tx.id, ReleaseOutcome::Rejected)
            .await
            .unwrap();
        assert!(receipt.is_some());
        assert_eq!(store.ticket_stock(ticket.id), Some(5));
        assert_eq!(store.points_balance(buyer).await.unwrap(), 20);

        // Already terminal: the guard must miss.
        let again = store
            .finalize_release(tx.id, ReleaseOutcome::Expired)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_points_balance_ignores_expired_awards() {
        let store = InMemoryLedgerStore::new();
        let user = store.seed_user("Buyer", "buyer@example.com");
        store.award_points(user.id, 100, Some(Utc::now() - chrono::Duration::days(1)));
        store.award_points(user.id, 40, None);
        assert_eq!(store.points_balance(user.id).await.unwrap(), 40);
    }
}
