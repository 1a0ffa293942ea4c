use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Event, Ticket, Transaction, TransactionDetail, User, Voucher};
use crate::utils::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// One line of a reservation about to be committed. `price` is the unit
/// price snapshot taken when the ticket was resolved.
#[derive(Debug, Clone)]
pub struct ReservationLine {
    pub ticket_id: Uuid,
    pub quantity: i32,
    pub price: i64,
}

/// Everything the reservation engine decided, handed to the store for one
/// atomic commit: transaction row, detail rows, stock decrements and the
/// optional point redemption all succeed or fail together.
#[derive(Debug, Clone)]
pub struct ReservationPlan {
    pub reference: String,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub total_amount: i64,
    pub discount_amount: i64,
    pub final_amount: i64,
    pub lines: Vec<ReservationLine>,
    pub used_voucher_id: Option<Uuid>,
    pub used_points: Option<i64>,
    pub expires_at: DateTime<Utc>,
}

/// Which terminal state a compensating release drives the transaction into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Rejected,
    Expired,
}

/// What a successful release left behind for the caller to clean up outside
/// the atomic unit.
#[derive(Debug, Clone)]
pub struct ReleaseReceipt {
    pub proof_to_remove: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

/// Durable relational storage for the ticketing ledger.
///
/// Writes that span rows (`commit_reservation`, `finalize_accept`,
/// `finalize_release`) execute as one atomic unit with guarded updates, so
/// concurrent buyers of the same ticket serialize on the stock row and
/// status transitions are compare-and-set. Guard misses are reported, never
/// silently overwritten.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn event_by_id(&self, id: Uuid) -> Result<Option<Event>, AppError>;

    /// Batch ticket resolution. Soft-deleted tickets are not returned.
    async fn tickets_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Ticket>, AppError>;

    /// Soft-deleted vouchers are not returned.
    async fn voucher_by_id(&self, id: Uuid) -> Result<Option<Voucher>, AppError>;

    /// Usable balance: signed sum over non-expired ledger entries, floored
    /// at zero.
    async fn points_balance(&self, user_id: Uuid) -> Result<i64, AppError>;

    /// Inserts the transaction and its details, decrements stock for every
    /// line and appends the negative point entry, atomically. A stock guard
    /// miss (including a ticket deleted since resolution) rolls the whole
    /// unit back and surfaces as `Conflict`.
    async fn commit_reservation(&self, plan: ReservationPlan) -> Result<Transaction, AppError>;

    async fn transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, AppError>;

    async fn details_for(&self, transaction_id: Uuid) -> Result<Vec<TransactionDetail>, AppError>;

    /// Stores the proof reference and moves the row to
    /// `WAITING_FOR_CONFIRMATION`, guarded on the row still being pending.
    /// Returns whether the guard matched.
    async fn record_payment_proof(
        &self,
        transaction_id: Uuid,
        proof: &str,
    ) -> Result<bool, AppError>;

    /// `WAITING_FOR_CONFIRMATION` -> `DONE` plus the attendee upsert, in one
    /// atomic unit. Returns whether the guard matched.
    async fn finalize_accept(&self, transaction_id: Uuid) -> Result<bool, AppError>;

    /// Drives a still-pending transaction to `REJECTED` or `EXPIRED` with
    /// its compensations: stock restored per line, redeemed points
    /// re-credited, proof reference cleared. Returns `None` when the row was
    /// no longer pending (someone else finalized it first).
    async fn finalize_release(
        &self,
        transaction_id: Uuid,
        outcome: ReleaseOutcome,
    ) -> Result<Option<ReleaseReceipt>, AppError>;

    /// Newest-first page of a buyer's transactions, optionally filtered by
    /// event title. Returns the page and the unfiltered-by-page total.
    async fn transactions_for_user(
        &self,
        user_id: Uuid,
        search: Option<&str>,
        page: Page,
    ) -> Result<(Vec<Transaction>, i64), AppError>;

    /// Newest-first page of transactions across all of an organizer's
    /// events.
    async fn transactions_for_organizer(
        &self,
        organizer_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Transaction>, i64), AppError>;

    /// The due-time index: every still-pending transaction with its expiry
    /// horizon. Scanned on boot to rearm the scheduler.
    async fn pending_expiries(&self) -> Result<Vec<(Uuid, DateTime<Utc>)>, AppError>;
}
