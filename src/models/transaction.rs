use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of an order. `Done`, `Rejected` and `Expired` are sinks; a
/// transaction reaches exactly one of them, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    WaitingForPayment,
    WaitingForConfirmation,
    Done,
    Rejected,
    Expired,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Rejected | Self::Expired)
    }

    /// Still awaiting either the buyer's proof or the organizer's decision.
    pub fn is_pending(self) -> bool {
        !self.is_terminal()
    }
}

/// The order aggregate. `reference` is the opaque code used in URLs and
/// emails; the row id never leaves the service. Monetary fields always
/// satisfy `final_amount == total_amount - discount_amount`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub total_amount: i64,
    pub discount_amount: i64,
    pub final_amount: i64,
    pub status: TransactionStatus,
    pub payment_proof: Option<String>,
    pub used_voucher_id: Option<Uuid>,
    pub used_points: Option<i64>,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One cart line inside a transaction. `price` is the unit price snapshot
/// taken at reservation time; later ticket price edits never change it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransactionDetail {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub ticket_id: Uuid,
    pub quantity: i32,
    pub price: i64,
}
