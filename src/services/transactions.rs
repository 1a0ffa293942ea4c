use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::external::{ArtifactStore, Mailer};
use crate::models::{Ticket, Transaction, TransactionDetail, TransactionStatus};
use crate::services::discount::{compute_discount, DiscountInputs};
use crate::services::expiry::ExpiryScheduler;
use crate::store::{LedgerStore, Page, ReleaseOutcome, ReservationLine, ReservationPlan};
use crate::utils::error::AppError;
use crate::utils::reference::{reference_code, TRANSACTION_REFERENCE_LEN};

#[derive(Debug, Clone, Deserialize)]
pub struct CartItem {
    pub ticket_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransactionRequest {
    pub payload: Vec<CartItem>,
    pub voucher_id: Option<Uuid>,
    pub use_points: Option<i64>,
    /// Contact address for the payment reminder; falls back to the buyer's
    /// stored email.
    pub email: Option<String>,
}

/// Reservation engine and transaction state machine.
///
/// Owns the whole lifecycle: cart validation and the atomic reservation,
/// proof upload, the organizer's accept/reject decision and scheduler-driven
/// expiry. Collaborators are injected once at construction and shared across
/// requests.
pub struct TransactionService {
    store: Arc<dyn LedgerStore>,
    artifacts: Arc<dyn ArtifactStore>,
    mailer: Arc<dyn Mailer>,
    scheduler: ExpiryScheduler,
    payment_window: Duration,
}

impl TransactionService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        artifacts: Arc<dyn ArtifactStore>,
        mailer: Arc<dyn Mailer>,
        scheduler: ExpiryScheduler,
        payment_window: Duration,
    ) -> Self {
        Self {
            store,
            artifacts,
            mailer,
            scheduler,
            payment_window,
        }
    }

    /// Converts a cart into a reserved, state-tracked order.
    ///
    /// Validation happens against the resolved snapshot, the commit against
    /// the store's own guards; a shortfall at either point fails the whole
    /// operation with nothing reserved. The reminder email and the expiry
    /// timer are armed only after the commit and never roll it back.
    pub async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
        buyer_id: Uuid,
    ) -> Result<Transaction, AppError> {
        if request.payload.is_empty() {
            return Err(AppError::Validation(
                "cart must not be empty".to_string(),
            ));
        }
        if request.payload.iter().any(|item| item.quantity < 1) {
            return Err(AppError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        let ticket_ids: Vec<Uuid> = request.payload.iter().map(|item| item.ticket_id).collect();
        let tickets = self.store.tickets_by_ids(&ticket_ids).await?;
        let by_id: HashMap<Uuid, &Ticket> = tickets.iter().map(|t| (t.id, t)).collect();

        let mut lines = Vec::with_capacity(request.payload.len());
        for item in &request.payload {
            let ticket = by_id.get(&item.ticket_id).ok_or_else(|| {
                AppError::NotFound(format!("ticket with id {} not found", item.ticket_id))
            })?;
            if ticket.stock < item.quantity {
                return Err(AppError::Conflict(format!(
                    "insufficient stock for ticket {}",
                    ticket.id
                )));
            }
            lines.push(ReservationLine {
                ticket_id: ticket.id,
                quantity: item.quantity,
                price: ticket.price,
            });
        }

        let event_id = tickets[0].event_id;
        if tickets.iter().any(|t| t.event_id != event_id) {
            return Err(AppError::Validation(
                "all tickets must belong to the same event".to_string(),
            ));
        }

        let total_amount: i64 = lines
            .iter()
            .map(|line| line.price * i64::from(line.quantity))
            .sum();

        let voucher = match request.voucher_id {
            Some(voucher_id) => Some(
                self.store
                    .voucher_by_id(voucher_id)
                    .await?
                    .ok_or_else(|| AppError::Validation("invalid voucher".to_string()))?,
            ),
            None => None,
        };

        let requested_points = request.use_points.filter(|points| *points != 0);
        let available_points = match requested_points {
            Some(_) => self.store.points_balance(buyer_id).await?,
            None => 0,
        };

        let discount_amount = compute_discount(&DiscountInputs {
            total_amount,
            event_id,
            voucher: voucher.as_ref(),
            requested_points,
            available_points,
            now: Utc::now(),
        })?;
        let final_amount = total_amount - discount_amount;

        let plan = ReservationPlan {
            reference: reference_code(TRANSACTION_REFERENCE_LEN),
            user_id: buyer_id,
            event_id,
            total_amount,
            discount_amount,
            final_amount,
            lines,
            used_voucher_id: voucher.map(|v| v.id),
            used_points: requested_points,
            expires_at: Utc::now() + self.payment_window,
        };

        let transaction = self.store.commit_reservation(plan).await?;
        info!(
            reference = %transaction.reference,
            buyer = %buyer_id,
            final_amount = transaction.final_amount,
            "transaction created"
        );

        self.notify_created(&transaction, request.email.as_deref())
            .await;
        self.scheduler
            .schedule(transaction.id, transaction.expires_at);

        Ok(transaction)
    }

    /// Attaches a payment proof and moves the order to
    /// `WAITING_FOR_CONFIRMATION`. Re-upload is allowed until the organizer
    /// decides. The new artifact is stored before the old reference is
    /// dropped, so the row never points at a removed blob.
    pub async fn upload_payment_proof(
        &self,
        reference: &str,
        proof: &[u8],
        requester_id: Uuid,
    ) -> Result<(), AppError> {
        if proof.is_empty() {
            return Err(AppError::Validation(
                "payment proof file is required".to_string(),
            ));
        }

        let transaction = self.require_transaction(reference).await?;
        if transaction.user_id != requester_id {
            return Err(AppError::Forbidden(
                "you are not allowed to modify this transaction".to_string(),
            ));
        }
        if !transaction.status.is_pending() {
            return Err(AppError::Conflict(
                "transaction can no longer accept a payment proof".to_string(),
            ));
        }

        let new_proof = self.artifacts.store(proof).await?;
        let recorded = self
            .store
            .record_payment_proof(transaction.id, &new_proof)
            .await?;
        if !recorded {
            // Finalized while we were uploading; the fresh blob is unlinked.
            if let Err(err) = self.artifacts.remove(&new_proof).await {
                warn!(error = ?err, reference = %reference, "failed to remove unlinked payment proof");
            }
            return Err(AppError::Conflict(
                "transaction can no longer accept a payment proof".to_string(),
            ));
        }

        if let Some(old_proof) = &transaction.payment_proof {
            if let Err(err) = self.artifacts.remove(old_proof).await {
                warn!(error = ?err, reference = %reference, "failed to remove replaced payment proof");
            }
        }

        info!(reference = %reference, "payment proof uploaded");
        Ok(())
    }

    /// Organizer confirmation: `WAITING_FOR_CONFIRMATION` -> `DONE`, with
    /// the attendee aggregate updated in the same atomic unit.
    pub async fn accept_transaction(
        &self,
        reference: &str,
        organizer_id: Uuid,
    ) -> Result<(), AppError> {
        let transaction = self.require_transaction(reference).await?;
        self.require_event_owner(&transaction, organizer_id).await?;
        if transaction.status != TransactionStatus::WaitingForConfirmation {
            return Err(AppError::Conflict(
                "transaction is not awaiting confirmation".to_string(),
            ));
        }

        if !self.store.finalize_accept(transaction.id).await? {
            return Err(AppError::Conflict(
                "transaction is not awaiting confirmation".to_string(),
            ));
        }

        info!(reference = %reference, "transaction accepted");
        Ok(())
    }

    /// Organizer rejection: terminal `REJECTED` plus compensations — stock
    /// restored, redeemed points re-credited, proof artifact removed.
    pub async fn reject_transaction(
        &self,
        reference: &str,
        organizer_id: Uuid,
    ) -> Result<(), AppError> {
        let transaction = self.require_transaction(reference).await?;
        self.require_event_owner(&transaction, organizer_id).await?;
        if transaction.status != TransactionStatus::WaitingForConfirmation {
            return Err(AppError::Conflict(
                "transaction is not awaiting confirmation".to_string(),
            ));
        }

        let receipt = self
            .store
            .finalize_release(transaction.id, ReleaseOutcome::Rejected)
            .await?
            .ok_or_else(|| {
                AppError::Conflict("transaction is not awaiting confirmation".to_string())
            })?;

        if let Some(proof) = receipt.proof_to_remove {
            if let Err(err) = self.artifacts.remove(&proof).await {
                warn!(error = ?err, reference = %reference, "failed to remove payment proof after rejection");
            }
        }

        info!(reference = %reference, "transaction rejected and stock restored");
        Ok(())
    }

    /// Scheduler-driven expiry. Safe under duplicate or late firings: the
    /// store re-checks the status, and a transaction that already reached a
    /// terminal state is left untouched.
    pub async fn expire_transaction(&self, transaction_id: Uuid) -> Result<(), AppError> {
        match self
            .store
            .finalize_release(transaction_id, ReleaseOutcome::Expired)
            .await?
        {
            Some(receipt) => {
                if let Some(proof) = receipt.proof_to_remove {
                    if let Err(err) = self.artifacts.remove(&proof).await {
                        warn!(error = ?err, transaction_id = %transaction_id, "failed to remove payment proof after expiry");
                    }
                }
                info!(transaction_id = %transaction_id, "transaction expired and stock restored");
            }
            None => {
                debug!(transaction_id = %transaction_id, "expiry fired for an already finalized transaction");
            }
        }
        Ok(())
    }

    /// Read projection: one transaction with its line items, visible to the
    /// buyer and to the event's organizer.
    pub async fn get_transaction(
        &self,
        reference: &str,
        requester_id: Uuid,
    ) -> Result<(Transaction, Vec<TransactionDetail>), AppError> {
        let transaction = self.require_transaction(reference).await?;

        let is_buyer = transaction.user_id == requester_id;
        let is_organizer = match self.store.event_by_id(transaction.event_id).await? {
            Some(event) => event.organizer_id == requester_id,
            None => false,
        };
        if !is_buyer && !is_organizer {
            return Err(AppError::Forbidden(
                "you are not allowed to view this transaction".to_string(),
            ));
        }

        let details = self.store.details_for(transaction.id).await?;
        Ok((transaction, details))
    }

    pub async fn list_user_transactions(
        &self,
        user_id: Uuid,
        requester_id: Uuid,
        search: Option<&str>,
        page: Page,
    ) -> Result<(Vec<Transaction>, i64), AppError> {
        self.store
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;
        if requester_id != user_id {
            return Err(AppError::Forbidden(
                "you are not authorized to view this user's transactions".to_string(),
            ));
        }
        self.store
            .transactions_for_user(user_id, search, page)
            .await
    }

    pub async fn list_organizer_transactions(
        &self,
        organizer_id: Uuid,
        requester_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Transaction>, i64), AppError> {
        if requester_id != organizer_id {
            return Err(AppError::Forbidden(
                "you are not authorized to view this organizer's transactions".to_string(),
            ));
        }
        self.store
            .transactions_for_organizer(organizer_id, page)
            .await
    }

    async fn require_transaction(&self, reference: &str) -> Result<Transaction, AppError> {
        self.store
            .transaction_by_reference(reference)
            .await?
            .ok_or_else(|| AppError::NotFound("transaction not found".to_string()))
    }

    async fn require_event_owner(
        &self,
        transaction: &Transaction,
        organizer_id: Uuid,
    ) -> Result<(), AppError> {
        let event = self
            .store
            .event_by_id(transaction.event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("event not found".to_string()))?;
        if event.organizer_id != organizer_id {
            return Err(AppError::Forbidden(
                "you are not the organizer of this event".to_string(),
            ));
        }
        Ok(())
    }

    async fn notify_created(&self, transaction: &Transaction, email: Option<&str>) {
        let event_title = match self.store.event_by_id(transaction.event_id).await {
            Ok(Some(event)) => event.title,
            _ => "your event".to_string(),
        };

        let recipient = match email {
            Some(address) => Some(address.to_string()),
            None => match self.store.user_by_id(transaction.user_id).await {
                Ok(Some(user)) => Some(user.email),
                _ => None,
            },
        };
        let Some(recipient) = recipient else {
            warn!(reference = %transaction.reference, "no contact address for payment reminder");
            return;
        };

        let context = json!({
            "event_title": event_title,
            "reference": transaction.reference,
            "final_amount": transaction.final_amount,
            "expires_at": transaction.expires_at,
        });
        if let Err(err) = self
            .mailer
            .send(
                &recipient,
                &format!("Complete your payment for {event_title}"),
                "upload-payment",
                context,
            )
            .await
        {
            warn!(error = ?err, reference = %transaction.reference, "failed to send payment reminder");
        }
    }
}
