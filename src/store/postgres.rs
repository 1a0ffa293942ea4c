use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Event, Ticket, Transaction, TransactionDetail, TransactionStatus, User, Voucher};
use crate::store::{
    LedgerStore, Page, ReleaseOutcome, ReleaseReceipt, ReservationPlan,
};
use crate::utils::error::AppError;

/// Ledger store over Postgres. Cross-row invariants rely on conditional
/// updates inside one `sqlx` transaction: the stock guard is part of the
/// UPDATE itself, so two buyers racing for the last seats serialize on the
/// ticket row and the loser's whole unit rolls back.
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn event_by_id(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        let event = sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn tickets_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Ticket>, AppError> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE id = ANY($1) AND deleted_at IS NULL",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    async fn voucher_by_id(&self, id: Uuid) -> Result<Option<Voucher>, AppError> {
        let voucher = sqlx::query_as::<_, Voucher>(
            "SELECT * FROM vouchers WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(voucher)
    }

    async fn points_balance(&self, user_id: Uuid) -> Result<i64, AppError> {
        let sum: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(points), 0)::BIGINT
            FROM rewards
            WHERE user_id = $1
              AND (expires_at IS NULL OR expires_at > now())
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum.max(0))
    }

    async fn commit_reservation(&self, plan: ReservationPlan) -> Result<Transaction, AppError> {
        let mut tx = self.pool.begin().await?;

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions
                (reference, user_id, event_id, total_amount, discount_amount,
                 final_amount, used_voucher_id, used_points, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&plan.reference)
        .bind(plan.user_id)
        .bind(plan.event_id)
        .bind(plan.total_amount)
        .bind(plan.discount_amount)
        .bind(plan.final_amount)
        .bind(plan.used_voucher_id)
        .bind(plan.used_points)
        .bind(plan.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        for line in &plan.lines {
            sqlx::query(
                r#"
                INSERT INTO transaction_details (transaction_id, ticket_id, quantity, price)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(transaction.id)
            .bind(line.ticket_id)
            .bind(line.quantity)
            .bind(line.price)
            .execute(&mut *tx)
            .await?;

            // The guard and the decrement are one statement; a miss means a
            // concurrent buyer won the remaining stock.
            let decremented = sqlx::query(
                r#"
                UPDATE tickets
                SET stock = stock - $2, updated_at = now()
                WHERE id = $1 AND deleted_at IS NULL AND stock >= $2
                "#,
            )
            .bind(line.ticket_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;

            if decremented.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(AppError::Conflict(format!(
                    "insufficient stock for ticket {}",
                    line.ticket_id
                )));
            }
        }

        if let Some(points) = plan.used_points {
            sqlx::query(
                r#"
                INSERT INTO rewards (user_id, points, triggered_by_id)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(plan.user_id)
            .bind(-points)
            .bind(plan.user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(transaction)
    }

    async fn transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, AppError> {
        let transaction = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        Ok(transaction)
    }

    async fn details_for(&self, transaction_id: Uuid) -> Result<Vec<TransactionDetail>, AppError> {
        let details = sqlx::query_as::<_, TransactionDetail>(
            "SELECT * FROM transaction_details WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(details)
    }

    async fn record_payment_proof(
        &self,
        transaction_id: Uuid,
        proof: &str,
    ) -> Result<bool, AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'WAITING_FOR_CONFIRMATION', payment_proof = $2, updated_at = now()
            WHERE id = $1
              AND status IN ('WAITING_FOR_PAYMENT', 'WAITING_FOR_CONFIRMATION')
            "#,
        )
        .bind(transaction_id)
        .bind(proof)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    async fn finalize_accept(&self, transaction_id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let confirmed: Option<(Uuid, Uuid, i64)> = sqlx::query_as(
            r#"
            UPDATE transactions
            SET status = 'DONE', confirmed_at = now(), updated_at = now()
            WHERE id = $1 AND status = 'WAITING_FOR_CONFIRMATION'
            RETURNING event_id, user_id, final_amount
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((event_id, user_id, final_amount)) = confirmed else {
            tx.rollback().await?;
            return Ok(false);
        };

        let ticket_count: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM transaction_details WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO event_attendees (event_id, user_id, ticket_count, total_paid)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id, user_id) DO UPDATE
            SET ticket_count = event_attendees.ticket_count + EXCLUDED.ticket_count,
                total_paid = event_attendees.total_paid + EXCLUDED.total_paid,
                updated_at = now()
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(ticket_count as i32)
        .bind(final_amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn finalize_release(
        &self,
        transaction_id: Uuid,
        outcome: ReleaseOutcome,
    ) -> Result<Option<ReleaseReceipt>, AppError> {
        let status = match outcome {
            ReleaseOutcome::Rejected => TransactionStatus::Rejected,
            ReleaseOutcome::Expired => TransactionStatus::Expired,
        };

        let mut tx = self.pool.begin().await?;

        // Lock the row while it is still pending; anything terminal means a
        // human decision or an earlier firing already landed.
        let pending: Option<(Uuid, Option<i64>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT user_id, used_points, payment_proof
            FROM transactions
            WHERE id = $1
              AND status IN ('WAITING_FOR_PAYMENT', 'WAITING_FOR_CONFIRMATION')
            FOR UPDATE
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id, used_points, proof)) = pending else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2, canceled_at = now(), payment_proof = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(transaction_id)
        .bind(status)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE tickets t
            SET stock = t.stock + d.total::INT, updated_at = now()
            FROM (
                SELECT ticket_id, SUM(quantity) AS total
                FROM transaction_details
                WHERE transaction_id = $1
                GROUP BY ticket_id
            ) d
            WHERE t.id = d.ticket_id
            "#,
        )
        .bind(transaction_id)
        .execute(&mut *tx)
        .await?;

        if let Some(points) = used_points {
            if points > 0 {
                sqlx::query(
                    "INSERT INTO rewards (user_id, points, triggered_by_id) VALUES ($1, $2, $3)",
                )
                .bind(user_id)
                .bind(points)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
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
        let rows = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT t.*
            FROM transactions t
            JOIN events e ON e.id = t.event_id
            WHERE t.user_id = $1
              AND ($2::TEXT IS NULL OR e.title ILIKE '%' || $2 || '%')
            ORDER BY t.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(search)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM transactions t
            JOIN events e ON e.id = t.event_id
            WHERE t.user_id = $1
              AND ($2::TEXT IS NULL OR e.title ILIKE '%' || $2 || '%')
            "#,
        )
        .bind(user_id)
        .bind(search)
        .fetch_one(&self.pool)
        .await?;

        Ok((rows, total))
    }

    async fn transactions_for_organizer(
        &self,
        organizer_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Transaction>, i64), AppError> {
        let rows = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT t.*
            FROM transactions t
            JOIN events e ON e.id = t.event_id
            WHERE e.organizer_id = $1
            ORDER BY t.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(organizer_id)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM transactions t
            JOIN events e ON e.id = t.event_id
            WHERE e.organizer_id = $1
            "#,
        )
        .bind(organizer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((rows, total))
    }

    async fn pending_expiries(&self) -> Result<Vec<(Uuid, DateTime<Utc>)>, AppError> {
        let due: Vec<(Uuid, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, expires_at
            FROM transactions
            WHERE status IN ('WAITING_FOR_PAYMENT', 'WAITING_FOR_CONFIRMATION')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(due)
    }
}
