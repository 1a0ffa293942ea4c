use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One immutable entry in a user's loyalty point ledger. Awards are positive,
/// redemptions negative; a redemption rolled back is compensated with a fresh
/// positive entry rather than deleting the negative one.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RewardEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub points: i64,
    pub triggered_by_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
