use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::Voucher;
use crate::utils::error::AppError;

/// Everything the calculator needs, already resolved by the caller: the
/// voucher row (if a voucher was requested) and the buyer's usable point
/// balance. Keeping the lookups out makes this a pure function.
#[derive(Debug)]
pub struct DiscountInputs<'a> {
    pub total_amount: i64,
    pub event_id: Uuid,
    pub voucher: Option<&'a Voucher>,
    pub requested_points: Option<i64>,
    pub available_points: i64,
    pub now: DateTime<Utc>,
}

/// Computes the flat discount for a candidate order. Voucher and points are
/// additive; a combination that would exceed the order total is rejected
/// rather than clamped so the rewards arithmetic stays auditable.
pub fn compute_discount(inputs: &DiscountInputs<'_>) -> Result<i64, AppError> {
    let mut discount: i64 = 0;

    if let Some(voucher) = inputs.voucher {
        if voucher.event_id != inputs.event_id {
            return Err(AppError::Validation(
                "voucher is not valid for this event".to_string(),
            ));
        }
        if voucher.expires_at <= inputs.now {
            return Err(AppError::Validation("voucher has expired".to_string()));
        }
        discount += voucher.value;
    }

    if let Some(points) = inputs.requested_points {
        if points <= 0 {
            return Err(AppError::Validation(
                "point redemption must be positive".to_string(),
            ));
        }
        if points > inputs.available_points {
            return Err(AppError::Validation("not enough points".to_string()));
        }
        // 1 point = 1 currency unit.
        discount += points;
    }

    if discount > inputs.total_amount {
        return Err(AppError::Validation(
            "discount exceeds the order total".to_string(),
        ));
    }

    Ok(discount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn voucher_for(event_id: Uuid, value: i64, expires_at: DateTime<Utc>) -> Voucher {
        let now = Utc::now();
        Voucher {
            id: Uuid::new_v4(),
            event_id,
            code: "LAUNCH50".to_string(),
            value,
            expires_at,
            created_at: now,
            deleted_at: None,
        }
    }

    fn inputs<'a>(total: i64) -> DiscountInputs<'a> {
        DiscountInputs {
            total_amount: total,
            event_id: Uuid::new_v4(),
            voucher: None,
            requested_points: None,
            available_points: 0,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_no_discount_by_default() {
        assert_eq!(compute_discount(&inputs(200)).unwrap(), 0);
    }

    #[test]
    fn test_voucher_contributes_flat_value() {
        let mut inputs = inputs(200);
        let voucher = voucher_for(inputs.event_id, 50, Utc::now() + Duration::days(1));
        inputs.voucher = Some(&voucher);
        assert_eq!(compute_discount(&inputs).unwrap(), 50);
    }

    #[test]
    fn test_voucher_scoped_to_its_event() {
        let mut inputs = inputs(200);
        let voucher = voucher_for(Uuid::new_v4(), 50, Utc::now() + Duration::days(1));
        inputs.voucher = Some(&voucher);
        assert!(matches!(
            compute_discount(&inputs),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_expired_voucher_rejected() {
        let mut inputs = inputs(200);
        let voucher = voucher_for(inputs.event_id, 50, Utc::now() - Duration::hours(1));
        inputs.voucher = Some(&voucher);
        assert!(matches!(
            compute_discount(&inputs),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_points_redeemed_one_to_one() {
        let mut inputs = inputs(200);
        inputs.requested_points = Some(30);
        inputs.available_points = 30;
        assert_eq!(compute_discount(&inputs).unwrap(), 30);
    }

    #[test]
    fn test_points_cannot_exceed_balance() {
        let mut inputs = inputs(200);
        inputs.requested_points = Some(31);
        inputs.available_points = 30;
        assert!(matches!(
            compute_discount(&inputs),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_negative_redemption_rejected() {
        let mut inputs = inputs(200);
        inputs.requested_points = Some(-5);
        inputs.available_points = 30;
        assert!(matches!(
            compute_discount(&inputs),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_voucher_and_points_are_additive() {
        let mut inputs = inputs(200);
        let voucher = voucher_for(inputs.event_id, 50, Utc::now() + Duration::days(1));
        inputs.voucher = Some(&voucher);
        inputs.requested_points = Some(30);
        inputs.available_points = 30;
        assert_eq!(compute_discount(&inputs).unwrap(), 80);
    }

    #[test]
    fn test_combined_discount_must_not_exceed_total() {
        let mut inputs = inputs(60);
        let voucher = voucher_for(inputs.event_id, 50, Utc::now() + Duration::days(1));
        inputs.voucher = Some(&voucher);
        inputs.requested_points = Some(30);
        inputs.available_points = 30;
        // 80 > 60: reject, never clamp.
        assert!(matches!(
            compute_discount(&inputs),
            Err(AppError::Validation(_))
        ));
    }
}
