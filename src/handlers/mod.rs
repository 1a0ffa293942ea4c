use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

use crate::utils::error::AppError;
use crate::utils::response::success;

pub mod transactions;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "tribune-api",
    };

    success(payload, "Health check successful").into_response()
}

/// Caller identity as asserted by the upstream auth gateway. Token
/// verification happens there; this service only reads the forwarded id.
pub(crate) fn require_user_id(headers: &HeaderMap) -> Result<Uuid, AppError> {
    let raw = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Auth("missing X-User-Id header".to_string()))?;
    raw.parse()
        .map_err(|_| AppError::Auth("invalid X-User-Id header".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_require_user_id_parses_uuid() {
        let mut headers = HeaderMap::new();
        let id = Uuid::new_v4();
        headers.insert("x-user-id", HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(require_user_id(&headers).unwrap(), id);
    }

    #[test]
    fn test_require_user_id_rejects_missing_or_garbage() {
        let headers = HeaderMap::new();
        assert!(matches!(
            require_user_id(&headers),
            Err(AppError::Auth(_))
        ));

        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("not-a-uuid"));
        assert!(matches!(
            require_user_id(&headers),
            Err(AppError::Auth(_))
        ));
    }
}
