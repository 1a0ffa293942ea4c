use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

/// Success envelope shared by every endpoint. List endpoints attach a
/// `meta` pagination block; everything else leaves it off the wire.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

/// Pagination block attached to list responses.
#[derive(Debug, Clone, Serialize)]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl PageMeta {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = match limit {
            limit if limit > 0 => (total + limit - 1) / limit,
            _ => 0,
        };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: ApiErrorBody,
}

pub fn success<T: Serialize>(data: T, message: impl Into<String>) -> impl IntoResponse {
    let body = ApiResponse {
        success: true,
        data: Some(data),
        message: Some(message.into()),
        meta: None,
    };
    (StatusCode::OK, Json(body))
}

pub fn paged<T: Serialize>(
    data: T,
    meta: PageMeta,
    message: impl Into<String>,
) -> impl IntoResponse {
    let body = ApiResponse {
        success: true,
        data: Some(data),
        message: Some(message.into()),
        meta: Some(meta),
    };
    (StatusCode::OK, Json(body))
}

pub fn empty_success(message: impl Into<String>) -> impl IntoResponse {
    let body = ApiResponse::<()> {
        success: true,
        data: None,
        message: Some(message.into()),
        meta: None,
    };
    (StatusCode::OK, Json(body))
}

pub fn error(
    code: &str,
    message: impl Into<String>,
    details: Option<Value>,
    status: StatusCode,
) -> Response {
    let body = ApiErrorResponse {
        success: false,
        error: ApiErrorBody {
            code: code.to_string(),
            message: message.into(),
            details,
        },
    };
    (status, Json(body)).into_response()
}
