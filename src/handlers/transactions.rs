use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::require_user_id;
use crate::models::{Transaction, TransactionDetail};
use crate::routes::AppState;
use crate::services::transactions::CreateTransactionRequest;
use crate::store::Page;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, paged, success, PageMeta};

const MAX_PROOF_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

impl ListParams {
    fn page(&self) -> Page {
        Page {
            page: self.page.unwrap_or(1).max(1),
            limit: self.limit.unwrap_or(10).clamp(1, 100),
        }
    }
}

#[derive(Serialize)]
struct TransactionPayload {
    #[serde(flatten)]
    transaction: Transaction,
    details: Vec<TransactionDetail>,
}

pub async fn create_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateTransactionRequest>,
) -> Result<Response, AppError> {
    let buyer_id = require_user_id(&headers)?;
    let transaction = state.service.create_transaction(body, buyer_id).await?;
    Ok(success(transaction, "create transaction success").into_response())
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let requester_id = require_user_id(&headers)?;
    let (transaction, details) = state.service.get_transaction(&reference, requester_id).await?;
    let payload = TransactionPayload {
        transaction,
        details,
    };
    Ok(success(payload, "Transaction fetched successfully").into_response())
}

pub async fn upload_payment_proof(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let requester_id = require_user_id(&headers)?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("image/") {
        return Err(AppError::Validation(
            "payment proof must be an image".to_string(),
        ));
    }
    if body.len() > MAX_PROOF_BYTES {
        return Err(AppError::Validation(
            "payment proof exceeds the maximum size".to_string(),
        ));
    }
    state
        .service
        .upload_payment_proof(&reference, &body, requester_id)
        .await?;
    Ok(empty_success("upload payment proof success").into_response())
}

pub async fn accept_transaction(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let organizer_id = require_user_id(&headers)?;
    state
        .service
        .accept_transaction(&reference, organizer_id)
        .await?;
    Ok(empty_success("transaction accepted").into_response())
}

pub async fn reject_transaction(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let organizer_id = require_user_id(&headers)?;
    state
        .service
        .reject_transaction(&reference, organizer_id)
        .await?;
    Ok(empty_success("transaction rejected and stock restored").into_response())
}

pub async fn list_user_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let requester_id = require_user_id(&headers)?;
    let page = params.page();
    let (rows, total) = state
        .service
        .list_user_transactions(user_id, requester_id, params.search.as_deref(), page)
        .await?;
    Ok(paged(
        rows,
        PageMeta::new(page.page, page.limit, total),
        "User transactions fetched successfully",
    )
    .into_response())
}

pub async fn list_organizer_transactions(
    State(state): State<AppState>,
    Path(organizer_id): Path<Uuid>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let requester_id = require_user_id(&headers)?;
    let page = params.page();
    let (rows, total) = state
        .service
        .list_organizer_transactions(organizer_id, requester_id, page)
        .await?;
    Ok(paged(
        rows,
        PageMeta::new(page.page, page.limit, total),
        "Organizer transactions fetched successfully",
    )
    .into_response())
}
