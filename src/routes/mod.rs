use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{health_check, transactions};
use crate::services::TransactionService;

/// Shared application state: one long-lived service handle per process,
/// cloned into every request.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TransactionService>,
}

pub fn create_routes(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/transactions", post(transactions::create_transaction))
        .route("/transactions/:reference", get(transactions::get_transaction))
        .route(
            "/transactions/:reference/payment-proof",
            patch(transactions::upload_payment_proof),
        )
        .route(
            "/transactions/:reference/accept",
            post(transactions::accept_transaction),
        )
        .route(
            "/transactions/:reference/reject",
            post(transactions::reject_transaction),
        )
        .route(
            "/users/:user_id/transactions",
            get(transactions::list_user_transactions),
        )
        .route(
            "/organizers/:organizer_id/transactions",
            get(transactions::list_organizer_transactions),
        )
        .layer(create_security_headers_layer(config.enable_hsts))
        .layer(create_cors_layer(&config.allowed_origins))
        .with_state(state)
}
