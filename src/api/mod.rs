//! HTTP surface: the payment webhook plus the ledger and eligibility API
//! consumed by dashboards and admin tooling.

pub mod routes;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::eligibility::EligibilityEngine;
use crate::ledger::Ledger;
use crate::webhook::WebhookGateway;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub gateway: Arc<WebhookGateway>,
    pub eligibility: Arc<EligibilityEngine>,
}

/// Assemble the router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Provider-facing webhook
        .route("/webhooks/payments", post(routes::payment_webhook))
        // Ledger API
        .route("/api/thrifts", post(routes::open_thrift))
        .route("/api/thrifts/:id", get(routes::get_thrift))
        .route("/api/thrifts/:id/transactions", get(routes::list_transactions))
        .route("/api/thrifts/:id/withdraw", post(routes::withdraw))
        .route("/api/thrifts/:id/cancel", post(routes::cancel))
        // Eligibility API
        .route("/api/members/:id/eligibility", get(routes::get_eligibility))
        // Health check
        .route("/health", get(routes::health))
        .with_state(state)
}
