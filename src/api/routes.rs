//! HTTP handlers

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::AppState;
use crate::error::LedgerError;
use crate::ledger::models::{Thrift, Transaction, TransactionKind, TransactionStatus};
use crate::webhook::{WebhookOutcome, SIGNATURE_HEADER};

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn reject(e: LedgerError) -> ApiError {
    let status = match &e {
        LedgerError::InvalidSignature => StatusCode::UNAUTHORIZED,
        LedgerError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        LedgerError::UnknownAccount(_) | LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
        // An already-applied reference is acknowledged, never failed: the
        // provider must stop retrying a delivery we have absorbed.
        LedgerError::DuplicateReference(_) => StatusCode::OK,
        LedgerError::InvalidAmount
        | LedgerError::InsufficientBalance { .. }
        | LedgerError::InvalidStateTransition { .. }
        | LedgerError::SelfReferral
        | LedgerError::DuplicateReferral => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %e, "Request failed on store error");
    }
    (
        status,
        Json(ErrorBody {
            success: status == StatusCode::OK,
            error: e.to_string(),
        }),
    )
}

// === Webhook ===

#[derive(Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub outcome: &'static str,
}

/// POST /webhooks/payments — provider notification entry point.
///
/// Duplicates and non-charge events are acknowledged with success so the
/// provider stops retrying; only signature, payload, correlation and
/// transient store problems are surfaced as failures.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .gateway
        .process(&body, signature)
        .await
        .map_err(reject)?;

    let outcome = match outcome {
        WebhookOutcome::Applied { .. } => "applied",
        WebhookOutcome::Duplicate { .. } => "duplicate",
        WebhookOutcome::Ignored { .. } => "ignored",
    };
    Ok(Json(WebhookAck { success: true, outcome }))
}

// === Ledger API ===

#[derive(Deserialize)]
pub struct OpenThriftRequest {
    pub member_id: String,
    pub weekly_contribution: Option<i64>,
    pub planned_weeks: Option<u32>,
    /// Defaults to today
    pub start_date: Option<NaiveDate>,
}

/// POST /api/thrifts
pub async fn open_thrift(
    State(state): State<AppState>,
    Json(req): Json<OpenThriftRequest>,
) -> Result<Json<Thrift>, ApiError> {
    let start_date = req.start_date.unwrap_or_else(|| Utc::now().date_naive());
    let thrift = state
        .ledger
        .open_thrift(
            &req.member_id,
            req.weekly_contribution,
            req.planned_weeks,
            start_date,
        )
        .map_err(reject)?;
    Ok(Json(thrift))
}

/// GET /api/thrifts/:id
pub async fn get_thrift(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Thrift>, ApiError> {
    let thrift = state.ledger.get_thrift(&id).map_err(reject)?;
    Ok(Json(thrift))
}

#[derive(Deserialize)]
pub struct TransactionFilter {
    pub kind: Option<String>,
    pub status: Option<String>,
}

/// GET /api/thrifts/:id/transactions?kind=&status=
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(filter): Query<TransactionFilter>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let kind = match &filter.kind {
        Some(s) => Some(
            TransactionKind::parse(s)
                .ok_or_else(|| reject(LedgerError::MalformedPayload(format!("unknown kind {s}"))))?,
        ),
        None => None,
    };
    let status = match &filter.status {
        Some(s) => Some(TransactionStatus::parse(s).ok_or_else(|| {
            reject(LedgerError::MalformedPayload(format!("unknown status {s}")))
        })?),
        None => None,
    };

    let txs = state.ledger.transactions(&id, kind, status).map_err(reject)?;
    Ok(Json(txs))
}

#[derive(Deserialize)]
pub struct WithdrawRequest {
    pub amount: i64,
}

/// POST /api/thrifts/:id/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<Thrift>, ApiError> {
    let thrift = state.ledger.withdraw(&id, req.amount).map_err(reject)?;
    Ok(Json(thrift))
}

/// POST /api/thrifts/:id/cancel
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Thrift>, ApiError> {
    let thrift = state.ledger.cancel(&id).map_err(reject)?;
    Ok(Json(thrift))
}

// === Eligibility API ===

/// GET /api/members/:id/eligibility
pub async fn get_eligibility(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::eligibility::EligibilityReport>, ApiError> {
    let report = state
        .eligibility
        .eligibility_for(&id, Utc::now().timestamp())
        .map_err(reject)?;
    Ok(Json(report))
}
