//! Domain error kinds shared across the ledger, gateway and trackers.

/// Errors produced by ledger operations and the reconciliation gateway.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("Webhook signature did not match")]
    InvalidSignature,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("No member is bound to account {0}")]
    UnknownAccount(String),

    /// Not an error to the caller: the referenced payment event was already
    /// applied. Surfaced so callers can acknowledge it as a no-op.
    #[error("Reference {0} was already applied")]
    DuplicateReference(String),

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    #[error("Operation {op} not allowed while thrift is {status}")]
    InvalidStateTransition { op: &'static str, status: String },

    #[error("A member cannot refer themselves")]
    SelfReferral,

    #[error("Referral edge already recorded")]
    DuplicateReferral,

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Transient store failure; safe to retry.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::StoreUnavailable(format!("column encoding: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    /// Transient errors may be retried by the caller; everything else is
    /// terminal for the triggering request.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::StoreUnavailable(_))
    }
}
