//! Webhook reconciliation gateway
//!
//! Entry point for payment notifications from the provider. Each event is
//! verified, filtered, correlated to a member's open thrift and applied to
//! the ledger exactly once. The provider retries on any non-success
//! response, so every failure before acknowledgement must be safe to retry;
//! the ledger's reference dedup is what makes that true.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::WebhookConfig;
use crate::error::{LedgerError, Result};
use crate::ledger::Ledger;
use crate::store::Store;

/// Header carrying the provider-issued signature.
pub const SIGNATURE_HEADER: &str = "verif-hash";

/// Only completed, successful charges reach the ledger.
const COMPLETED_CHARGE_EVENT: &str = "charge.completed";
const SUCCESSFUL_STATUS: &str = "successful";

/// Prefix namespacing provider transaction ids into ledger references.
const REFERENCE_PREFIX: &str = "flw-";

/// Inbound payment notification body.
#[derive(Debug, Deserialize)]
pub struct PaymentEvent {
    pub event: String,
    pub data: PaymentData,
}

#[derive(Debug, Deserialize)]
pub struct PaymentData {
    pub status: String,
    /// Minor currency units
    pub amount: i64,
    /// Provider transaction id; becomes the dedup reference
    pub tx_ref: String,
    /// Provider collection account identifier
    pub account_id: String,
}

/// How an event was absorbed. All three outcomes are acknowledged with
/// success to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The contribution was credited
    Applied { thrift_id: String, reference: String },
    /// Replay of an already-applied reference; deliberate no-op
    Duplicate { reference: String },
    /// Event type or status we do not reconcile; deliberate no-op
    Ignored { event: String },
}

pub struct WebhookGateway {
    store: Arc<Store>,
    ledger: Arc<Ledger>,
    config: WebhookConfig,
}

impl WebhookGateway {
    pub fn new(store: Arc<Store>, ledger: Arc<Ledger>, config: WebhookConfig) -> Self {
        Self { store, ledger, config }
    }

    /// Run one inbound event through verify → filter → correlate → apply.
    pub async fn process(&self, body: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        let presented = signature.ok_or(LedgerError::InvalidSignature)?;
        if !verify_signature(&self.config.secret, body, presented) {
            return Err(LedgerError::InvalidSignature);
        }

        let event: PaymentEvent = serde_json::from_slice(body)
            .map_err(|e| LedgerError::MalformedPayload(e.to_string()))?;

        if event.event != COMPLETED_CHARGE_EVENT || event.data.status != SUCCESSFUL_STATUS {
            info!(event = %event.event, status = %event.data.status, "Event ignored");
            return Ok(WebhookOutcome::Ignored { event: event.event });
        }

        let member = self
            .store
            .member_for_account(&event.data.account_id)?
            .ok_or_else(|| LedgerError::UnknownAccount(event.data.account_id.clone()))?;
        let thrift = self
            .store
            .open_thrift_for_member(&member.id)?
            .ok_or_else(|| LedgerError::UnknownAccount(event.data.account_id.clone()))?;

        let reference = format!("{REFERENCE_PREFIX}{}", event.data.tx_ref);
        let outcome = self
            .apply_within_deadline(thrift.id.clone(), event.data.amount, reference)
            .await;

        if let Ok(WebhookOutcome::Duplicate { reference }) = &outcome {
            warn!(reference = %reference, "Replay absorbed as no-op");
        }
        outcome
    }

    /// Apply under a bounded deadline. Expiry before the ledger transaction
    /// commits means the event is not-yet-applied; the provider's retry is
    /// made safe by the reference dedup, not by partial-state cleanup.
    async fn apply_within_deadline(
        &self,
        thrift_id: String,
        amount: i64,
        reference: String,
    ) -> Result<WebhookOutcome> {
        let ledger = self.ledger.clone();
        let deadline = Duration::from_millis(self.config.deadline_ms);

        let apply = tokio::task::spawn_blocking({
            let thrift_id = thrift_id.clone();
            let reference = reference.clone();
            move || ledger.apply_contribution(&thrift_id, amount, &reference)
        });

        let joined = tokio::time::timeout(deadline, apply)
            .await
            .map_err(|_| LedgerError::StoreUnavailable("event deadline exceeded".into()))?;
        let applied = joined
            .map_err(|e| LedgerError::StoreUnavailable(format!("apply task failed: {e}")))?;

        match applied {
            Ok(thrift) => {
                info!(thrift_id = %thrift.id, amount, reference = %reference, "Event reconciled");
                Ok(WebhookOutcome::Applied {
                    thrift_id: thrift.id,
                    reference,
                })
            }
            Err(LedgerError::DuplicateReference(reference)) => {
                Ok(WebhookOutcome::Duplicate { reference })
            }
            Err(e) => Err(e),
        }
    }
}

/// Expected signature: hex-encoded SHA-256 over the shared secret followed
/// by the raw request body.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(body);
    hex::encode(hasher.finalize())
}

pub fn verify_signature(secret: &str, body: &[u8], presented: &str) -> bool {
    compute_signature(secret, body) == presented
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThriftConfig;
    use crate::ledger::models::{Member, VirtualAccount};
    use chrono::NaiveDate;

    const SECRET: &str = "test-secret";

    fn fixture() -> (WebhookGateway, Arc<Ledger>, String) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store
            .insert_member(&Member {
                id: "m-1".into(),
                name: "Ada".into(),
                referral_code: "ada-1".into(),
                referred_by: None,
                created_at: 0,
            })
            .unwrap();
        store
            .bind_virtual_account(&VirtualAccount {
                account_id: "va-1".into(),
                member_id: "m-1".into(),
            })
            .unwrap();

        let ledger = Arc::new(Ledger::new(store.clone(), ThriftConfig::default()));
        let thrift = ledger
            .open_thrift(
                "m-1",
                Some(1000),
                Some(4),
                NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            )
            .unwrap();

        let config = WebhookConfig {
            secret: SECRET.into(),
            deadline_ms: 5_000,
        };
        (
            WebhookGateway::new(store, ledger.clone(), config),
            ledger,
            thrift.id,
        )
    }

    fn charge(tx_ref: &str, account: &str, amount: i64) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "event": "charge.completed",
            "data": {
                "status": "successful",
                "amount": amount,
                "tx_ref": tx_ref,
                "account_id": account,
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_rejects_bad_signature_before_anything_else() {
        let (gateway, _ledger, _) = fixture();
        let body = charge("A", "va-1", 1000);

        let err = gateway.process(&body, Some("not-the-signature")).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidSignature));

        let err = gateway.process(&body, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_malformed_body_rejected() {
        let (gateway, _ledger, _) = fixture();
        let body = b"{not json";
        let sig = compute_signature(SECRET, body);
        let err = gateway.process(body, Some(sig.as_str())).await.unwrap_err();
        assert!(matches!(err, LedgerError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn test_non_charge_events_are_ignored_not_failed() {
        let (gateway, ledger, thrift_id) = fixture();
        let body = serde_json::to_vec(&serde_json::json!({
            "event": "transfer.completed",
            "data": {
                "status": "successful",
                "amount": 1000,
                "tx_ref": "A",
                "account_id": "va-1",
            }
        }))
        .unwrap();
        let sig = compute_signature(SECRET, &body);

        let outcome = gateway.process(&body, Some(sig.as_str())).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));

        let thrift = ledger.get_thrift(&thrift_id).unwrap();
        assert_eq!(thrift.total_contributed, 0);
    }

    #[tokio::test]
    async fn test_failed_charge_is_ignored() {
        let (gateway, _ledger, _) = fixture();
        let body = serde_json::to_vec(&serde_json::json!({
            "event": "charge.completed",
            "data": {
                "status": "failed",
                "amount": 1000,
                "tx_ref": "A",
                "account_id": "va-1",
            }
        }))
        .unwrap();
        let sig = compute_signature(SECRET, &body);
        let outcome = gateway.process(&body, Some(sig.as_str())).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
    }

    #[tokio::test]
    async fn test_unknown_account_rejected() {
        let (gateway, _ledger, _) = fixture();
        let body = charge("A", "va-unknown", 1000);
        let sig = compute_signature(SECRET, &body);
        let err = gateway.process(&body, Some(sig.as_str())).await.unwrap_err();
        assert!(matches!(err, LedgerError::UnknownAccount(_)));
    }

    #[tokio::test]
    async fn test_apply_then_replay_absorbed_once() {
        let (gateway, ledger, thrift_id) = fixture();
        let body = charge("A", "va-1", 1000);
        let sig = compute_signature(SECRET, &body);

        let first = gateway.process(&body, Some(sig.as_str())).await.unwrap();
        assert!(matches!(first, WebhookOutcome::Applied { .. }));

        let second = gateway.process(&body, Some(sig.as_str())).await.unwrap();
        assert!(matches!(second, WebhookOutcome::Duplicate { .. }));

        let thrift = ledger.get_thrift(&thrift_id).unwrap();
        assert_eq!(thrift.total_contributed, 1000);
        assert_eq!(thrift.balance, 1000);
    }

    #[test]
    fn test_signature_is_deterministic_and_body_sensitive() {
        let a = compute_signature("s", b"body");
        assert_eq!(a, compute_signature("s", b"body"));
        assert_ne!(a, compute_signature("s", b"body2"));
        assert_ne!(a, compute_signature("s2", b"body"));
    }
}
