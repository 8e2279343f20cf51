//! thriftd - contribution ledger and eligibility engine for a weekly thrift
//! savings platform.
//!
//! Members pay a fixed amount on a weekly cycle into a tracked account. The
//! daemon detects missed payments, computes default amounts, derives the
//! referral-driven bonus benefit and reconciles provider payment events into
//! the ledger exactly once.
//!
//! ## Components
//!
//! - **Ledger**: authoritative thrift state and the only mutation path
//! - **Cycle calculator**: pure weekly due/missed arithmetic
//! - **Referral tracker**: flat referral edge list with derived counts
//! - **Eligibility engine**: bonus + payment-health predicates, recomputed
//!   on demand
//! - **Webhook gateway**: verify → filter → correlate → apply, idempotent
//!   under provider replays
//! - **Sweep**: scheduled pass recording newly missed weeks as defaults

pub mod api;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod ledger;
pub mod referrals;
pub mod store;
pub mod sweep;
pub mod webhook;

pub use error::{LedgerError, Result};
