//! Contribution ledger
//!
//! Owns the authoritative state of each thrift account and exposes the only
//! operations allowed to mutate it. Every operation runs inside one store
//! transaction: the balance update, week advance and transaction append
//! commit together or not at all.

pub mod cycle;
pub mod models;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ThriftConfig;
use crate::error::{LedgerError, Result};
use crate::store::{
    get_thrift_with, insert_transaction_with, save_thrift_with, successful_reference_exists, Store,
};
use models::{Thrift, ThriftStatus, Transaction, TransactionKind, TransactionStatus};

/// The ledger: all thrift mutations go through here.
pub struct Ledger {
    store: Arc<Store>,
    config: ThriftConfig,
}

impl Ledger {
    pub fn new(store: Arc<Store>, config: ThriftConfig) -> Self {
        Self { store, config }
    }

    /// Open a new active thrift for a member.
    pub fn open_thrift(
        &self,
        member_id: &str,
        weekly_contribution: Option<i64>,
        planned_weeks: Option<u32>,
        start_date: NaiveDate,
    ) -> Result<Thrift> {
        let weekly = weekly_contribution.unwrap_or(self.config.weekly_contribution_default);
        let planned = planned_weeks.unwrap_or(self.config.planned_weeks_default);
        if weekly <= 0 || planned == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if self.store.get_member(member_id)?.is_none() {
            return Err(LedgerError::NotFound {
                kind: "member",
                id: member_id.to_string(),
            });
        }

        let thrift = Thrift {
            id: Uuid::new_v4().to_string(),
            member_id: member_id.to_string(),
            weekly_contribution: weekly,
            planned_weeks: planned,
            balance: 0,
            total_contributed: 0,
            start_date,
            current_week: 0,
            status: ThriftStatus::Active,
            default_weeks: Vec::new(),
            default_amount: 0,
            created_at: now(),
        };
        self.store.insert_thrift(&thrift)?;
        info!(thrift_id = %thrift.id, member_id, weekly, planned, "Opened thrift");
        Ok(thrift)
    }

    /// Credit a contribution against a thrift.
    ///
    /// Replays of the same `external_reference` are absorbed: the duplicate
    /// check happens inside the same store transaction that credits the
    /// balance, so two concurrent deliveries resolve to exactly one credit.
    pub fn apply_contribution(
        &self,
        thrift_id: &str,
        amount: i64,
        external_reference: &str,
    ) -> Result<Thrift> {
        self.apply_contribution_at(thrift_id, amount, external_reference, today())
    }

    pub fn apply_contribution_at(
        &self,
        thrift_id: &str,
        amount: i64,
        external_reference: &str,
        as_of: NaiveDate,
    ) -> Result<Thrift> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let updated = self.store.with_tx(|conn| {
            let mut thrift = require_thrift(conn, thrift_id)?;
            reject_terminal(&thrift, "apply_contribution")?;

            if successful_reference_exists(conn, thrift_id, external_reference)? {
                return Err(LedgerError::DuplicateReference(external_reference.to_string()));
            }

            thrift.balance = thrift
                .balance
                .checked_add(amount)
                .ok_or(LedgerError::InvalidAmount)?;
            thrift.total_contributed = thrift
                .total_contributed
                .checked_add(amount)
                .ok_or(LedgerError::InvalidAmount)?;

            // Advance the week pointer to just past the highest funded week,
            // capped by the calendar and by the planned cycle length.
            let candidate = thrift
                .paid_weeks()
                .last()
                .map(|w| w + 1)
                .unwrap_or(0)
                .min(cycle::elapsed_weeks(thrift.start_date, as_of) + 1)
                .min(thrift.planned_weeks);
            thrift.current_week = thrift.current_week.max(candidate);

            if thrift.status == ThriftStatus::Active && thrift.is_paid() {
                thrift.status = ThriftStatus::Completed;
            }

            save_thrift_with(conn, &thrift)?;
            insert_transaction_with(
                conn,
                &new_transaction(
                    &thrift,
                    TransactionKind::Contribution,
                    amount,
                    external_reference,
                ),
            )?;
            Ok(thrift)
        })?;

        info!(
            thrift_id,
            amount,
            reference = external_reference,
            current_week = updated.current_week,
            status = updated.status.as_str(),
            "Applied contribution"
        );
        Ok(updated)
    }

    /// Record missed weeks found by the sweep and persist its week advance.
    /// Idempotent: a call that adds nothing new leaves the row untouched.
    pub fn record_default(
        &self,
        thrift_id: &str,
        week_indices: &[u32],
        new_current_week: u32,
    ) -> Result<Thrift> {
        let updated = self.store.with_tx(|conn| {
            let mut thrift = require_thrift(conn, thrift_id)?;
            reject_terminal(&thrift, "record_default")?;

            let mut added = false;
            for &week in week_indices {
                if !thrift.default_weeks.contains(&week) {
                    thrift.default_weeks.push(week);
                    added = true;
                }
            }
            let advanced = new_current_week > thrift.current_week;
            if !added && !advanced {
                return Ok(thrift);
            }

            thrift.default_weeks.sort_unstable();
            thrift.current_week = thrift.current_week.max(new_current_week);
            // Every recorded default week sits strictly below the pointer
            if let Some(&highest) = thrift.default_weeks.last() {
                thrift.current_week = thrift.current_week.max(highest + 1);
            }
            thrift.default_amount =
                thrift.weekly_contribution * thrift.default_weeks.len() as i64;
            if added && thrift.status == ThriftStatus::Active {
                thrift.status = ThriftStatus::Defaulted;
            }

            save_thrift_with(conn, &thrift)?;
            Ok(thrift)
        })?;

        if !updated.default_weeks.is_empty() {
            debug!(
                thrift_id,
                default_weeks = ?updated.default_weeks,
                default_amount = updated.default_amount,
                "Default state recorded"
            );
        }
        Ok(updated)
    }

    /// Draw funds out of an active or completed thrift.
    pub fn withdraw(&self, thrift_id: &str, amount: i64) -> Result<Thrift> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let updated = self.store.with_tx(|conn| {
            let mut thrift = require_thrift(conn, thrift_id)?;
            if !matches!(thrift.status, ThriftStatus::Active | ThriftStatus::Completed) {
                return Err(invalid_transition(&thrift, "withdraw"));
            }
            if amount > thrift.balance {
                return Err(LedgerError::InsufficientBalance {
                    requested: amount,
                    available: thrift.balance,
                });
            }

            thrift.balance -= amount;
            save_thrift_with(conn, &thrift)?;
            insert_transaction_with(
                conn,
                &new_transaction(
                    &thrift,
                    TransactionKind::Withdrawal,
                    amount,
                    &format!("wd-{}", Uuid::new_v4()),
                ),
            )?;
            Ok(thrift)
        })?;

        info!(thrift_id, amount, balance = updated.balance, "Withdrawal applied");
        Ok(updated)
    }

    /// Cancel a thrift. Allowed only from Active or Defaulted; terminal.
    ///
    /// When `refund_on_cancel` is configured, outstanding defaults are
    /// settled out of the balance as a penalty and the remainder refunded,
    /// leaving the balance at zero.
    pub fn cancel(&self, thrift_id: &str) -> Result<Thrift> {
        let refund_on_cancel = self.config.refund_on_cancel;
        let updated = self.store.with_tx(|conn| {
            let mut thrift = require_thrift(conn, thrift_id)?;
            if !matches!(thrift.status, ThriftStatus::Active | ThriftStatus::Defaulted) {
                return Err(invalid_transition(&thrift, "cancel"));
            }

            if refund_on_cancel {
                let penalty = thrift.default_amount.min(thrift.balance);
                if penalty > 0 {
                    thrift.balance -= penalty;
                    insert_transaction_with(
                        conn,
                        &new_transaction(
                            &thrift,
                            TransactionKind::Penalty,
                            penalty,
                            &format!("pen-{}", Uuid::new_v4()),
                        ),
                    )?;
                }
                let refund = thrift.balance;
                if refund > 0 {
                    thrift.balance = 0;
                    insert_transaction_with(
                        conn,
                        &new_transaction(
                            &thrift,
                            TransactionKind::Refund,
                            refund,
                            &format!("rf-{}", Uuid::new_v4()),
                        ),
                    )?;
                }
            }

            thrift.status = ThriftStatus::Cancelled;
            save_thrift_with(conn, &thrift)?;
            Ok(thrift)
        })?;

        info!(thrift_id, refunded = refund_on_cancel, "Thrift cancelled");
        Ok(updated)
    }

    pub fn get_thrift(&self, thrift_id: &str) -> Result<Thrift> {
        self.store.get_thrift(thrift_id)?.ok_or(LedgerError::NotFound {
            kind: "thrift",
            id: thrift_id.to_string(),
        })
    }

    pub fn transactions(
        &self,
        thrift_id: &str,
        kind: Option<TransactionKind>,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<Transaction>> {
        // Surface a 404 rather than an empty list for unknown thrifts
        self.get_thrift(thrift_id)?;
        self.store.transactions_for_thrift(thrift_id, kind, status)
    }
}

fn require_thrift(conn: &rusqlite::Connection, thrift_id: &str) -> Result<Thrift> {
    get_thrift_with(conn, thrift_id)?.ok_or(LedgerError::NotFound {
        kind: "thrift",
        id: thrift_id.to_string(),
    })
}

fn reject_terminal(thrift: &Thrift, op: &'static str) -> Result<()> {
    if thrift.status.is_terminal() {
        return Err(invalid_transition(thrift, op));
    }
    Ok(())
}

fn invalid_transition(thrift: &Thrift, op: &'static str) -> LedgerError {
    LedgerError::InvalidStateTransition {
        op,
        status: thrift.status.as_str().to_string(),
    }
}

fn new_transaction(
    thrift: &Thrift,
    kind: TransactionKind,
    amount: i64,
    external_reference: &str,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4().to_string(),
        thrift_id: thrift.id.clone(),
        member_id: thrift.member_id.clone(),
        kind,
        amount,
        status: TransactionStatus::Successful,
        external_reference: external_reference.to_string(),
        created_at: now(),
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
