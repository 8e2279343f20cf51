//! Persisted record types for the contribution ledger.
//!
//! Amounts are i64 minor currency units throughout. `start_date` is a
//! calendar date; event timestamps are unix seconds.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A platform member. Referral counts and the bonus flag are derived on
/// demand and never authoritative (see the eligibility engine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    /// This member's own referral code
    pub referral_code: String,
    /// Weak back-reference to the member who recruited this one
    pub referred_by: Option<String>,
    pub created_at: i64,
}

/// Provider-side collection account, bound 1:1 to a member. Read-only from
/// the ledger's perspective; used only to correlate inbound payment events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualAccount {
    pub account_id: String,
    pub member_id: String,
}

/// Lifecycle of a single savings cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThriftStatus {
    Active,
    Completed,
    Defaulted,
    Cancelled,
}

impl ThriftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThriftStatus::Active => "active",
            ThriftStatus::Completed => "completed",
            ThriftStatus::Defaulted => "defaulted",
            ThriftStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ThriftStatus::Active),
            "completed" => Some(ThriftStatus::Completed),
            "defaulted" => Some(ThriftStatus::Defaulted),
            "cancelled" => Some(ThriftStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states accept no further mutations (withdraw carves out an
    /// exception for Completed so a finished cycle can be drawn down).
    pub fn is_terminal(&self) -> bool {
        matches!(self, ThriftStatus::Completed | ThriftStatus::Cancelled)
    }
}

/// One member's weekly-contribution savings cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thrift {
    pub id: String,
    pub member_id: String,
    /// Fixed positive amount due every week
    pub weekly_contribution: i64,
    /// Agreed cycle length in weeks
    pub planned_weeks: u32,
    pub balance: i64,
    pub total_contributed: i64,
    pub start_date: NaiveDate,
    /// First not-yet-settled week index; only ever increases
    pub current_week: u32,
    pub status: ThriftStatus,
    /// Strictly increasing distinct week indices recorded as missed
    pub default_weeks: Vec<u32>,
    /// Sum owed for defaulted weeks
    pub default_amount: i64,
    pub created_at: i64,
}

impl Thrift {
    /// Contribution target for the whole cycle.
    pub fn target_amount(&self) -> i64 {
        self.weekly_contribution * i64::from(self.planned_weeks)
    }

    /// True once the cycle target has been reached.
    pub fn is_paid(&self) -> bool {
        self.total_contributed >= self.target_amount()
    }

    /// Week indices considered funded: contributions cover the earliest
    /// non-defaulted weeks in order. Defaulted weeks stay owed through
    /// `default_amount` and are never retroactively marked paid.
    pub fn paid_weeks(&self) -> Vec<u32> {
        // Capped at planned_weeks: funded units beyond the cycle length can
        // never mark more weeks, and the cap bounds the allocation below.
        let funded = if self.weekly_contribution > 0 {
            (self.total_contributed / self.weekly_contribution)
                .min(i64::from(self.planned_weeks)) as u32
        } else {
            0
        };
        let mut paid = Vec::with_capacity(funded as usize);
        let mut week = 0u32;
        while (paid.len() as u32) < funded && week < self.planned_weeks {
            if !self.default_weeks.contains(&week) {
                paid.push(week);
            }
            week += 1;
        }
        paid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Contribution,
    Withdrawal,
    Refund,
    Penalty,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Contribution => "contribution",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Refund => "refund",
            TransactionKind::Penalty => "penalty",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "contribution" => Some(TransactionKind::Contribution),
            "withdrawal" => Some(TransactionKind::Withdrawal),
            "refund" => Some(TransactionKind::Refund),
            "penalty" => Some(TransactionKind::Penalty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Successful,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Successful => "successful",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "successful" => Some(TransactionStatus::Successful),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

/// Immutable record of one ledger-affecting event. Never mutated after
/// reaching a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub thrift_id: String,
    pub member_id: String,
    pub kind: TransactionKind,
    pub amount: i64,
    pub status: TransactionStatus,
    /// Provider transaction id; deduplication key for contributions
    pub external_reference: String,
    pub created_at: i64,
}

/// Derived referral counts for one member at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralCounts {
    pub total_referrals: u32,
    pub referrals_within_window: u32,
    pub active_referrals: u32,
}
