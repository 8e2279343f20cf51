//! Eligibility engine
//!
//! Two independent facts gate the foodstuff benefit: member-level bonus
//! eligibility (referral thresholds) and thrift-level payment health. Both
//! are recomputed from store state on every query; any persisted flag is
//! advisory only.

use std::sync::Arc;

use serde::Serialize;

use crate::config::EligibilityConfig;
use crate::error::{LedgerError, Result};
use crate::ledger::models::{ReferralCounts, Thrift, ThriftStatus};
use crate::referrals::ReferralTracker;
use crate::store::Store;

/// Every threshold is independently necessary.
pub fn member_bonus_eligible(counts: &ReferralCounts, config: &EligibilityConfig) -> bool {
    counts.total_referrals >= config.min_total_referrals
        && counts.referrals_within_window >= config.min_recent_referrals
        && counts.active_referrals >= config.min_active_referrals
}

/// A thrift is payment-healthy when it has reached its target without any
/// unresolved default.
pub fn thrift_payment_eligible(thrift: &Thrift) -> bool {
    thrift.status != ThriftStatus::Defaulted && thrift.is_paid()
}

/// Answer returned to dashboards and notification plumbing.
#[derive(Debug, Clone, Serialize)]
pub struct EligibilityReport {
    pub member_id: String,
    pub bonus_eligible: bool,
    pub thrift_eligible: bool,
    pub overall_eligible: bool,
    pub counts: ReferralCounts,
}

pub struct EligibilityEngine {
    store: Arc<Store>,
    referrals: Arc<ReferralTracker>,
    config: EligibilityConfig,
}

impl EligibilityEngine {
    pub fn new(store: Arc<Store>, referrals: Arc<ReferralTracker>, config: EligibilityConfig) -> Self {
        Self { store, referrals, config }
    }

    /// Recompute both predicates from store state as of `as_of` (unix secs).
    ///
    /// The thrift fact is evaluated against the member's most recent thrift;
    /// a member with no thrift at all is payment-ineligible.
    pub fn eligibility_for(&self, member_id: &str, as_of: i64) -> Result<EligibilityReport> {
        if self.store.get_member(member_id)?.is_none() {
            return Err(LedgerError::NotFound {
                kind: "member",
                id: member_id.to_string(),
            });
        }

        let counts = self
            .referrals
            .counts_for(member_id, as_of, self.config.recent_window_days)?;
        let bonus_eligible = member_bonus_eligible(&counts, &self.config);

        let thrift_eligible = self
            .latest_thrift(member_id)?
            .map(|t| thrift_payment_eligible(&t))
            .unwrap_or(false);

        Ok(EligibilityReport {
            member_id: member_id.to_string(),
            bonus_eligible,
            thrift_eligible,
            overall_eligible: bonus_eligible && thrift_eligible,
            counts,
        })
    }

    fn latest_thrift(&self, member_id: &str) -> Result<Option<Thrift>> {
        self.store.with_conn(|conn| {
            use rusqlite::OptionalExtension;
            let row = conn
                .prepare_cached(
                    "SELECT id FROM thrifts WHERE member_id = ?1
                     ORDER BY created_at DESC LIMIT 1",
                )?
                .query_row([member_id], |row| row.get::<_, String>(0))
                .optional()?;
            match row {
                Some(id) => crate::store::get_thrift_with(conn, &id),
                None => Ok(None),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn counts(total: u32, recent: u32, active: u32) -> ReferralCounts {
        ReferralCounts {
            total_referrals: total,
            referrals_within_window: recent,
            active_referrals: active,
        }
    }

    fn thrift(status: ThriftStatus, total_contributed: i64) -> Thrift {
        Thrift {
            id: "t".into(),
            member_id: "m".into(),
            weekly_contribution: 1000,
            planned_weeks: 4,
            balance: total_contributed,
            total_contributed,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            current_week: 0,
            status,
            default_weeks: vec![],
            default_amount: 0,
            created_at: 0,
        }
    }

    #[test]
    fn test_each_threshold_independently_necessary() {
        let config = EligibilityConfig::default();
        assert!(member_bonus_eligible(&counts(5, 3, 2), &config));
        assert!(!member_bonus_eligible(&counts(4, 3, 2), &config));
        assert!(!member_bonus_eligible(&counts(5, 2, 2), &config));
        assert!(!member_bonus_eligible(&counts(5, 3, 1), &config));
    }

    #[test]
    fn test_thresholds_are_minimums() {
        let config = EligibilityConfig::default();
        assert!(member_bonus_eligible(&counts(12, 7, 6), &config));
    }

    #[test]
    fn test_payment_eligibility() {
        assert!(thrift_payment_eligible(&thrift(ThriftStatus::Completed, 4000)));
        assert!(thrift_payment_eligible(&thrift(ThriftStatus::Active, 4000)));
        // Paid in full but defaulted: still ineligible
        assert!(!thrift_payment_eligible(&thrift(ThriftStatus::Defaulted, 4000)));
        // Healthy but short of target
        assert!(!thrift_payment_eligible(&thrift(ThriftStatus::Active, 3000)));
    }
}
