//! Referral graph tracker
//!
//! The referral relationship is kept as a flat edge list with derived
//! counts, so `counts_for` is a handful of aggregate scans rather than a
//! recursive descent through referral chains.

use std::sync::Arc;

use tracing::info;

use crate::error::{LedgerError, Result};
use crate::ledger::models::ReferralCounts;
use crate::store::Store;

pub struct ReferralTracker {
    store: Arc<Store>,
}

impl ReferralTracker {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Append a referral edge once. Self-edges and replays are rejected.
    pub fn record_referral(
        &self,
        referrer_id: &str,
        referred_id: &str,
        joined_at: i64,
    ) -> Result<()> {
        if referrer_id == referred_id {
            return Err(LedgerError::SelfReferral);
        }
        for (kind, id) in [("member", referrer_id), ("member", referred_id)] {
            if self.store.get_member(id)?.is_none() {
                return Err(LedgerError::NotFound {
                    kind,
                    id: id.to_string(),
                });
            }
        }

        self.store.with_conn(|conn| {
            let exists: i64 = conn
                .prepare_cached(
                    "SELECT COUNT(*) FROM referrals WHERE referrer_id = ?1 AND referred_id = ?2",
                )?
                .query_row([referrer_id, referred_id], |row| row.get(0))?;
            if exists > 0 {
                return Err(LedgerError::DuplicateReferral);
            }
            conn.prepare_cached(
                "INSERT INTO referrals (referrer_id, referred_id, joined_at) VALUES (?1, ?2, ?3)",
            )?
            .execute(rusqlite::params![referrer_id, referred_id, joined_at])?;
            Ok(())
        })?;

        info!(referrer_id, referred_id, "Referral recorded");
        Ok(())
    }

    /// Derived counts for a member at `as_of` (unix seconds).
    ///
    /// "Recent" counts edges whose `joined_at` falls within the rolling
    /// window; "active" counts referred members owning at least one thrift
    /// that is active or completed.
    pub fn counts_for(&self, member_id: &str, as_of: i64, window_days: u32) -> Result<ReferralCounts> {
        let window_start = as_of - i64::from(window_days) * 86_400;

        self.store.with_conn(|conn| {
            let total: u32 = conn
                .prepare_cached("SELECT COUNT(*) FROM referrals WHERE referrer_id = ?1")?
                .query_row([member_id], |row| row.get(0))?;

            let within_window: u32 = conn
                .prepare_cached(
                    "SELECT COUNT(*) FROM referrals
                     WHERE referrer_id = ?1 AND joined_at >= ?2",
                )?
                .query_row(rusqlite::params![member_id, window_start], |row| row.get(0))?;

            let active: u32 = conn
                .prepare_cached(
                    "SELECT COUNT(*) FROM referrals r
                     WHERE r.referrer_id = ?1
                       AND EXISTS (SELECT 1 FROM thrifts t
                                   WHERE t.member_id = r.referred_id
                                     AND t.status IN ('active', 'completed'))",
                )?
                .query_row([member_id], |row| row.get(0))?;

            Ok(ReferralCounts {
                total_referrals: total,
                referrals_within_window: within_window,
                active_referrals: active,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThriftConfig;
    use crate::ledger::models::Member;
    use crate::ledger::Ledger;
    use chrono::NaiveDate;

    const DAY: i64 = 86_400;

    fn member(id: &str) -> Member {
        Member {
            id: id.to_string(),
            name: id.to_string(),
            referral_code: format!("code-{id}"),
            referred_by: None,
            created_at: 0,
        }
    }

    fn fixture(n: usize) -> (Arc<Store>, ReferralTracker) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.insert_member(&member("m-0")).unwrap();
        for i in 1..=n {
            store.insert_member(&member(&format!("m-{i}"))).unwrap();
        }
        let tracker = ReferralTracker::new(store.clone());
        (store, tracker)
    }

    #[test]
    fn test_self_referral_rejected() {
        let (_, tracker) = fixture(0);
        assert!(matches!(
            tracker.record_referral("m-0", "m-0", 0),
            Err(LedgerError::SelfReferral)
        ));
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let (_, tracker) = fixture(1);
        tracker.record_referral("m-0", "m-1", 100).unwrap();
        assert!(matches!(
            tracker.record_referral("m-0", "m-1", 200),
            Err(LedgerError::DuplicateReferral)
        ));
    }

    #[test]
    fn test_counts_window_and_active() {
        let (store, tracker) = fixture(3);
        let as_of = 100 * DAY;

        tracker.record_referral("m-0", "m-1", as_of - 50 * DAY).unwrap();
        tracker.record_referral("m-0", "m-2", as_of - 10 * DAY).unwrap();
        tracker.record_referral("m-0", "m-3", as_of - 40 * DAY).unwrap();

        // m-2 owns an active thrift; m-1 and m-3 own none
        let ledger = Ledger::new(store, ThriftConfig::default());
        ledger
            .open_thrift("m-2", Some(1000), Some(4), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
            .unwrap();

        let counts = tracker.counts_for("m-0", as_of, 40).unwrap();
        assert_eq!(counts.total_referrals, 3);
        // Exactly 40 days old still counts (joined_at >= as_of - window)
        assert_eq!(counts.referrals_within_window, 2);
        assert_eq!(counts.active_referrals, 1);
    }

    #[test]
    fn test_defaulted_referral_not_active() {
        let (store, tracker) = fixture(1);
        tracker.record_referral("m-0", "m-1", 0).unwrap();

        let ledger = Ledger::new(store, ThriftConfig::default());
        let t = ledger
            .open_thrift("m-1", Some(1000), Some(4), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
            .unwrap();
        ledger.record_default(&t.id, &[0], 1).unwrap();

        let counts = tracker.counts_for("m-0", DAY, 40).unwrap();
        assert_eq!(counts.active_referrals, 0);
    }
}
