//! Eligibility recomputation against real store state: referral thresholds
//! plus thrift payment health, combined.

use std::sync::Arc;

use chrono::NaiveDate;

use thriftd::config::{EligibilityConfig, ThriftConfig};
use thriftd::eligibility::EligibilityEngine;
use thriftd::ledger::models::Member;
use thriftd::ledger::Ledger;
use thriftd::referrals::ReferralTracker;
use thriftd::store::Store;

const DAY: i64 = 86_400;

fn member(id: &str) -> Member {
    Member {
        id: id.to_string(),
        name: id.to_string(),
        referral_code: format!("code-{id}"),
        referred_by: Some("m-0".to_string()),
        created_at: 0,
    }
}

struct Fixture {
    ledger: Arc<Ledger>,
    tracker: Arc<ReferralTracker>,
    engine: EligibilityEngine,
}

fn fixture() -> Fixture {
    let store = Arc::new(Store::open_in_memory().unwrap());
    store
        .insert_member(&Member {
            id: "m-0".into(),
            name: "Ada".into(),
            referral_code: "ada-0".into(),
            referred_by: None,
            created_at: 0,
        })
        .unwrap();
    for i in 1..=6 {
        store.insert_member(&member(&format!("m-{i}"))).unwrap();
    }

    let ledger = Arc::new(Ledger::new(store.clone(), ThriftConfig::default()));
    let tracker = Arc::new(ReferralTracker::new(store.clone()));
    let engine = EligibilityEngine::new(store, tracker.clone(), EligibilityConfig::default());
    Fixture { ledger, tracker, engine }
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

/// Give m-0 exactly 5 referrals, 3 recent, 2 active, and a fully paid
/// thrift: overall eligibility holds at the boundary.
#[test]
fn test_boundary_member_is_eligible() {
    let f = fixture();
    let as_of = 100 * DAY;

    // 5 total: two old, three within the 40-day window
    f.tracker.record_referral("m-0", "m-1", as_of - 60 * DAY).unwrap();
    f.tracker.record_referral("m-0", "m-2", as_of - 50 * DAY).unwrap();
    f.tracker.record_referral("m-0", "m-3", as_of - 30 * DAY).unwrap();
    f.tracker.record_referral("m-0", "m-4", as_of - 20 * DAY).unwrap();
    f.tracker.record_referral("m-0", "m-5", as_of - 10 * DAY).unwrap();

    // 2 active referrals
    f.ledger.open_thrift("m-1", Some(1000), Some(4), start()).unwrap();
    f.ledger.open_thrift("m-2", Some(1000), Some(4), start()).unwrap();

    // m-0's own thrift, paid in full
    let own = f.ledger.open_thrift("m-0", Some(1000), Some(4), start()).unwrap();
    f.ledger
        .apply_contribution_at(&own.id, 4000, "pay-all", start())
        .unwrap();

    let report = f.engine.eligibility_for("m-0", as_of).unwrap();
    assert!(report.bonus_eligible);
    assert!(report.thrift_eligible);
    assert!(report.overall_eligible);
    assert_eq!(report.counts.total_referrals, 5);
    assert_eq!(report.counts.referrals_within_window, 3);
    assert_eq!(report.counts.active_referrals, 2);
}

/// Bonus without payment health (or vice versa) is not enough.
#[test]
fn test_both_facts_required() {
    let f = fixture();
    let as_of = 100 * DAY;

    for i in 1..=5 {
        f.tracker
            .record_referral("m-0", &format!("m-{i}"), as_of - 5 * DAY)
            .unwrap();
        f.ledger
            .open_thrift(&format!("m-{i}"), Some(1000), Some(4), start())
            .unwrap();
    }

    // Bonus thresholds met, but m-0's thrift is short of target
    let own = f.ledger.open_thrift("m-0", Some(1000), Some(4), start()).unwrap();
    f.ledger
        .apply_contribution_at(&own.id, 1000, "pay-1", start())
        .unwrap();

    let report = f.engine.eligibility_for("m-0", as_of).unwrap();
    assert!(report.bonus_eligible);
    assert!(!report.thrift_eligible);
    assert!(!report.overall_eligible);
}

/// A recorded default gates eligibility even once the target is reached
/// later, and each query recomputes from store state.
#[test]
fn test_default_gates_paid_thrift() {
    let f = fixture();
    let as_of = 100 * DAY;

    for i in 1..=5 {
        f.tracker
            .record_referral("m-0", &format!("m-{i}"), as_of - 5 * DAY)
            .unwrap();
        f.ledger
            .open_thrift(&format!("m-{i}"), Some(1000), Some(4), start())
            .unwrap();
    }
    let own = f.ledger.open_thrift("m-0", Some(1000), Some(4), start()).unwrap();
    f.ledger
        .apply_contribution_at(&own.id, 1000, "pay-1", start())
        .unwrap();
    f.ledger.record_default(&own.id, &[1], 2).unwrap();

    assert!(!f.engine.eligibility_for("m-0", as_of).unwrap().overall_eligible);

    // Catching up to the target does not clear the default
    f.ledger
        .apply_contribution_at(&own.id, 3000, "pay-2", start() + chrono::Days::new(14))
        .unwrap();
    let t = f.ledger.get_thrift(&own.id).unwrap();
    assert!(t.is_paid());

    let report = f.engine.eligibility_for("m-0", as_of).unwrap();
    assert!(report.bonus_eligible);
    assert!(!report.thrift_eligible);
    assert!(!report.overall_eligible);
}

#[test]
fn test_member_with_no_referrals_or_thrift() {
    let f = fixture();
    let report = f.engine.eligibility_for("m-6", DAY).unwrap();
    assert!(!report.bonus_eligible);
    assert!(!report.thrift_eligible);
    assert!(!report.overall_eligible);
}
