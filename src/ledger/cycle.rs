//! Weekly cycle calculator
//!
//! Pure date arithmetic for a thrift's weekly cadence. Callers (the sweep
//! job) persist results via the ledger; nothing here touches the store.

use chrono::NaiveDate;

/// Result of evaluating one thrift's cycle at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Monotone advance of the week pointer; never decreases
    pub new_current_week: u32,
    /// Due weeks with no qualifying contribution and no prior default record,
    /// ascending
    pub newly_missed_weeks: Vec<u32>,
}

/// Number of weeks of the cycle that are due at `as_of`.
///
/// Week `i` (0-indexed) is due once `as_of >= start_date + 7 * (i + 1)` days,
/// so the due count is `floor(days_elapsed / 7)`, clamped at zero and at the
/// planned cycle length.
pub fn due_weeks(start_date: NaiveDate, as_of: NaiveDate, planned_weeks: u32) -> u32 {
    let days = (as_of - start_date).num_days();
    if days <= 0 {
        return 0;
    }
    let due = (days / 7) as u32;
    due.min(planned_weeks)
}

/// Evaluate a thrift's cycle position.
///
/// Idempotent for a fixed `as_of`: repeated calls yield the same outcome, and
/// the returned week pointer never moves backwards.
pub fn evaluate_cycle(
    start_date: NaiveDate,
    as_of: NaiveDate,
    current_week: u32,
    planned_weeks: u32,
    paid_weeks: &[u32],
    recorded_defaults: &[u32],
) -> CycleOutcome {
    let due = due_weeks(start_date, as_of, planned_weeks);

    let newly_missed_weeks = (0..due)
        .filter(|w| !paid_weeks.contains(w) && !recorded_defaults.contains(w))
        .collect();

    CycleOutcome {
        new_current_week: current_week.max(due),
        newly_missed_weeks,
    }
}

/// Calendar weeks fully elapsed since the cycle started (0 before day 7).
pub fn elapsed_weeks(start_date: NaiveDate, as_of: NaiveDate) -> u32 {
    due_weeks(start_date, as_of, u32::MAX)
}
