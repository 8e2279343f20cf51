//! Default sweep
//!
//! Scheduled pass over every open thrift: evaluates the weekly cycle and
//! records newly missed weeks as defaults via the ledger. A single thrift's
//! failure is logged and skipped rather than aborting the pass; transient
//! store failures get a small bounded retry first.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::{error, info};

use crate::config::SweepConfig;
use crate::error::{LedgerError, Result};
use crate::ledger::cycle::evaluate_cycle;
use crate::ledger::models::Thrift;
use crate::ledger::Ledger;
use crate::store::Store;

/// Outcome of one full sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub examined: usize,
    pub newly_defaulted: usize,
    pub failed: usize,
}

pub struct Sweep {
    store: Arc<Store>,
    ledger: Arc<Ledger>,
    config: SweepConfig,
}

impl Sweep {
    pub fn new(store: Arc<Store>, ledger: Arc<Ledger>, config: SweepConfig) -> Self {
        Self { store, ledger, config }
    }

    /// Run forever at the configured interval.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let as_of = Utc::now().date_naive();
            let stats = self.run_pass(as_of).await;
            info!(
                examined = stats.examined,
                newly_defaulted = stats.newly_defaulted,
                failed = stats.failed,
                "Sweep pass complete"
            );
        }
    }

    /// One pass over all open thrifts as of the given date.
    pub async fn run_pass(&self, as_of: NaiveDate) -> SweepStats {
        let mut stats = SweepStats::default();

        let thrifts = match self.store.list_open_thrifts() {
            Ok(thrifts) => thrifts,
            Err(e) => {
                error!(error = %e, "Sweep could not list thrifts");
                stats.failed = 1;
                return stats;
            }
        };

        for thrift in thrifts {
            stats.examined += 1;
            match self.sweep_one(&thrift, as_of).await {
                Ok(true) => stats.newly_defaulted += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(thrift_id = %thrift.id, error = %e, "Sweep skipped thrift");
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    /// Evaluate one thrift; returns whether new defaults were recorded.
    async fn sweep_one(&self, thrift: &Thrift, as_of: NaiveDate) -> Result<bool> {
        let outcome = evaluate_cycle(
            thrift.start_date,
            as_of,
            thrift.current_week,
            thrift.planned_weeks,
            &thrift.paid_weeks(),
            &thrift.default_weeks,
        );

        let missed = !outcome.newly_missed_weeks.is_empty();
        if !missed && outcome.new_current_week <= thrift.current_week {
            return Ok(false);
        }

        let mut attempt = 0;
        loop {
            match self.ledger.record_default(
                &thrift.id,
                &outcome.newly_missed_weeks,
                outcome.new_current_week,
            ) {
                Ok(_) => return Ok(missed),
                Err(e) if e.is_transient() && attempt < self.config.retry_attempts => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(
                        self.config.retry_backoff_ms * u64::from(attempt),
                    ))
                    .await;
                }
                // Another writer may have completed or cancelled the thrift
                // since we listed it; that is not a sweep failure.
                Err(LedgerError::InvalidStateTransition { .. }) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
    }
}
