//! # Monitor Module
//!
//! Weekly cost report built from the ledger: current-week budget status,
//! end-of-week projection, cache hit rate, and a per-week history.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::budget::{BudgetGuard, BudgetLevel, BudgetStatus};
use crate::config::BudgetConfig;
use crate::ledger::{Ledger, WeekSummary};
use crate::week::{previous_weeks, week_elapsed_fraction};

#[derive(Debug, Clone, Serialize)]
pub struct CostReport {
    pub generated_at: DateTime<Utc>,
    pub status: BudgetStatus,
    /// Linear projection of this week's spend to Sunday 24:00 UTC
    pub projected_spend: f64,
    pub projected_level: BudgetLevel,
    pub week_elapsed: f64,
    pub cache_hit_rate: f64,
    /// Newest first; weeks with no records are included with zeros
    pub weeks: Vec<WeekSummary>,
}

pub fn build_report(
    ledger: &Ledger,
    config: &BudgetConfig,
    weeks: usize,
    now: DateTime<Utc>,
) -> CostReport {
    let guard = BudgetGuard::new(config, ledger);
    let status = guard.status(now);
    let elapsed = week_elapsed_fraction(now);
    let projected_spend = status.spent / elapsed;

    let projected_level = if projected_spend >= config.weekly_budget_usd * config.hard_stop_threshold {
        BudgetLevel::Exceeded
    } else if projected_spend >= config.weekly_budget_usd * config.warn_threshold {
        BudgetLevel::Warning
    } else {
        BudgetLevel::Ok
    };

    let summaries: Vec<WeekSummary> = previous_weeks(now, weeks.max(1))
        .iter()
        .map(|w| ledger.week_summary(w))
        .collect();

    let (requests, cached) = summaries
        .iter()
        .fold((0usize, 0usize), |(r, c), s| (r + s.requests, c + s.cached));
    let cache_hit_rate = if requests == 0 {
        0.0
    } else {
        cached as f64 / requests as f64
    };

    if projected_level != BudgetLevel::Ok {
        tracing::warn!(
            week = %status.week,
            spent = status.spent,
            projected = projected_spend,
            "projected weekly spend above warning threshold"
        );
    }

    CostReport {
        generated_at: now,
        status,
        projected_spend,
        projected_level,
        week_elapsed: elapsed,
        cache_hit_rate,
        weeks: summaries,
    }
}
