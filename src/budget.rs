//! # Budget Module
//!
//! Weekly budget gating. Spend for the current ISO week is summed from the
//! ledger and compared against two fractions of the weekly budget:
//!
//! - below `warn_threshold`: requests go through on their chosen tier
//! - between warn and hard stop: requests are downgraded to the simple tier
//! - past `hard_stop_threshold`: requests are refused

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::config::BudgetConfig;
use crate::ledger::Ledger;
use crate::week::iso_week_key;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BudgetError {
    #[error(
        "weekly budget exceeded for {week}: spent ${spent:.4} + estimate ${estimate:.4} > limit ${limit:.2}"
    )]
    Exceeded {
        week: String,
        spent: f64,
        estimate: f64,
        limit: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetLevel {
    Ok,
    Warning,
    Exceeded,
}

impl fmt::Display for BudgetLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BudgetLevel::Ok => "ok",
            BudgetLevel::Warning => "warning",
            BudgetLevel::Exceeded => "exceeded",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    pub week: String,
    pub spent: f64,
    pub budget: f64,
    pub remaining: f64,
    pub percent_used: f64,
    pub level: BudgetLevel,
}

/// Outcome of gating one prospective request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    /// Allowed only on the simple tier
    Downgrade,
    Deny,
}

impl Decision {
    /// Exit status for `budget check`: 2 when denied, 1 when downgraded
    /// under `strict`, 0 otherwise
    pub fn exit_code(self, strict: bool) -> u8 {
        match self {
            Decision::Deny => 2,
            Decision::Downgrade if strict => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Allow => "allow",
            Decision::Downgrade => "downgrade",
            Decision::Deny => "deny",
        })
    }
}

pub struct BudgetGuard<'a> {
    config: &'a BudgetConfig,
    ledger: &'a Ledger,
}

impl<'a> BudgetGuard<'a> {
    pub fn new(config: &'a BudgetConfig, ledger: &'a Ledger) -> Self {
        BudgetGuard { config, ledger }
    }

    fn warn_limit(&self) -> f64 {
        self.config.weekly_budget_usd * self.config.warn_threshold
    }

    fn hard_limit(&self) -> f64 {
        self.config.weekly_budget_usd * self.config.hard_stop_threshold
    }

    fn level_for(&self, spent: f64) -> BudgetLevel {
        if spent >= self.hard_limit() {
            BudgetLevel::Exceeded
        } else if spent >= self.warn_limit() {
            BudgetLevel::Warning
        } else {
            BudgetLevel::Ok
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> BudgetStatus {
        let week = iso_week_key(now);
        let spent = self.ledger.week_spend(&week);
        let budget = self.config.weekly_budget_usd;
        let percent_used = if budget > 0.0 {
            spent / budget * 100.0
        } else if spent > 0.0 {
            100.0
        } else {
            0.0
        };
        BudgetStatus {
            level: self.level_for(spent),
            remaining: (budget - spent).max(0.0),
            percent_used,
            week,
            spent,
            budget,
        }
    }

    /// Gate a request whose estimated cost is `estimate`
    pub fn check(&self, estimate: f64, now: DateTime<Utc>) -> Decision {
        let week = iso_week_key(now);
        let spent = self.ledger.week_spend(&week);
        let projected = spent + estimate.max(0.0);
        // A fully spent week refuses even zero-cost estimates
        let decision = if projected > self.hard_limit() || spent >= self.hard_limit() {
            Decision::Deny
        } else if projected >= self.warn_limit() {
            Decision::Downgrade
        } else {
            Decision::Allow
        };
        match decision {
            Decision::Deny => tracing::warn!(
                week = %week,
                spent,
                estimate,
                limit = self.hard_limit(),
                "budget exceeded, request denied"
            ),
            Decision::Downgrade => tracing::info!(
                week = %week,
                spent,
                estimate,
                warn_limit = self.warn_limit(),
                "budget warning threshold reached, downgrading tier"
            ),
            Decision::Allow => {}
        }
        decision
    }

    /// Same as [`check`](Self::check) but denial is an error
    pub fn ensure(&self, estimate: f64, now: DateTime<Utc>) -> Result<Decision, BudgetError> {
        match self.check(estimate, now) {
            Decision::Deny => {
                let week = iso_week_key(now);
                Err(BudgetError::Exceeded {
                    spent: self.ledger.week_spend(&week),
                    week,
                    estimate,
                    limit: self.hard_limit(),
                })
            }
            d => Ok(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UsageRecord;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn ledger_with_spend(dir: &TempDir, now: DateTime<Utc>, spend: f64) -> Ledger {
        let mut ledger = Ledger::load(dir.path().join("ledger.json")).unwrap();
        if spend > 0.0 {
            ledger
                .append(UsageRecord {
                    estimated_cost: spend,
                    ..UsageRecord::new(now, "sonar-pro")
                })
                .unwrap();
        }
        ledger
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 12, 15, 0, 0).unwrap()
    }

    #[test]
    fn test_decisions_across_thresholds() {
        let dir = TempDir::new().unwrap();
        let config = BudgetConfig::default();
        let ledger = ledger_with_spend(&dir, now(), 2.0);
        let guard = BudgetGuard::new(&config, &ledger);

        assert_eq!(guard.check(0.10, now()), Decision::Allow);
        assert_eq!(guard.check(0.50, now()), Decision::Downgrade);
        assert_eq!(guard.check(1.00, now()), Decision::Downgrade);
        assert_eq!(guard.check(1.01, now()), Decision::Deny);
    }

    #[test]
    fn test_status_levels() {
        let dir = TempDir::new().unwrap();
        let config = BudgetConfig::default();
        let ledger = ledger_with_spend(&dir, now(), 2.7);
        let status = BudgetGuard::new(&config, &ledger).status(now());
        assert_eq!(status.week, "2025-W07");
        assert_eq!(status.level, BudgetLevel::Warning);
        assert!((status.remaining - 0.3).abs() < 1e-9);
        assert!((status.percent_used - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_new_week_resets_spend() {
        let dir = TempDir::new().unwrap();
        let config = BudgetConfig::default();
        let ledger = ledger_with_spend(&dir, now(), 3.5);
        let guard = BudgetGuard::new(&config, &ledger);
        assert_eq!(guard.status(now()).level, BudgetLevel::Exceeded);

        let next_monday = Utc.with_ymd_and_hms(2025, 2, 17, 0, 0, 1).unwrap();
        assert_eq!(guard.status(next_monday).level, BudgetLevel::Ok);
        assert_eq!(guard.check(0.5, next_monday), Decision::Allow);
    }

    #[test]
    fn test_ensure_reports_error() {
        let dir = TempDir::new().unwrap();
        let config = BudgetConfig {
            weekly_budget_usd: 1.0,
            ..BudgetConfig::default()
        };
        let ledger = ledger_with_spend(&dir, now(), 0.95);
        let err = BudgetGuard::new(&config, &ledger)
            .ensure(0.10, now())
            .unwrap_err();
        let BudgetError::Exceeded { week, spent, .. } = &err;
        assert_eq!(week, "2025-W07");
        assert!((spent - 0.95).abs() < 1e-9);
        assert!(err.to_string().contains("weekly budget exceeded"));
    }

    #[test]
    fn test_fully_spent_week_denies() {
        let dir = TempDir::new().unwrap();
        let config = BudgetConfig::default();
        let ledger = ledger_with_spend(&dir, now(), 3.0);
        let guard = BudgetGuard::new(&config, &ledger);

        assert_eq!(guard.status(now()).level, BudgetLevel::Exceeded);
        assert_eq!(guard.check(0.0, now()), Decision::Deny);
        assert!(guard.ensure(0.0, now()).is_err());
        assert_eq!(guard.check(0.0, now()).exit_code(false), 2);
    }

    #[test]
    fn test_just_under_limit_still_downgrades() {
        let dir = TempDir::new().unwrap();
        let config = BudgetConfig::default();
        let ledger = ledger_with_spend(&dir, now(), 2.99);
        let guard = BudgetGuard::new(&config, &ledger);

        assert_eq!(guard.status(now()).level, BudgetLevel::Warning);
        let decision = guard.check(0.0, now());
        assert_eq!(decision, Decision::Downgrade);
        assert_eq!(decision.exit_code(false), 0);
        assert_eq!(decision.exit_code(true), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Decision::Deny.exit_code(false), 2);
        assert_eq!(Decision::Deny.exit_code(true), 2);
        assert_eq!(Decision::Downgrade.exit_code(true), 1);
        assert_eq!(Decision::Downgrade.exit_code(false), 0);
        assert_eq!(Decision::Allow.exit_code(true), 0);
        assert_eq!(Decision::Downgrade.to_string(), "downgrade");
    }
}
