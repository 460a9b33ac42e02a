//! # Ledger Module
//!
//! Append-only JSON usage ledger. The whole ledger is a single JSON array of
//! [`UsageRecord`]s; weekly spend is derived by summing records that share an
//! ISO week key.
//!
//! Saves go through a temp file and a rename so a concurrent reader never sees
//! a half-written file, and [`Ledger::append`] re-reads the file first so two
//! sequential runs never drop each other's records.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::UsageRecord;
use crate::week::previous_weeks;

#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    records: Vec<UsageRecord>,
}

/// Per-model totals inside one week
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelUsage {
    pub requests: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub search_queries: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeekSummary {
    pub week: String,
    pub requests: usize,
    pub cached: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub search_queries: u64,
    pub spend: f64,
    pub by_model: BTreeMap<String, ModelUsage>,
}

impl WeekSummary {
    /// Share of requests served from the response cache
    pub fn cache_hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.cached as f64 / self.requests as f64
        }
    }
}

impl Ledger {
    /// Load the ledger at `path`. A missing file is an empty ledger; a
    /// malformed one is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Vec::new(),
            Ok(raw) => serde_json::from_str::<Vec<UsageRecord>>(&raw)
                .with_context(|| format!("parse ledger {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("read ledger {}", path.display()));
            }
        };
        tracing::debug!(path = %path.display(), records = records.len(), "ledger loaded");
        Ok(Ledger { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[UsageRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create ledger dir {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace ledger {}", self.path.display()))?;
        Ok(())
    }

    /// Re-read the file, push the record, and save
    pub fn append(&mut self, record: UsageRecord) -> Result<()> {
        let fresh = Ledger::load(self.path.clone())?;
        self.records = fresh.records;
        tracing::debug!(
            week = %record.week,
            model = %record.model,
            cost = record.estimated_cost,
            cached = record.cached,
            "appending ledger record"
        );
        self.records.push(record);
        self.save()
    }

    /// Billable spend for one ISO week (cache hits excluded)
    pub fn week_spend(&self, week: &str) -> f64 {
        self.records
            .iter()
            .filter(|r| r.week == week)
            .map(UsageRecord::billable_cost)
            .sum()
    }

    pub fn week_summary(&self, week: &str) -> WeekSummary {
        let mut summary = WeekSummary {
            week: week.to_string(),
            ..WeekSummary::default()
        };
        for r in self.records.iter().filter(|r| r.week == week) {
            summary.requests += 1;
            if r.cached {
                summary.cached += 1;
            }
            summary.tokens_in += r.tokens_in;
            summary.tokens_out += r.tokens_out;
            summary.search_queries += r.search_queries;
            summary.spend += r.billable_cost();

            let m = summary.by_model.entry(r.model.clone()).or_default();
            m.requests += 1;
            m.tokens_in += r.tokens_in;
            m.tokens_out += r.tokens_out;
            m.search_queries += r.search_queries;
            m.cost += r.billable_cost();
        }
        summary
    }

    /// Distinct week keys present in the ledger, newest first
    pub fn weeks(&self) -> Vec<String> {
        let mut weeks: Vec<String> = self.records.iter().map(|r| r.week.clone()).collect();
        weeks.sort();
        weeks.dedup();
        weeks.reverse();
        weeks
    }

    /// Drop records outside the last `keep_weeks` ISO weeks. Returns the
    /// number of records removed; the caller decides whether to save.
    pub fn prune(&mut self, keep_weeks: usize, now: DateTime<Utc>) -> usize {
        let keep = previous_weeks(now, keep_weeks.max(1));
        let before = self.records.len();
        self.records.retain(|r| keep.contains(&r.week));
        before - self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(ts: DateTime<Utc>, model: &str, cost: f64, cached: bool) -> UsageRecord {
        UsageRecord {
            tokens_in: 100,
            tokens_out: 50,
            search_queries: 1,
            estimated_cost: cost,
            cached,
            ..UsageRecord::new(ts, model)
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::load(dir.path().join("nope.json")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, "{not json").unwrap();
        assert!(Ledger::load(&path).is_err());
    }

    #[test]
    fn test_append_persists_and_merges() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ledger.json");
        let ts = Utc.with_ymd_and_hms(2025, 2, 11, 9, 0, 0).unwrap();

        let mut a = Ledger::load(&path).unwrap();
        let mut b = Ledger::load(&path).unwrap();
        a.append(record(ts, "sonar", 0.01, false)).unwrap();
        // b was loaded before a's append but must not clobber it
        b.append(record(ts, "sonar-pro", 0.02, false)).unwrap();

        let reloaded = Ledger::load(&path).unwrap();
        assert_eq!(reloaded.records().len(), 2);
        assert!(!dir.path().join("nested").join("ledger.json.tmp").exists());
    }

    #[test]
    fn test_week_spend_excludes_cached_and_other_weeks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let this_week = Utc.with_ymd_and_hms(2025, 2, 11, 9, 0, 0).unwrap();
        let last_week = Utc.with_ymd_and_hms(2025, 2, 4, 9, 0, 0).unwrap();

        let mut ledger = Ledger::load(&path).unwrap();
        ledger.append(record(this_week, "sonar", 0.10, false)).unwrap();
        ledger.append(record(this_week, "sonar", 0.50, true)).unwrap();
        ledger.append(record(this_week, "sonar-pro", 0.25, false)).unwrap();
        ledger.append(record(last_week, "sonar", 1.00, false)).unwrap();

        assert!((ledger.week_spend("2025-W07") - 0.35).abs() < 1e-9);
        assert!((ledger.week_spend("2025-W06") - 1.00).abs() < 1e-9);

        let summary = ledger.week_summary("2025-W07");
        assert_eq!(summary.requests, 3);
        assert_eq!(summary.cached, 1);
        assert_eq!(summary.by_model["sonar"].requests, 2);
        assert!((summary.by_model["sonar-pro"].cost - 0.25).abs() < 1e-9);
        assert!((summary.cache_hit_rate() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(ledger.weeks(), vec!["2025-W07", "2025-W06"]);
    }

    #[test]
    fn test_prune_keeps_recent_weeks() {
        let dir = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 2, 11, 9, 0, 0).unwrap();
        let mut ledger = Ledger::load(dir.path().join("ledger.json")).unwrap();
        for weeks_ago in 0..6 {
            ledger
                .append(record(now - chrono::Duration::weeks(weeks_ago), "sonar", 0.1, false))
                .unwrap();
        }
        let removed = ledger.prune(4, now);
        assert_eq!(removed, 2);
        assert_eq!(ledger.records().len(), 4);
    }
}
