use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::ComplexityBand;
use crate::week::iso_week_key;

/// One API request (or cache hit) in the budget ledger
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    /// ISO week key, e.g. `2025-W07`
    pub week: String,
    pub model: String,
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub search_queries: u64,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<ComplexityBand>,
    /// Issue number or free-form label of what the request was for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

impl UsageRecord {
    pub fn new(timestamp: DateTime<Utc>, model: impl Into<String>) -> Self {
        UsageRecord {
            timestamp,
            week: iso_week_key(timestamp),
            model: model.into(),
            tokens_in: 0,
            tokens_out: 0,
            search_queries: 0,
            estimated_cost: 0.0,
            cached: false,
            complexity: None,
            issue: None,
        }
    }

    /// Cost that counts against the weekly budget; cache hits are free
    pub fn billable_cost(&self) -> f64 {
        if self.cached { 0.0 } else { self.estimated_cost }
    }
}
