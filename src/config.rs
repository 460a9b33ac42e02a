//! # Config Module
//!
//! TOML configuration with environment overrides.
//!
//! Resolution order (later wins): built-in defaults, config file, environment
//! variables, command-line flags (applied by the binary).
//!
//! ```toml
//! [budget]
//! weekly_budget_usd = 3.0
//! warn_threshold = 0.8
//! hard_stop_threshold = 1.0
//!
//! [paths]
//! ledger = "/var/lib/echotune/perplexity-ledger.json"
//! cache_dir = "/var/lib/echotune/perplexity-cache"
//!
//! [cache]
//! ttl_hours = 168
//!
//! [tiers.complex]
//! model = "sonar-reasoning"
//! max_tokens = 1500
//! search_queries = 3
//!
//! [pricing.sonar-pro]
//! input_per_million = 3.0
//! output_per_million = 15.0
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::CACHE_TTL_HOURS;
use crate::classifier::TierTable;
use crate::pricing::{Pricing, SEARCH_QUERY_PRICE, pricing_for_model};
use crate::utils::{
    default_config_dir, default_data_dir, non_empty_env, parse_bool_env, parse_f64_env, parse_u64_env,
};

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
/// Five years
pub const MAX_CACHE_TTL_HOURS: i64 = 5 * 365 * 24;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub weekly_budget_usd: f64,
    /// Fraction of the budget at which requests are downgraded to the simple tier
    pub warn_threshold: f64,
    /// Fraction of the budget past which requests are refused
    pub hard_stop_threshold: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        BudgetConfig {
            weekly_budget_usd: 3.0,
            warn_threshold: 0.8,
            hard_stop_threshold: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub ledger: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_hours: i64,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_hours: CACHE_TTL_HOURS,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub temperature: f64,
    pub system_prompt: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            temperature: 0.2,
            system_prompt: "You are a senior engineer triaging GitHub issues for a music \
                            recommendation service. Summarize the problem, likely root cause, \
                            and a concrete next step. Be concise."
                .to_string(),
        }
    }
}

/// Per-model price override, expressed the way providers publish prices
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceOverride {
    pub input_per_million: f64,
    pub output_per_million: f64,
    #[serde(default)]
    pub search_per_thousand: Option<f64>,
    #[serde(default)]
    pub request_fee: f64,
}

impl From<&PriceOverride> for Pricing {
    fn from(p: &PriceOverride) -> Self {
        Pricing {
            in_per_tok: p.input_per_million / 1e6,
            out_per_tok: p.output_per_million / 1e6,
            per_search: p
                .search_per_thousand
                .map(|v| v / 1e3)
                .unwrap_or(SEARCH_QUERY_PRICE),
            per_request: p.request_fee,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub budget: BudgetConfig,
    pub paths: PathsConfig,
    pub cache: CacheConfig,
    pub api: ApiConfig,
    pub tiers: TierTable,
    pub pricing: HashMap<String, PriceOverride>,
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE_NAME)
}

impl Config {
    /// Load from `path`, or from the default location when `None`. An
    /// explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_path(), false),
        };
        let mut config = match fs::read_to_string(&path) {
            Ok(raw) => Self::from_toml(&raw)
                .with_context(|| format!("parse config {}", path.display()))?,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Config::default()
            }
            Err(e) => return Err(e).with_context(|| format!("read config {}", path.display())),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// `PPLX_WEEKLY_BUDGET`, `PPLX_LEDGER_PATH`, `PPLX_CACHE_DIR`, `PPLX_CACHE_TTL_HOURS`,
    /// `PPLX_CACHE_DISABLED`, `PPLX_API_BASE_URL`
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = parse_f64_env("PPLX_WEEKLY_BUDGET") {
            self.budget.weekly_budget_usd = v;
        }
        if let Some(v) = non_empty_env("PPLX_LEDGER_PATH") {
            self.paths.ledger = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty_env("PPLX_CACHE_DIR") {
            self.paths.cache_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = parse_u64_env("PPLX_CACHE_TTL_HOURS") {
            match i64::try_from(v) {
                Ok(hours) => self.cache.ttl_hours = hours,
                Err(_) => tracing::warn!(value = v, "ignoring out-of-range PPLX_CACHE_TTL_HOURS"),
            }
        }
        if parse_bool_env("PPLX_CACHE_DISABLED") {
            self.cache.enabled = false;
        }
        if let Some(v) = non_empty_env("PPLX_API_BASE_URL") {
            self.api.base_url = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let b = &self.budget;
        if !(b.weekly_budget_usd.is_finite() && b.weekly_budget_usd >= 0.0) {
            anyhow::bail!("weekly_budget_usd must be a non-negative number");
        }
        if !(0.0..=b.hard_stop_threshold).contains(&b.warn_threshold) {
            anyhow::bail!(
                "warn_threshold ({}) must be between 0 and hard_stop_threshold ({})",
                b.warn_threshold,
                b.hard_stop_threshold
            );
        }
        if !(0..=MAX_CACHE_TTL_HOURS).contains(&self.cache.ttl_hours) {
            anyhow::bail!(
                "cache.ttl_hours ({}) must be between 0 and {MAX_CACHE_TTL_HOURS}",
                self.cache.ttl_hours
            );
        }
        Ok(())
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.paths
            .ledger
            .clone()
            .unwrap_or_else(|| default_data_dir().join("usage-ledger.json"))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.paths
            .cache_dir
            .clone()
            .unwrap_or_else(|| default_data_dir().join("cache"))
    }

    /// Config override first, then the built-in table
    pub fn pricing_for(&self, model: &str) -> Option<Pricing> {
        self.pricing
            .get(model)
            .map(Pricing::from)
            .or_else(|| pricing_for_model(model))
    }
}
