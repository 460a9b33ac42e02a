//! # Pricing Module
//!
//! Provides model-specific pricing information for Perplexity cost estimates.
//!
//! ## Pricing Structure
//!
//! Each model has pricing for:
//! - Input (prompt) tokens
//! - Output (completion) tokens
//! - Search queries issued by the model (typically $5 / 1000)
//! - An optional flat fee per request
//!
//! Prices can be overridden via environment variables when all three are set:
//! - `PPLX_PRICE_INPUT`
//! - `PPLX_PRICE_OUTPUT`
//! - `PPLX_PRICE_SEARCH`
//!
//! Per-model overrides from the config file take precedence over both.

use serde::{Deserialize, Serialize};
use std::env;

/// Price of a single search query: $5 / 1000
pub const SEARCH_QUERY_PRICE: f64 = 5e-3;

/// Average characters per token used for prompt size estimates
const CHARS_PER_TOKEN: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub in_per_tok: f64,
    pub out_per_tok: f64,
    #[serde(default = "default_search_price")]
    pub per_search: f64,
    #[serde(default)]
    pub per_request: f64,
}

fn default_search_price() -> f64 {
    SEARCH_QUERY_PRICE
}

impl Pricing {
    const fn per_million(input: f64, output: f64) -> Self {
        Pricing {
            in_per_tok: input / 1e6,
            out_per_tok: output / 1e6,
            per_search: SEARCH_QUERY_PRICE,
            per_request: 0.0,
        }
    }
}

pub(crate) fn static_pricing_lookup(model_id: &str) -> Option<Pricing> {
    // Longest names first so "sonar-reasoning-pro" never matches "sonar-pro"
    let m = model_id.to_lowercase();
    if m.contains("sonar-deep-research") {
        return Some(Pricing::per_million(2.0, 8.0));
    }
    if m.contains("sonar-reasoning-pro") {
        return Some(Pricing::per_million(2.0, 8.0));
    }
    if m.contains("sonar-reasoning") {
        return Some(Pricing::per_million(1.0, 5.0));
    }
    if m.contains("sonar-pro") {
        return Some(Pricing::per_million(3.0, 15.0));
    }
    if m == "sonar" || m.ends_with("/sonar") {
        return Some(Pricing::per_million(1.0, 1.0));
    }
    None
}

fn env_pricing() -> Option<Pricing> {
    if let (Ok(gi), Ok(go), Ok(gs)) = (
        env::var("PPLX_PRICE_INPUT").map(|s| s.trim().parse::<f64>()),
        env::var("PPLX_PRICE_OUTPUT").map(|s| s.trim().parse::<f64>()),
        env::var("PPLX_PRICE_SEARCH").map(|s| s.trim().parse::<f64>()),
    ) && let (Ok(ii), Ok(oo), Ok(ss)) = (gi, go, gs)
    {
        return Some(Pricing {
            in_per_tok: ii,
            out_per_tok: oo,
            per_search: ss,
            per_request: 0.0,
        });
    }
    None
}

pub fn pricing_for_model(model_id: &str) -> Option<Pricing> {
    if let Some(p) = env_pricing() {
        return Some(p);
    }

    // Prefer explicit known model variants
    if let Some(p) = static_pricing_lookup(model_id) {
        return Some(p);
    }
    // Family heuristics
    let m = model_id.to_lowercase();
    if m.contains("research") {
        Some(Pricing::per_million(2.0, 8.0))
    } else if m.contains("reasoning") {
        Some(Pricing::per_million(1.0, 5.0))
    } else if m.contains("sonar") {
        Some(Pricing::per_million(1.0, 1.0))
    } else {
        None
    }
}

/// Cost in USD: input + output + search terms, plus the flat request fee
pub fn estimate_cost(pricing: &Pricing, tokens_in: u64, tokens_out: u64, searches: u64) -> f64 {
    (tokens_in as f64) * pricing.in_per_tok
        + (tokens_out as f64) * pricing.out_per_tok
        + (searches as f64) * pricing.per_search
        + pricing.per_request
}

/// Rough token count for a prompt (~4 chars per token, rounded up)
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count();
    chars.div_ceil(CHARS_PER_TOKEN) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_pricing_for_known_models() {
        let sonar = pricing_for_model("sonar").unwrap();
        assert!((sonar.in_per_tok - 1e-6).abs() < 1e-12);
        assert!((sonar.out_per_tok - 1e-6).abs() < 1e-12);
        assert!((sonar.per_search - 0.005).abs() < 1e-12);

        let pro = pricing_for_model("sonar-pro").unwrap();
        assert!((pro.in_per_tok - 3e-6).abs() < 1e-12);
        assert!((pro.out_per_tok - 15e-6).abs() < 1e-12);

        let reasoning_pro = pricing_for_model("sonar-reasoning-pro").unwrap();
        assert!((reasoning_pro.in_per_tok - 2e-6).abs() < 1e-12);
        assert!((reasoning_pro.out_per_tok - 8e-6).abs() < 1e-12);

        let reasoning = pricing_for_model("Sonar-Reasoning").unwrap();
        assert!((reasoning.out_per_tok - 5e-6).abs() < 1e-12);
    }

    #[test]
    #[serial]
    fn test_pricing_family_fallback() {
        let fallback = pricing_for_model("sonar-small-online").unwrap();
        assert_eq!(fallback.in_per_tok, 1e-6);
        let research = pricing_for_model("future-research-model").unwrap();
        assert_eq!(research.out_per_tok, 8e-6);
    }

    #[test]
    #[serial]
    fn test_unknown_model() {
        assert!(pricing_for_model("gpt-4o").is_none());
    }

    #[test]
    fn test_estimate_is_sum_of_terms() {
        let p = Pricing::per_million(3.0, 15.0);
        let cost = estimate_cost(&p, 1_000, 2_000, 2);
        let expected = 1_000.0 * 3e-6 + 2_000.0 * 15e-6 + 2.0 * 0.005;
        assert!((cost - expected).abs() < 1e-12);

        let with_fee = Pricing {
            per_request: 0.006,
            ..p
        };
        assert!((estimate_cost(&with_fee, 0, 0, 0) - 0.006).abs() < 1e-12);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    #[serial]
    fn test_env_override_needs_all_three() {
        // SAFETY: Test runs serially, no concurrent env access
        unsafe {
            env::set_var("PPLX_PRICE_INPUT", "0.000004");
            env::set_var("PPLX_PRICE_OUTPUT", "0.00002");
        }
        let partial = pricing_for_model("sonar").unwrap();
        unsafe { env::set_var("PPLX_PRICE_SEARCH", "0.008") };
        let full = pricing_for_model("gpt-4o");
        unsafe {
            env::remove_var("PPLX_PRICE_INPUT");
            env::remove_var("PPLX_PRICE_OUTPUT");
            env::remove_var("PPLX_PRICE_SEARCH");
        }

        assert!((partial.in_per_tok - 1e-6).abs() < 1e-12);
        let full = full.unwrap();
        assert!((full.in_per_tok - 4e-6).abs() < 1e-12);
        assert!((full.out_per_tok - 2e-5).abs() < 1e-12);
        assert!((full.per_search - 0.008).abs() < 1e-12);
    }
}
