//! # Perplexity Budget
//!
//! Weekly budget accounting, response caching, and complexity-based tier
//! selection for Perplexity API calls made by repository automation.
//!
//! ## Overview
//!
//! Every request (or cache hit) is appended to a JSON ledger bucketed by ISO
//! week. Before a request is made its cost is estimated and gated against the
//! week's spend:
//! - under the warning threshold the request runs on the tier its complexity
//!   band asks for
//! - between warning and hard stop it is downgraded to the cheapest tier
//! - past the hard stop it is refused
//!
//! ## Features
//!
//! - `colors` (default): Enables terminal color output via owo-colors

/// Batch issue analysis under the weekly budget
pub mod analyzer;

/// Threshold gating against weekly spend
pub mod budget;

/// Content-addressed response cache with TTL
pub mod cache;

/// Heuristic complexity bands and model tiers
pub mod classifier;

/// Command-line argument parsing
pub mod cli;

/// TOML configuration with environment overrides
pub mod config;

/// Text, JSON and Markdown rendering
pub mod display;

/// Append-only JSON usage ledger
pub mod ledger;

/// Data models for ledger records and issues
pub mod models;

/// Weekly cost reports and projections
pub mod monitor;

/// Perplexity chat-completions client
pub mod perplexity;

/// Model-specific pricing calculations
pub mod pricing;

/// Utility functions for env parsing, paths, and formatting
pub mod utils;

/// ISO week bucketing
pub mod week;
