//! # Analyzer Module
//!
//! Batch issue analysis under the weekly budget. For each issue:
//!
//! 1. classify the text and pick the band's tier
//! 2. serve from the response cache when possible (free, still logged)
//! 3. estimate the cost and gate it through [`BudgetGuard`]
//! 4. call the backend, log actual usage in the ledger, cache the answer
//!
//! A denied request stops the batch; the remaining issues are reported as
//! skipped. Backend failures only fail their own issue.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::budget::{BudgetGuard, BudgetStatus, Decision};
use crate::cache::{CachedUsage, ResponseCache};
use crate::classifier::{ComplexityBand, Tier, classify};
use crate::config::Config;
use crate::ledger::Ledger;
use crate::models::{Issue, UsageRecord};
use crate::perplexity::{ChatMessage, ChatRequest, CompletionBackend, WebSearchOptions};
use crate::pricing::{estimate_cost, estimate_tokens};
use crate::week::iso_week_key;

/// Issue bodies are cut to this many characters before prompting
const MAX_BODY_CHARS: usize = 6_000;

#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub dry_run: bool,
    pub max_issues: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Analyzed,
    Cached,
    Estimated,
    Skipped,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueResult {
    pub number: u64,
    pub title: String,
    pub status: IssueStatus,
    pub band: ComplexityBand,
    pub score: i32,
    pub model: String,
    pub downgraded: bool,
    pub estimated_cost: f64,
    pub actual_cost: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub search_queries: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub week: String,
    pub generated_at: DateTime<Utc>,
    pub dry_run: bool,
    pub total_cost: f64,
    pub estimated_cost: f64,
    pub analyzed: usize,
    pub cached: usize,
    pub estimated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub budget_after: BudgetStatus,
    pub results: Vec<IssueResult>,
}

pub fn load_issues(path: &Path) -> Result<Vec<Issue>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read issues {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse issues {}", path.display()))
}

pub fn build_prompt(issue: &Issue) -> String {
    let mut prompt = format!("Analyze GitHub issue #{}: {}\n", issue.number, issue.title);
    if !issue.labels.is_empty() {
        prompt.push_str(&format!("Labels: {}\n", issue.labels.join(", ")));
    }
    if let Some(body) = issue.body.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        prompt.push('\n');
        if body.chars().count() > MAX_BODY_CHARS {
            prompt.extend(body.chars().take(MAX_BODY_CHARS));
            prompt.push_str("\n[truncated]");
        } else {
            prompt.push_str(body);
        }
    }
    prompt
}

pub struct IssueAnalyzer<'a> {
    config: &'a Config,
    ledger: &'a mut Ledger,
    cache: Option<&'a ResponseCache>,
    backend: Option<&'a dyn CompletionBackend>,
}

/// Planned request for one issue after tier selection
struct Plan {
    tier: Tier,
    band: ComplexityBand,
    prompt_tokens: u64,
    estimate: f64,
}

impl<'a> IssueAnalyzer<'a> {
    pub fn new(
        config: &'a Config,
        ledger: &'a mut Ledger,
        cache: Option<&'a ResponseCache>,
        backend: Option<&'a dyn CompletionBackend>,
    ) -> Self {
        IssueAnalyzer {
            config,
            ledger,
            cache,
            backend,
        }
    }

    fn plan(&self, band: ComplexityBand, prompt: &str) -> Result<Plan> {
        let tier = self.config.tiers.for_band(band).clone();
        let pricing = self
            .config
            .pricing_for(&tier.model)
            .with_context(|| format!("no pricing known for model {}", tier.model))?;
        let prompt_tokens =
            estimate_tokens(&self.config.api.system_prompt) + estimate_tokens(prompt);
        let estimate = estimate_cost(&pricing, prompt_tokens, tier.max_tokens, tier.search_queries);
        Ok(Plan {
            tier,
            band,
            prompt_tokens,
            estimate,
        })
    }

    fn cached(&self, model: &str, text: &str, now: DateTime<Utc>) -> Option<crate::cache::CacheEntry> {
        if !self.config.cache.enabled {
            return None;
        }
        self.cache?.get(model, text, now)
    }

    pub fn run(
        &mut self,
        issues: &[Issue],
        opts: &AnalyzeOptions,
        now: DateTime<Utc>,
    ) -> Result<BatchReport> {
        if !opts.dry_run && self.backend.is_none() {
            anyhow::bail!("no completion backend configured (use --dry-run to estimate only)");
        }
        let limit = opts.max_issues.unwrap_or(issues.len()).min(issues.len());
        let mut results = Vec::with_capacity(limit);
        let mut stopped = false;
        // Dry runs never write the ledger, so earlier estimates are carried here
        let mut pending = 0.0;

        for issue in &issues[..limit] {
            let text = issue.text();
            let class = classify(&text, &issue.labels);
            let preferred = self.config.tiers.for_band(class.band).clone();
            let mut result = IssueResult {
                number: issue.number,
                title: issue.title.clone(),
                status: IssueStatus::Skipped,
                band: class.band,
                score: class.score,
                model: preferred.model.clone(),
                downgraded: false,
                estimated_cost: 0.0,
                actual_cost: 0.0,
                tokens_in: 0,
                tokens_out: 0,
                search_queries: 0,
                analysis: None,
                citations: Vec::new(),
                error: None,
            };

            if stopped {
                result.error = Some("weekly budget exhausted".to_string());
                results.push(result);
                continue;
            }

            if let Some(hit) = self.cached(&preferred.model, &text, now) {
                self.record_cache_hit(&mut result, class.band, hit, opts, now)?;
                results.push(result);
                continue;
            }

            let prompt = build_prompt(issue);
            let mut plan = match self.plan(class.band, &prompt) {
                Ok(p) => p,
                Err(e) => {
                    result.status = IssueStatus::Error;
                    result.error = Some(format!("{e:#}"));
                    results.push(result);
                    continue;
                }
            };

            let mut decision =
                BudgetGuard::new(&self.config.budget, &*self.ledger).check(plan.estimate + pending, now);
            if decision == Decision::Downgrade && plan.band != ComplexityBand::Simple {
                let simple = match self.plan(ComplexityBand::Simple, &prompt) {
                    Ok(p) => p,
                    Err(e) => {
                        result.status = IssueStatus::Error;
                        result.error = Some(format!("{e:#}"));
                        results.push(result);
                        continue;
                    }
                };
                tracing::info!(
                    issue = issue.number,
                    from = %plan.tier.model,
                    to = %simple.tier.model,
                    "downgrading to stay under budget"
                );
                result.downgraded = true;
                result.model = simple.tier.model.clone();
                plan = simple;
                decision = BudgetGuard::new(&self.config.budget, &*self.ledger)
                    .check(plan.estimate + pending, now);

                if let Some(hit) = self.cached(&plan.tier.model, &text, now) {
                    self.record_cache_hit(&mut result, plan.band, hit, opts, now)?;
                    results.push(result);
                    continue;
                }
            }
            result.estimated_cost = plan.estimate;

            if decision == Decision::Deny {
                tracing::warn!(issue = issue.number, estimate = plan.estimate, "stopping batch: budget exhausted");
                stopped = true;
                result.error = Some("weekly budget exhausted".to_string());
                results.push(result);
                continue;
            }

            if opts.dry_run {
                pending += plan.estimate;
                result.status = IssueStatus::Estimated;
                result.tokens_in = plan.prompt_tokens;
                result.tokens_out = plan.tier.max_tokens;
                result.search_queries = plan.tier.search_queries;
                results.push(result);
                continue;
            }

            self.call_backend(&mut result, issue, &text, &prompt, &plan, now)?;
            results.push(result);
        }

        Ok(self.summarize(results, opts, now))
    }

    fn record_cache_hit(
        &mut self,
        result: &mut IssueResult,
        band: ComplexityBand,
        hit: crate::cache::CacheEntry,
        opts: &AnalyzeOptions,
        now: DateTime<Utc>,
    ) -> Result<()> {
        result.status = IssueStatus::Cached;
        result.model = hit.model.clone();
        result.tokens_in = hit.usage.tokens_in;
        result.tokens_out = hit.usage.tokens_out;
        result.search_queries = hit.usage.search_queries;
        result.analysis = Some(hit.response);
        if !opts.dry_run {
            self.ledger.append(UsageRecord {
                tokens_in: hit.usage.tokens_in,
                tokens_out: hit.usage.tokens_out,
                search_queries: hit.usage.search_queries,
                estimated_cost: 0.0,
                cached: true,
                complexity: Some(band),
                issue: Some(format!("#{}", result.number)),
                ..UsageRecord::new(now, hit.model)
            })?;
        }
        Ok(())
    }

    fn call_backend(
        &mut self,
        result: &mut IssueResult,
        issue: &Issue,
        text: &str,
        prompt: &str,
        plan: &Plan,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(backend) = self.backend else {
            anyhow::bail!("no completion backend configured");
        };
        let request = ChatRequest {
            model: plan.tier.model.clone(),
            messages: vec![
                ChatMessage::system(self.config.api.system_prompt.clone()),
                ChatMessage::user(prompt),
            ],
            max_tokens: plan.tier.max_tokens,
            temperature: self.config.api.temperature,
            web_search_options: Some(WebSearchOptions::for_band(plan.band)),
        };

        let response = match backend.complete(&request) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(issue = issue.number, error = %e, "analysis request failed");
                result.status = IssueStatus::Error;
                result.error = Some(e.to_string());
                return Ok(());
            }
        };

        let searches = response
            .usage
            .search_queries
            .unwrap_or(plan.tier.search_queries);
        let actual = match response.usage.reported_cost {
            Some(c) => c,
            None => self
                .config
                .pricing_for(&plan.tier.model)
                .map(|p| {
                    estimate_cost(
                        &p,
                        response.usage.prompt_tokens,
                        response.usage.completion_tokens,
                        searches,
                    )
                })
                .unwrap_or(plan.estimate),
        };

        self.ledger.append(UsageRecord {
            tokens_in: response.usage.prompt_tokens,
            tokens_out: response.usage.completion_tokens,
            search_queries: searches,
            estimated_cost: actual,
            cached: false,
            complexity: Some(plan.band),
            issue: Some(format!("#{}", issue.number)),
            ..UsageRecord::new(now, plan.tier.model.clone())
        })?;

        if self.config.cache.enabled
            && let Some(cache) = self.cache
            && let Err(e) = cache.put(
                &plan.tier.model,
                text,
                &response.content,
                CachedUsage {
                    tokens_in: response.usage.prompt_tokens,
                    tokens_out: response.usage.completion_tokens,
                    search_queries: searches,
                },
                now,
            )
        {
            tracing::warn!(issue = issue.number, error = %e, "failed to cache response");
        }

        tracing::info!(
            issue = issue.number,
            model = %plan.tier.model,
            cost = actual,
            "issue analyzed"
        );
        result.status = IssueStatus::Analyzed;
        result.actual_cost = actual;
        result.tokens_in = response.usage.prompt_tokens;
        result.tokens_out = response.usage.completion_tokens;
        result.search_queries = searches;
        result.analysis = Some(response.content);
        result.citations = response.citations;
        Ok(())
    }

    fn summarize(&self, results: Vec<IssueResult>, opts: &AnalyzeOptions, now: DateTime<Utc>) -> BatchReport {
        let count = |s: IssueStatus| results.iter().filter(|r| r.status == s).count();
        BatchReport {
            week: iso_week_key(now),
            generated_at: now,
            dry_run: opts.dry_run,
            total_cost: results.iter().map(|r| r.actual_cost).sum(),
            estimated_cost: results.iter().map(|r| r.estimated_cost).sum(),
            analyzed: count(IssueStatus::Analyzed),
            cached: count(IssueStatus::Cached),
            estimated: count(IssueStatus::Estimated),
            skipped: count(IssueStatus::Skipped),
            errors: count(IssueStatus::Error),
            budget_after: BudgetGuard::new(&self.config.budget, &*self.ledger).status(now),
            results,
        }
    }
}
