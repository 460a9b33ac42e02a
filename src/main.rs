use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

use perplexity_budget::analyzer::{AnalyzeOptions, IssueAnalyzer, load_issues};
use perplexity_budget::budget::{BudgetGuard, Decision};
use perplexity_budget::cache::ResponseCache;
use perplexity_budget::classifier::{ComplexityBand, classify};
use perplexity_budget::cli::{
    Args, BandArg, BudgetAction, CacheAction, Command, EXIT_RUNTIME_ERROR, FormatArg, LedgerAction,
};
use perplexity_budget::config::Config;
use perplexity_budget::display::{
    render_batch_markdown, render_batch_text, render_cache_stats_text,
    render_classification_text, render_report_markdown, render_report_text, render_status_text,
};
use perplexity_budget::ledger::Ledger;
use perplexity_budget::models::UsageRecord;
use perplexity_budget::monitor::build_report;
use perplexity_budget::perplexity::{CompletionBackend, PerplexityClient};
use perplexity_budget::pricing::estimate_cost;
use perplexity_budget::utils::{format_currency, read_stdin};
use perplexity_budget::week::parse_week_key;

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "perplexity_budget=debug"
    } else {
        "perplexity_budget=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())?;
    // CLI flags win over file and env
    if let Some(ledger) = &args.ledger {
        config.paths.ledger = Some(ledger.clone());
    }
    if let Some(dir) = &args.cache_dir {
        config.paths.cache_dir = Some(dir.clone());
    }
    if let Some(budget) = args.budget {
        config.budget.weekly_budget_usd = budget;
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn band_from_arg(band: BandArg) -> ComplexityBand {
    match band {
        BandArg::Simple => ComplexityBand::Simple,
        BandArg::Moderate => ComplexityBand::Moderate,
        BandArg::Complex => ComplexityBand::Complex,
    }
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write report {}", path.display()))
}

fn run(args: Args) -> Result<ExitCode> {
    let config = load_config(&args)?;
    let now = Utc::now();
    let format = args.format;

    match args.command {
        Command::Analyze {
            issues,
            dry_run,
            max,
            no_cache,
            output,
        } => {
            let issues = load_issues(&issues)?;
            let mut ledger = Ledger::load(config.ledger_path())?;
            let cache = ResponseCache::new(config.cache_dir(), config.cache.ttl_hours);
            let client = if dry_run {
                None
            } else {
                Some(PerplexityClient::from_env(&config.api)?)
            };
            let backend = client.as_ref().map(|c| c as &dyn CompletionBackend);
            tracing::info!(
                issues = issues.len(),
                dry_run,
                ledger = %ledger.path().display(),
                "starting issue analysis"
            );

            let report = IssueAnalyzer::new(
                &config,
                &mut ledger,
                if no_cache { None } else { Some(&cache) },
                backend,
            )
            .run(&issues, &AnalyzeOptions { dry_run, max_issues: max }, now)?;

            let rendered = match format {
                FormatArg::Json => serde_json::to_string_pretty(&report)?,
                FormatArg::Markdown => render_batch_markdown(&report),
                FormatArg::Text => render_batch_text(&report),
            };
            println!("{rendered}");
            if let Some(path) = output {
                let file_contents = match format {
                    // Colors do not belong in files
                    FormatArg::Text => render_batch_markdown(&report),
                    _ => rendered,
                };
                write_output(&path, &file_contents)?;
            }
            Ok(if report.errors > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }

        Command::Classify { file, labels } => {
            let text = match file {
                Some(path) => {
                    fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?
                }
                None => read_stdin()?,
            };
            let c = classify(&text, &labels);
            let tier = config.tiers.for_band(c.band);
            match format {
                FormatArg::Json => print_json(&serde_json::json!({
                    "band": c.band,
                    "score": c.score,
                    "signals": c.signals,
                    "tier": tier,
                }))?,
                _ => println!("{}\n  tier: {}", render_classification_text(&c), tier.model),
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Estimate {
            model,
            band,
            tokens_in,
            tokens_out,
            searches,
        } => {
            let tier = config
                .tiers
                .for_band(band.map(band_from_arg).unwrap_or(ComplexityBand::Simple));
            let model = model.unwrap_or_else(|| tier.model.clone());
            let pricing = config
                .pricing_for(&model)
                .with_context(|| format!("no pricing known for model {model}"))?;
            let tokens_out = tokens_out.unwrap_or(tier.max_tokens);
            let searches = searches.unwrap_or(tier.search_queries);
            let cost = estimate_cost(&pricing, tokens_in, tokens_out, searches);
            match format {
                FormatArg::Json => print_json(&serde_json::json!({
                    "model": model,
                    "tokens_in": tokens_in,
                    "tokens_out": tokens_out,
                    "search_queries": searches,
                    "estimated_cost": cost,
                }))?,
                _ => println!(
                    "{model}: {tokens_in} in + {tokens_out} out + {searches} searches = ${}",
                    format_currency(cost)
                ),
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Budget { action } => {
            let ledger = Ledger::load(config.ledger_path())?;
            let guard = BudgetGuard::new(&config.budget, &ledger);
            match action {
                BudgetAction::Status => {
                    let status = guard.status(now);
                    match format {
                        FormatArg::Json => print_json(&status)?,
                        _ => println!("{}", render_status_text(&status)),
                    }
                    Ok(ExitCode::SUCCESS)
                }
                BudgetAction::Check { estimate, strict } => {
                    let decision = match guard.ensure(estimate, now) {
                        Ok(d) => d,
                        Err(e) => {
                            eprintln!("{e}");
                            Decision::Deny
                        }
                    };
                    let status = guard.status(now);
                    match format {
                        FormatArg::Json => print_json(&serde_json::json!({
                            "decision": decision,
                            "estimate": estimate,
                            "status": status,
                        }))?,
                        _ => println!("{decision}: {}", render_status_text(&status)),
                    }
                    Ok(ExitCode::from(decision.exit_code(strict)))
                }
            }
        }

        Command::Report { weeks } => {
            let ledger = Ledger::load(config.ledger_path())?;
            let report = build_report(&ledger, &config.budget, weeks, now);
            match format {
                FormatArg::Json => print_json(&report)?,
                FormatArg::Markdown => print!("{}", render_report_markdown(&report)),
                FormatArg::Text => println!("{}", render_report_text(&report)),
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Cache { action } => {
            let cache = ResponseCache::new(config.cache_dir(), config.cache.ttl_hours);
            match action {
                CacheAction::Stats => {
                    let stats = cache.stats(now);
                    match format {
                        FormatArg::Json => print_json(&stats)?,
                        _ => println!(
                            "{}: {}",
                            cache.dir().display(),
                            render_cache_stats_text(&stats)
                        ),
                    }
                }
                CacheAction::Purge => println!("removed {} expired entries", cache.purge_expired(now)),
                CacheAction::Clear => println!("removed {} entries", cache.clear()),
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Ledger { action } => {
            let mut ledger = Ledger::load(config.ledger_path())?;
            match action {
                LedgerAction::Record {
                    model,
                    tokens_in,
                    tokens_out,
                    searches,
                    cost,
                    cached,
                    issue,
                } => {
                    let cost = match cost {
                        Some(c) => c,
                        None => config
                            .pricing_for(&model)
                            .map(|p| estimate_cost(&p, tokens_in, tokens_out, searches))
                            .with_context(|| {
                                format!("no pricing known for model {model}; pass --cost")
                            })?,
                    };
                    let record = UsageRecord {
                        tokens_in,
                        tokens_out,
                        search_queries: searches,
                        estimated_cost: cost,
                        cached,
                        issue,
                        ..UsageRecord::new(now, model)
                    };
                    ledger.append(record)?;
                    let status = BudgetGuard::new(&config.budget, &ledger).status(now);
                    println!("{}", render_status_text(&status));
                }
                LedgerAction::Prune { keep_weeks } => {
                    let removed = ledger.prune(keep_weeks, now);
                    if removed > 0 {
                        ledger.save()?;
                    }
                    tracing::info!(removed, keep_weeks, "ledger pruned");
                    println!("removed {removed} records");
                }
                LedgerAction::Show { week } => {
                    if let Some(w) = &week
                        && parse_week_key(w).is_none()
                    {
                        anyhow::bail!("invalid week key {w:?}, expected YYYY-W##");
                    }
                    let records: Vec<&UsageRecord> = ledger
                        .records()
                        .iter()
                        .filter(|r| week.as_deref().is_none_or(|w| r.week == w))
                        .collect();
                    match format {
                        FormatArg::Json => print_json(&records)?,
                        _ => {
                            for r in records {
                                println!(
                                    "{}  {}  {:<20} {:>6} in {:>6} out {:>2} q  ${}{}",
                                    r.timestamp.format("%Y-%m-%d %H:%M"),
                                    r.week,
                                    r.model,
                                    r.tokens_in,
                                    r.tokens_out,
                                    r.search_queries,
                                    format_currency(r.billable_cost()),
                                    if r.cached { "  (cached)" } else { "" }
                                );
                            }
                        }
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}
