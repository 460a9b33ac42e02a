use std::fmt::Write as _;

#[cfg(feature = "colors")]
use owo_colors::OwoColorize;

// Provide a no-op color shim when "colors" feature is disabled
#[cfg(not(feature = "colors"))]
pub mod color_shim {
    use std::fmt::{self, Display, Formatter};

    #[derive(Clone)]
    pub struct Plain(pub String);

    impl Display for Plain {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    pub trait ColorizeShim {
        fn as_str(&self) -> &str;

        fn bright_black(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn red(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn yellow(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn green(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn bold(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn dimmed(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn cyan(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
    }

    impl ColorizeShim for &str {
        fn as_str(&self) -> &str {
            self
        }
    }
    impl ColorizeShim for String {
        fn as_str(&self) -> &str {
            self.as_str()
        }
    }
    impl ColorizeShim for Plain {
        fn as_str(&self) -> &str {
            &self.0
        }
    }
}

#[cfg(not(feature = "colors"))]
use color_shim::ColorizeShim as OwoColorize;

use crate::analyzer::{BatchReport, IssueStatus};
use crate::budget::{BudgetLevel, BudgetStatus};
use crate::cache::CacheStats;
use crate::classifier::Classification;
use crate::monitor::CostReport;
use crate::utils::{format_currency, format_tokens};

fn colorize_percent(pct: f64) -> String {
    if pct >= 95.0 {
        format!("{pct:.1}%").red().bold().to_string()
    } else if pct >= 80.0 {
        format!("{pct:.1}%").yellow().bold().to_string()
    } else {
        format!("{pct:.1}%").green().to_string()
    }
}

fn colorize_level(level: BudgetLevel) -> String {
    match level {
        BudgetLevel::Ok => "ok".green().to_string(),
        BudgetLevel::Warning => "warning".yellow().bold().to_string(),
        BudgetLevel::Exceeded => "exceeded".red().bold().to_string(),
    }
}

fn level_emoji(level: BudgetLevel) -> &'static str {
    match level {
        BudgetLevel::Ok => "🟢",
        BudgetLevel::Warning => "🟡",
        BudgetLevel::Exceeded => "🔴",
    }
}

pub fn render_status_text(status: &BudgetStatus) -> String {
    format!(
        "{} {}  ${} / ${}  ({} used, ${} left)  [{}]",
        "❯".cyan(),
        status.week.bold(),
        format_currency(status.spent),
        format_currency(status.budget),
        colorize_percent(status.percent_used),
        format_currency(status.remaining),
        colorize_level(status.level),
    )
}

pub fn render_classification_text(c: &Classification) -> String {
    let mut out = format!("{} (score {})", c.band.to_string().bold(), c.score);
    for s in &c.signals {
        let _ = write!(out, "\n  {}", s.as_str().dimmed());
    }
    out
}

pub fn render_cache_stats_text(stats: &CacheStats) -> String {
    format!(
        "{} entries ({} valid, {} expired), {} KiB",
        stats.total,
        stats.valid.to_string().green(),
        stats.expired.to_string().bright_black(),
        stats.bytes.div_ceil(1024)
    )
}

pub fn render_report_text(report: &CostReport) -> String {
    let mut out = render_status_text(&report.status);
    let _ = write!(
        out,
        "\n  projected end of week: ${} [{}]  ({:.0}% of week elapsed)",
        format_currency(report.projected_spend),
        colorize_level(report.projected_level),
        report.week_elapsed * 100.0
    );
    let _ = write!(
        out,
        "\n  cache hit rate: {:.1}%",
        report.cache_hit_rate * 100.0
    );
    for w in &report.weeks {
        let _ = write!(
            out,
            "\n  {}  {:>4} req  {:>4} cached  {:>7} tok  ${}",
            w.week,
            w.requests,
            w.cached,
            format_tokens(w.tokens_in + w.tokens_out),
            format_currency(w.spend)
        );
        for (model, m) in &w.by_model {
            let _ = write!(
                out,
                "\n      {}  {} req  ${}",
                model.as_str().dimmed(),
                m.requests,
                format_currency(m.cost)
            );
        }
    }
    out
}

/// Markdown suitable for `$GITHUB_STEP_SUMMARY`
pub fn render_report_markdown(report: &CostReport) -> String {
    let s = &report.status;
    let mut out = String::new();
    let _ = writeln!(out, "## Perplexity API budget: {}\n", s.week);
    let _ = writeln!(
        out,
        "{} **{}**: ${} of ${} spent ({:.1}%), ${} remaining\n",
        level_emoji(s.level),
        s.level,
        format_currency(s.spent),
        format_currency(s.budget),
        s.percent_used,
        format_currency(s.remaining)
    );
    let _ = writeln!(
        out,
        "- Projected end of week: ${} ({})",
        format_currency(report.projected_spend),
        report.projected_level
    );
    let _ = writeln!(out, "- Cache hit rate: {:.1}%\n", report.cache_hit_rate * 100.0);
    let _ = writeln!(out, "| Week | Requests | Cached | Tokens | Spend |");
    let _ = writeln!(out, "|------|---------:|-------:|-------:|------:|");
    for w in &report.weeks {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | ${} |",
            w.week,
            w.requests,
            w.cached,
            format_tokens(w.tokens_in + w.tokens_out),
            format_currency(w.spend)
        );
    }
    out
}

fn status_label(s: IssueStatus) -> &'static str {
    match s {
        IssueStatus::Analyzed => "analyzed",
        IssueStatus::Cached => "cached",
        IssueStatus::Estimated => "estimated",
        IssueStatus::Skipped => "skipped",
        IssueStatus::Error => "error",
    }
}

pub fn render_batch_text(batch: &BatchReport) -> String {
    let mut out = String::new();
    for r in &batch.results {
        let status = match r.status {
            IssueStatus::Analyzed | IssueStatus::Cached => status_label(r.status).green().to_string(),
            IssueStatus::Estimated => status_label(r.status).cyan().to_string(),
            IssueStatus::Skipped => status_label(r.status).yellow().to_string(),
            IssueStatus::Error => status_label(r.status).red().to_string(),
        };
        let _ = writeln!(
            out,
            "#{:<5} {:<9} {:<8} {:<20} ${}{}",
            r.number,
            status,
            r.band,
            r.model,
            format_currency(r.actual_cost.max(r.estimated_cost)),
            r.error
                .as_deref()
                .map(|e| format!("  ({e})"))
                .unwrap_or_default()
        );
    }
    let _ = write!(
        out,
        "{} analyzed, {} cached, {} estimated, {} skipped, {} errors; spent ${}\n{}",
        batch.analyzed,
        batch.cached,
        batch.estimated,
        batch.skipped,
        batch.errors,
        format_currency(batch.total_cost),
        render_status_text(&batch.budget_after)
    );
    out
}

pub fn render_batch_markdown(batch: &BatchReport) -> String {
    let mut out = String::new();
    let title = if batch.dry_run {
        "Issue analysis estimate"
    } else {
        "Issue analysis"
    };
    let _ = writeln!(out, "## {title} ({})\n", batch.week);
    let _ = writeln!(
        out,
        "{} analyzed, {} cached, {} estimated, {} skipped, {} errors. Spent **${}** (estimated ${}).\n",
        batch.analyzed,
        batch.cached,
        batch.estimated,
        batch.skipped,
        batch.errors,
        format_currency(batch.total_cost),
        format_currency(batch.estimated_cost)
    );
    let _ = writeln!(out, "| Issue | Status | Complexity | Model | Cost |");
    let _ = writeln!(out, "|------:|--------|------------|-------|-----:|");
    for r in &batch.results {
        let model = if r.downgraded {
            format!("{} (downgraded)", r.model)
        } else {
            r.model.clone()
        };
        let _ = writeln!(
            out,
            "| #{} | {} | {} | {} | ${} |",
            r.number,
            status_label(r.status),
            r.band,
            model,
            format_currency(r.actual_cost)
        );
    }
    for r in batch.results.iter().filter(|r| r.analysis.is_some()) {
        let _ = writeln!(out, "\n### #{}: {}\n", r.number, r.title);
        let _ = writeln!(out, "{}", r.analysis.as_deref().unwrap_or_default());
        for c in &r.citations {
            let _ = writeln!(out, "- <{c}>");
        }
    }
    let b = &batch.budget_after;
    let _ = writeln!(
        out,
        "\n{} Budget {}: ${} of ${} ({:.1}%)",
        level_emoji(b.level),
        b.week,
        format_currency(b.spent),
        format_currency(b.budget),
        b.percent_used
    );
    out
}
