use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use perplexity_budget::budget::BudgetLevel;
use perplexity_budget::cache::{CachedUsage, ResponseCache};
use perplexity_budget::config::BudgetConfig;
use perplexity_budget::display::render_report_markdown;
use perplexity_budget::ledger::Ledger;
use perplexity_budget::models::UsageRecord;
use perplexity_budget::monitor::build_report;

#[test]
fn markdown_report_lists_weeks_and_status() {
    let dir = TempDir::new().unwrap();
    let now = Utc.with_ymd_and_hms(2025, 2, 13, 12, 0, 0).unwrap();
    let mut ledger = Ledger::load(dir.path().join("ledger.json")).unwrap();
    ledger
        .append(UsageRecord {
            estimated_cost: 2.7,
            ..UsageRecord::new(now, "sonar-pro")
        })
        .unwrap();

    let report = build_report(&ledger, &BudgetConfig::default(), 2, now);
    assert_eq!(report.status.level, BudgetLevel::Warning);
    assert_eq!(report.projected_level, BudgetLevel::Exceeded);

    let md = render_report_markdown(&report);
    assert!(md.starts_with("## Perplexity API budget: 2025-W07"));
    assert!(md.contains("**warning**"));
    assert!(md.contains("| 2025-W07 | 1 | 0 |"));
    assert!(md.contains("| 2025-W06 | 0 | 0 |"));
    assert!(md.contains("$2.70 of $3.00"));
}

#[test]
fn ledger_survives_reload_and_prune() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("ledger.json");
    let now = Utc.with_ymd_and_hms(2025, 2, 13, 12, 0, 0).unwrap();
    let mut ledger = Ledger::load(&path).unwrap();
    for weeks_ago in [0, 1, 5] {
        ledger
            .append(UsageRecord {
                estimated_cost: 0.1,
                ..UsageRecord::new(now - chrono::Duration::weeks(weeks_ago), "sonar")
            })
            .unwrap();
    }

    let mut reloaded = Ledger::load(&path).unwrap();
    assert_eq!(reloaded.weeks(), vec!["2025-W07", "2025-W06", "2025-W02"]);
    assert_eq!(reloaded.prune(2, now), 1);
    reloaded.save().unwrap();
    assert_eq!(Ledger::load(&path).unwrap().records().len(), 2);
}

#[test]
fn cache_entries_expire_across_instances() {
    let dir = TempDir::new().unwrap();
    let now = Utc.with_ymd_and_hms(2025, 2, 13, 12, 0, 0).unwrap();
    let usage = CachedUsage {
        tokens_in: 10,
        tokens_out: 20,
        search_queries: 1,
    };
    ResponseCache::new(dir.path(), 24)
        .put("sonar", "Shuffle  repeats\nTracks", "answer", usage, now)
        .unwrap();

    // Another process with the same directory sees the entry
    let cache = ResponseCache::new(dir.path(), 24);
    let hit = cache.get("sonar", "shuffle repeats tracks", now).unwrap();
    assert_eq!(hit.response, "answer");
    assert!(cache.get("sonar-pro", "shuffle repeats tracks", now).is_none());

    let later = now + chrono::Duration::hours(25);
    assert_eq!(cache.stats(later).expired, 1);
    assert!(cache.get("sonar", "shuffle repeats tracks", later).is_none());
    assert_eq!(cache.stats(later).total, 0);
}
