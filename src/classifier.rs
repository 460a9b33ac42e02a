//! # Classifier Module
//!
//! Heuristic complexity scoring for issue text. The score picks one of three
//! bands, and each band maps to a Perplexity model tier.
//!
//! Signals:
//! - weighted keywords (architecture, security, ... push up; typo, docs push down)
//! - text length buckets
//! - structure: fenced code blocks, stack-trace lines, checklist items
//! - issue labels

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MODERATE_THRESHOLD: i32 = 3;
pub const COMPLEX_THRESHOLD: i32 = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityBand {
    Simple,
    Moderate,
    Complex,
}

impl ComplexityBand {
    pub fn from_score(score: i32) -> Self {
        if score < MODERATE_THRESHOLD {
            ComplexityBand::Simple
        } else if score < COMPLEX_THRESHOLD {
            ComplexityBand::Moderate
        } else {
            ComplexityBand::Complex
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityBand::Simple => "simple",
            ComplexityBand::Moderate => "moderate",
            ComplexityBand::Complex => "complex",
        }
    }
}

impl fmt::Display for ComplexityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Model and request shape used for one band
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub model: String,
    pub max_tokens: u64,
    pub search_queries: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierTable {
    pub simple: Tier,
    pub moderate: Tier,
    pub complex: Tier,
}

impl Default for TierTable {
    fn default() -> Self {
        TierTable {
            simple: Tier {
                model: "sonar".to_string(),
                max_tokens: 512,
                search_queries: 1,
            },
            moderate: Tier {
                model: "sonar-pro".to_string(),
                max_tokens: 1024,
                search_queries: 2,
            },
            complex: Tier {
                model: "sonar-reasoning-pro".to_string(),
                max_tokens: 2048,
                search_queries: 4,
            },
        }
    }
}

impl TierTable {
    pub fn for_band(&self, band: ComplexityBand) -> &Tier {
        match band {
            ComplexityBand::Simple => &self.simple,
            ComplexityBand::Moderate => &self.moderate,
            ComplexityBand::Complex => &self.complex,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Classification {
    pub band: ComplexityBand,
    pub score: i32,
    /// Human-readable reasons, e.g. `keyword:security(+3)`
    pub signals: Vec<String>,
}

struct KeywordRule {
    re: Regex,
    name: &'static str,
    weight: i32,
}

static KEYWORD_RULES: Lazy<Vec<KeywordRule>> = Lazy::new(|| {
    [
        ("architecture", r"\barchitect(ure|ural)?\b", 3),
        ("security", r"\b(security|vulnerab\w*|cve-\d+|xss|csrf|injection)\b", 3),
        ("race-condition", r"\b(race condition|deadlock|concurren\w*)\b", 3),
        ("memory-leak", r"\bmemory leak\b", 3),
        ("migration", r"\bmigrat(e|ion|ing)\b", 2),
        ("refactor", r"\brefactor\w*\b", 2),
        ("performance", r"\b(performance|latency|throughput|slow)\b", 2),
        ("scalability", r"\bscal(e|ing|ability)\b", 2),
        ("integration", r"\b(integration|oauth|webhook|api)\b", 1),
        ("database", r"\b(database|mongodb|schema|index(es)?)\b", 1),
        ("recommendation", r"\b(recommend\w*|embedding\w*|ml model)\b", 1),
        ("crash", r"\b(crash\w*|panic\w*|exception)\b", 1),
        ("typo", r"\btypos?\b", -2),
        ("docs", r"\b(docs?|documentation|readme)\b", -1),
        ("rename", r"\brenam(e|ing)\b", -1),
        ("cosmetic", r"\b(cosmetic|styling|css|color)\b", -1),
    ]
    .into_iter()
    .map(|(name, pattern, weight)| KeywordRule {
        re: Regex::new(&format!("(?i){pattern}")).unwrap(),
        name,
        weight,
    })
    .collect()
});

static STACK_TRACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(at \S+\(.*\)|File .+, line \d+|Traceback \(most recent call last\)|\d+: \S+::\S+)")
        .unwrap()
});
static CHECKLIST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[-*] \[[ xX]\]").unwrap());

fn label_weight(label: &str) -> i32 {
    match label.to_ascii_lowercase().as_str() {
        "security" | "architecture" | "epic" | "breaking-change" => 3,
        "performance" | "refactor" | "enhancement" | "feature" => 1,
        "bug" => 1,
        "documentation" | "docs" | "good first issue" | "typo" | "chore" => -2,
        _ => 0,
    }
}

fn length_weight(chars: usize) -> i32 {
    match chars {
        0..200 => 0,
        200..800 => 1,
        800..2000 => 2,
        _ => 3,
    }
}

/// Score `text` (plus optional labels) and pick a band
pub fn classify(text: &str, labels: &[String]) -> Classification {
    let mut score = 0;
    let mut signals = Vec::new();

    for rule in KEYWORD_RULES.iter() {
        if rule.re.is_match(text) {
            score += rule.weight;
            signals.push(format!("keyword:{}({:+})", rule.name, rule.weight));
        }
    }

    let len_w = length_weight(text.chars().count());
    if len_w != 0 {
        score += len_w;
        signals.push(format!("length({:+})", len_w));
    }

    let code_blocks = text.matches("```").count() / 2;
    if code_blocks > 0 {
        let w = code_blocks.min(2) as i32;
        score += w;
        signals.push(format!("code_blocks:{code_blocks}({w:+})"));
    }

    let trace_lines = STACK_TRACE_RE.find_iter(text).count();
    if trace_lines > 0 {
        score += 2;
        signals.push(format!("stack_trace:{trace_lines}(+2)"));
    }

    let checklist = CHECKLIST_RE.find_iter(text).count();
    if checklist >= 3 {
        let w = if checklist >= 6 { 2 } else { 1 };
        score += w;
        signals.push(format!("checklist:{checklist}({w:+})"));
    }

    for label in labels {
        let w = label_weight(label);
        if w != 0 {
            score += w;
            signals.push(format!("label:{label}({w:+})"));
        }
    }

    let band = ComplexityBand::from_score(score);
    tracing::debug!(score, band = %band, signals = signals.len(), "classified text");
    Classification {
        band,
        score,
        signals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_thresholds() {
        assert_eq!(ComplexityBand::from_score(-3), ComplexityBand::Simple);
        assert_eq!(ComplexityBand::from_score(2), ComplexityBand::Simple);
        assert_eq!(ComplexityBand::from_score(3), ComplexityBand::Moderate);
        assert_eq!(ComplexityBand::from_score(6), ComplexityBand::Moderate);
        assert_eq!(ComplexityBand::from_score(7), ComplexityBand::Complex);
    }

    #[test]
    fn test_typo_is_simple() {
        let c = classify("Fix typo in README", &["documentation".to_string()]);
        assert_eq!(c.band, ComplexityBand::Simple);
        assert!(c.score < 0);
    }

    #[test]
    fn test_security_architecture_is_complex() {
        let text = "Security review of the recommendation architecture: \
                    possible race condition when refreshing OAuth tokens";
        let c = classify(text, &[]);
        assert_eq!(c.band, ComplexityBand::Complex);
        assert!(c.signals.iter().any(|s| s.starts_with("keyword:security")));
    }

    #[test]
    fn test_structure_signals() {
        let body = "Playlist endpoint crashes\n\n```\nTraceback (most recent call last)\n  File \"app.py\", line 10, in <module>\n```\n";
        let c = classify(body, &["bug".to_string()]);
        // crash(+1) code_blocks(+1) stack_trace(+2) label:bug(+1)
        assert_eq!(c.score, 5);
        assert_eq!(c.band, ComplexityBand::Moderate);
    }

    #[test]
    fn test_tier_table_default() {
        let tiers = TierTable::default();
        assert_eq!(tiers.for_band(ComplexityBand::Simple).model, "sonar");
        assert_eq!(tiers.for_band(ComplexityBand::Complex).max_tokens, 2048);
    }

    #[test]
    fn test_band_serializes_lowercase() {
        let json = serde_json::to_string(&ComplexityBand::Moderate).unwrap();
        assert_eq!(json, "\"moderate\"");
    }
}
