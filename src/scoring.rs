//! Rules-based lead scorer.
//!
//! Five independent factors each produce a sub-score that is multiplied by a
//! fixed weight. The weighted points are summed and capped at 100:
//!
//! | Factor        | Sub-score | Weight |
//! |---------------|-----------|--------|
//! | Recency       | 0-25      | x3     |
//! | Trade match   | 0-25      | x2     |
//! | Project value | 0-25      | x2     |
//! | Property age  | 0-15      | x1     |
//! | Owner type    | 0-10      | x1     |
//!
//! The scorer is pure: the caller supplies `now`, so the same lead always
//! scores the same for a given instant.

use chrono::{DateTime, Datelike, Utc};

use crate::models::{LeadInput, ScoreFactors, ScoreLabel, ScoredLead};

const RECENCY_WEIGHT: i32 = 3;
const TRADE_WEIGHT: i32 = 2;
const VALUE_WEIGHT: i32 = 2;
const AGE_WEIGHT: i32 = 1;
const OWNER_WEIGHT: i32 = 1;

pub const MAX_SCORE: i32 = 100;

/// Base score per trade, before weighting.
const TRADE_SCORES: &[(&str, i32)] = &[
    ("roofing", 25),
    ("kitchen", 24),
    ("bath", 22),
    ("foundation", 22),
    ("pool", 20),
    ("solar", 20),
    ("windows", 18),
    ("hvac", 18),
    ("electrical", 16),
    ("plumbing", 16),
    ("fence", 15),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleScore {
    pub score: i32,
    pub factors: ScoreFactors,
}

pub fn recency_points(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i32 {
    // A lead without a creation time is treated as brand new
    let days = created_at
        .map(|created| (now - created).num_days())
        .unwrap_or(0);
    let sub = (25 - days).clamp(0, 25) as i32;
    sub * RECENCY_WEIGHT
}

/// Looks a single tag up, first as a whole ("hvac") then by its first word
/// ("Windows & Doors" -> "windows").
fn trade_base_score(tag: &str) -> i32 {
    let normalized = tag.trim().to_lowercase();
    let lookup = |key: &str| {
        TRADE_SCORES
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, score)| *score)
    };

    lookup(&normalized)
        .or_else(|| normalized.split_whitespace().next().and_then(lookup))
        .unwrap_or(0)
}

pub fn trade_points<'a>(tags: impl IntoIterator<Item = &'a str>) -> i32 {
    let best = tags.into_iter().map(trade_base_score).max().unwrap_or(0);
    best * TRADE_WEIGHT
}

pub fn value_points(value: Option<f64>) -> i32 {
    let sub = match value {
        None => 0,
        Some(v) if v >= 50_000.0 => 25,
        Some(v) if v >= 15_000.0 => 20,
        Some(v) if v >= 5_000.0 => 15,
        Some(_) => 10,
    };
    sub * VALUE_WEIGHT
}

/// Years that overflow or lie in the future count as unknown.
pub fn property_age_points(year_built: Option<i32>, current_year: i32) -> i32 {
    let age = year_built
        .and_then(|year| current_year.checked_sub(year))
        .filter(|age| *age >= 0);
    let sub = match age {
        None => 0,
        Some(age) if age >= 25 => 15,
        Some(age) if age >= 15 => 12,
        Some(age) if age >= 10 => 8,
        Some(_) => 5,
    };
    sub * AGE_WEIGHT
}

pub fn owner_points(owner_kind: Option<&str>) -> i32 {
    let sub = match owner_kind.map(|k| k.trim().to_lowercase()) {
        None => 0,
        Some(kind) if kind.is_empty() => 0,
        Some(kind) if kind == "individual" => 10,
        Some(kind) if kind == "llc" => 7,
        Some(_) => 5,
    };
    sub * OWNER_WEIGHT
}

/// Scores one lead with the fixed rule weights.
pub fn score_lead(lead: &LeadInput, now: DateTime<Utc>) -> RuleScore {
    let factors = ScoreFactors {
        recency: recency_points(lead.created_at, now),
        trade_match: trade_points(lead.all_trade_tags()),
        project_value: value_points(lead.estimated_value()),
        property_age: property_age_points(lead.year_built, now.year()),
        owner_type: owner_points(lead.owner_kind.as_deref()),
    };

    RuleScore {
        score: factors.total().clamp(0, MAX_SCORE),
        factors,
    }
}

/// Scores every lead with the rule scorer, preserving input order.
pub fn score_with_rules(leads: &[LeadInput], now: DateTime<Utc>) -> Vec<ScoredLead> {
    leads
        .iter()
        .map(|lead| {
            let RuleScore { score, factors } = score_lead(lead, now);
            ScoredLead {
                lead: lead.clone(),
                score,
                score_label: ScoreLabel::from_score(score),
                factors: Some(factors),
                win_probability: None,
            }
        })
        .collect()
}
