/// Scenario tests for the rule scorer, classifier and identity resolver
use chrono::{DateTime, Duration, TimeZone, Utc};
use permit_leads_api::core::classifier::{classify, TradeTag};
use permit_leads_api::core::models::{BudgetBand, LeadInput, ScoreLabel};
use permit_leads_api::core::scoring::{score_lead, score_with_rules};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 15, 0, 0).unwrap()
}

#[cfg(test)]
mod rule_scoring_tests {
    use super::*;

    #[test]
    fn test_hot_roofing_lead_caps_at_100() {
        let lead = LeadInput {
            created_at: Some(now()),
            trade_tags: vec!["roofing".into()],
            value: Some(60_000.0),
            year_built: Some(1996),
            owner_kind: Some("individual".into()),
            ..Default::default()
        };

        let result = score_lead(&lead, now());

        assert_eq!(result.factors.recency, 75);
        assert_eq!(result.factors.trade_match, 50);
        assert_eq!(result.factors.project_value, 50);
        assert_eq!(result.factors.property_age, 15);
        assert_eq!(result.factors.owner_type, 10);
        assert_eq!(result.score, 100);
    }

    #[test]
    fn test_bare_lead_scores_recency_only() {
        let lead = LeadInput {
            created_at: Some(now() - Duration::days(10)),
            ..Default::default()
        };

        assert_eq!(score_lead(&lead, now()).score, 45);
    }

    #[test]
    fn test_old_bare_lead_scores_zero() {
        let lead = LeadInput {
            created_at: Some(now() - Duration::days(90)),
            ..Default::default()
        };

        assert_eq!(score_lead(&lead, now()).score, 0);
    }

    #[test]
    fn test_budget_band_uses_value_tiers() {
        let exact = LeadInput {
            created_at: Some(now() - Duration::days(30)),
            value: Some(20_000.0),
            ..Default::default()
        };
        let banded = LeadInput {
            created_at: Some(now() - Duration::days(30)),
            budget_band: Some(BudgetBand::From15kTo50k),
            ..Default::default()
        };

        assert_eq!(score_lead(&exact, now()).score, 40);
        assert_eq!(score_lead(&banded, now()).score, 40);
    }

    #[test]
    fn test_exact_value_beats_band() {
        let lead = LeadInput {
            created_at: Some(now() - Duration::days(30)),
            value: Some(1_000.0),
            budget_band: Some(BudgetBand::Over50k),
            ..Default::default()
        };

        assert_eq!(score_lead(&lead, now()).factors.project_value, 20);
    }

    #[test]
    fn test_score_capping_and_recency_decay() {
        // 15 days old (30) + plumbing (32) + 8k (30) + built 2014 (8) + llc (7)
        let lead = LeadInput {
            created_at: Some(now() - Duration::days(15)),
            service: Some("Plumbing".into()),
            value: Some(8_000.0),
            year_built: Some(2014),
            owner_kind: Some("LLC".into()),
            ..Default::default()
        };

        let result = score_lead(&lead, now());
        assert_eq!(result.score, 100);

        let older = LeadInput {
            created_at: Some(now() - Duration::days(24)),
            ..lead
        };
        let result = score_lead(&older, now());
        assert_eq!(result.score, 3 + 32 + 30 + 8 + 7);
    }

    #[test]
    fn test_batch_preserves_order_and_labels() {
        let leads = vec![
            LeadInput {
                name: Some("cold".into()),
                created_at: Some(now() - Duration::days(20)),
                ..Default::default()
            },
            LeadInput {
                name: Some("hot".into()),
                created_at: Some(now()),
                trade_tags: vec!["kitchen".into()],
                ..Default::default()
            },
        ];

        let scored = score_with_rules(&leads, now());

        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].lead.name.as_deref(), Some("cold"));
        assert_eq!(scored[0].score, 15);
        assert_eq!(scored[0].score_label, ScoreLabel::Cold);
        assert_eq!(scored[1].score, 100);
        assert_eq!(scored[1].score_label, ScoreLabel::Hot);
        assert!(scored.iter().all(|s| s.factors.is_some()));
    }
}

#[cfg(test)]
mod classifier_tests {
    use super::*;

    #[test]
    fn test_roof_and_hvac_resolves_to_first_rule() {
        assert_eq!(classify("Roof replacement with new HVAC"), TradeTag::Hvac);
    }

    #[test]
    fn test_classified_tag_feeds_trade_score() {
        let tag = classify("Replace exterior doors");
        let lead = LeadInput {
            created_at: Some(now() - Duration::days(25)),
            trade_tags: vec![tag.to_string()],
            ..Default::default()
        };

        assert_eq!(tag, TradeTag::WindowsAndDoors);
        assert_eq!(score_lead(&lead, now()).score, 36);
    }
}
