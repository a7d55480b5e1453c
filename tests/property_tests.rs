/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use permit_leads_api::core::classifier::classify;
use permit_leads_api::core::identity::resolve_external_id;
use permit_leads_api::core::models::{BudgetBand, LeadInput, Permit};
use permit_leads_api::core::personalization::{apply_adjustments, derive_adjustments};
use permit_leads_api::core::models::Cancellation;
use permit_leads_api::core::scoring::{score_lead, score_with_rules};

fn budget_band() -> impl Strategy<Value = Option<BudgetBand>> {
    prop::option::of(prop::sample::select(vec![
        BudgetBand::Under5k,
        BudgetBand::From5kTo15k,
        BudgetBand::From15kTo50k,
        BudgetBand::Over50k,
    ]))
}

prop_compose! {
    fn any_lead()(
        age_days in -30i64..2000,
        tags in prop::collection::vec("[a-zA-Z &]{0,16}", 0..4),
        value in prop::option::of(0.0f64..5_000_000.0),
        band in budget_band(),
        year_built in prop::option::of(1700i32..2027),
        owner_kind in prop::option::of("[a-z]{0,12}"),
    ) -> LeadInput {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();
        LeadInput {
            created_at: Some(now - Duration::days(age_days)),
            trade_tags: tags,
            value,
            budget_band: band,
            year_built,
            owner_kind,
            ..Default::default()
        }
    }
}

fn permit(
    permit_id: Option<String>,
    permit_number: Option<String>,
    source_record_id: String,
) -> Permit {
    Permit {
        id: Uuid::from_u128(42),
        source: "dallas".to_string(),
        source_record_id,
        permit_id,
        permit_number,
        work_description: None,
        permit_type: None,
        valuation: None,
        issue_date: None,
        application_date: None,
        address: None,
        city: None,
        state: None,
        zip_code: None,
        year_built: None,
        applicant_name: None,
        owner_name: None,
        contractor_name: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}

// Property: rule scores always land in [0, 100]
proptest! {
    #[test]
    fn rule_score_is_bounded(lead in any_lead()) {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();
        let result = score_lead(&lead, now);
        prop_assert!((0..=100).contains(&result.score));
        prop_assert_eq!(result.score, result.factors.total().min(100));
    }

    #[test]
    fn rule_scoring_is_deterministic(lead in any_lead()) {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();
        prop_assert_eq!(score_lead(&lead, now), score_lead(&lead, now));
    }
}

// Property: identity resolution is total and deterministic
proptest! {
    #[test]
    fn identity_is_never_blank(
        permit_id in prop::option::of("\\PC{0,12}"),
        permit_number in prop::option::of("\\PC{0,12}"),
        record in "\\PC{0,12}",
    ) {
        let p = permit(permit_id, permit_number, record);
        let id = resolve_external_id(&p);
        prop_assert!(!id.trim().is_empty());
        prop_assert_eq!(id, resolve_external_id(&p));
    }

    #[test]
    fn blank_identifiers_fall_back_to_row_id(
        a in "[ \\t]{0,4}",
        b in "[ \\t]{0,4}",
        c in "[ \\t]{0,4}",
    ) {
        let p = permit(Some(a), Some(b), c);
        prop_assert_eq!(resolve_external_id(&p), Uuid::from_u128(42).to_string());
    }
}

// Property: classification never panics
proptest! {
    #[test]
    fn classification_never_panics(text in "\\PC*") {
        let _ = classify(&text);
    }
}

// Property: personalization is inert for any penalty history
proptest! {
    #[test]
    fn penalties_never_change_scores(
        leads in prop::collection::vec(any_lead(), 1..5),
        weights in prop::collection::vec(0.0f64..200.0, 1..6),
    ) {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();
        let scored = score_with_rules(&leads, now);
        let records: Vec<Cancellation> = weights
            .iter()
            .enumerate()
            .map(|(i, weight)| Cancellation {
                id: Uuid::new_v4(),
                user_id: Uuid::nil(),
                reason: if i % 2 == 0 { "out_of_area" } else { "low_quality" }.to_string(),
                weight: *weight,
                region: Some("75201".to_string()),
                trade: Some("Roofing".to_string()),
                created_at: now,
            })
            .collect();

        let adjusted = apply_adjustments(scored.clone(), &derive_adjustments(&records));
        prop_assert_eq!(adjusted, scored);
    }
}
