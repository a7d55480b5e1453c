//! Permit to lead conversion.
//!
//! Every stored permit yields at most one lead, keyed by the permit's
//! canonical external id. The lead gets a trade classification, the best
//! contact name the permit offers and an initial rule score.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::classifier::{classify_permit, TradeTag};
use crate::identity::resolve_external_id;
use crate::models::{CreateLeadRequest, LeadInput, Permit, ScoreLabel};
use crate::scoring::score_lead;

/// Contact name used when the permit names nobody.
pub const FALLBACK_CONTACT_NAME: &str = "Property Owner";

pub const DEFAULT_STATUS: &str = "new";

/// A lead ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLead {
    pub id: Uuid,
    pub external_permit_id: String,
    pub name: String,
    pub service: String,
    pub trade_tags: Vec<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub value: Option<f64>,
    pub year_built: Option<i32>,
    pub owner_kind: Option<String>,
    pub lead_score: i32,
    pub score_label: ScoreLabel,
    pub status: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NewLead {
    fn scoring_input(&self) -> LeadInput {
        LeadInput {
            id: Some(self.id),
            name: Some(self.name.clone()),
            service: Some(self.service.clone()),
            trade_tags: self.trade_tags.clone(),
            value: self.value,
            year_built: self.year_built,
            owner_kind: self.owner_kind.clone(),
            city: self.city.clone(),
            zip_code: self.zip_code.clone(),
            created_at: Some(self.created_at),
            ..Default::default()
        }
    }

    /// Sets `lead_score`/`score_label` from the rule scorer.
    fn with_rule_score(mut self, now: DateTime<Utc>) -> Self {
        let result = score_lead(&self.scoring_input(), now);
        self.lead_score = result.score;
        self.score_label = ScoreLabel::from_score(result.score);
        self
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Owner first, then applicant, then contractor.
pub fn best_contact_name(permit: &Permit) -> String {
    non_blank(permit.owner_name.as_deref())
        .or_else(|| non_blank(permit.applicant_name.as_deref()))
        .or_else(|| non_blank(permit.contractor_name.as_deref()))
        .unwrap_or(FALLBACK_CONTACT_NAME)
        .to_string()
}

fn llc_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(llc|l\.l\.c\.?)(\W|$)").expect("LLC pattern is valid")
    })
}

fn company_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\b(inc|corp|corporation|co|company|ltd|lp|llp|trust|holdings|properties|partners|homes|builders|group)\b",
        )
        .expect("company pattern is valid")
    })
}

/// Infers the owner type from the owner's name: `llc`, `company` or
/// `individual`. `None` when the permit names no owner.
pub fn infer_owner_kind(owner_name: Option<&str>) -> Option<String> {
    let name = non_blank(owner_name)?;

    let kind = if llc_pattern().is_match(name) {
        "llc"
    } else if company_pattern().is_match(name) {
        "company"
    } else {
        "individual"
    };

    Some(kind.to_string())
}

/// Builds the lead a permit turns into.
pub fn lead_from_permit(permit: &Permit, now: DateTime<Utc>) -> NewLead {
    let external_permit_id = resolve_external_id(permit);
    let trade = classify_permit(permit);

    let metadata = json!({
        "source": permit.source,
        "source_record_id": permit.source_record_id,
        "permit_number": permit.permit_number,
        "permit_row_id": permit.id.to_string(),
        "issue_date": permit.issue_date,
        "contractor_name": non_blank(permit.contractor_name.as_deref()),
        "ingested_at": now.to_rfc3339(),
    });

    NewLead {
        id: Uuid::new_v4(),
        external_permit_id,
        name: best_contact_name(permit),
        service: trade.as_str().to_string(),
        trade_tags: vec![trade.as_str().to_string()],
        address: permit.address.clone(),
        city: permit.city.clone(),
        state: permit.state.clone(),
        zip_code: permit.zip_code.clone(),
        value: permit.valuation_f64(),
        year_built: permit.year_built,
        owner_kind: infer_owner_kind(permit.owner_name.as_deref()),
        lead_score: 0,
        score_label: ScoreLabel::Cold,
        status: DEFAULT_STATUS.to_string(),
        metadata,
        created_at: now,
    }
    .with_rule_score(now)
}

/// Builds a manually entered lead.
pub fn lead_from_request(request: CreateLeadRequest, now: DateTime<Utc>) -> NewLead {
    let id = Uuid::new_v4();
    let service = non_blank(request.service.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| TradeTag::HomeServices.as_str().to_string());
    let trade_tags = if request.trade_tags.is_empty() {
        vec![service.clone()]
    } else {
        request.trade_tags
    };

    NewLead {
        id,
        external_permit_id: non_blank(request.external_permit_id.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("manual-{}", id)),
        name: request.name.trim().to_string(),
        service,
        trade_tags,
        address: request.address,
        city: request.city,
        state: request.state,
        zip_code: request.zip_code,
        value: request.value,
        year_built: request.year_built,
        owner_kind: request.owner_kind,
        lead_score: 0,
        score_label: ScoreLabel::Cold,
        status: DEFAULT_STATUS.to_string(),
        metadata: json!({ "source": "manual", "created_via": "api" }),
        created_at: now,
    }
    .with_rule_score(now)
}
