use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::AppError;

/// Largest batch accepted by the scoring endpoint.
pub const MAX_LEADS_PER_REQUEST: usize = 500;

/// Oldest accepted construction year.
pub const MIN_YEAR_BUILT: i32 = 1600;

/// Largest valuation the `NUMERIC(14,2)` permit column holds.
pub const MAX_VALUATION: f64 = 999_999_999_999.0;

// ============ Database Models ============

/// Raw building-permit record ingested from a municipal data source.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Permit {
    /// Internal row id.
    pub id: Uuid,
    /// Jurisdiction the record came from.
    pub source: String,
    /// Identifier unique within `source`.
    pub source_record_id: String,
    /// Explicit permit id published by some jurisdictions.
    pub permit_id: Option<String>,
    pub permit_number: Option<String>,
    pub work_description: Option<String>,
    pub permit_type: Option<String>,
    pub valuation: Option<BigDecimal>,
    pub issue_date: Option<NaiveDate>,
    pub application_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub year_built: Option<i32>,
    pub applicant_name: Option<String>,
    pub owner_name: Option<String>,
    pub contractor_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Permit {
    /// Valuation as a float for scoring. Unparseable amounts count as unknown.
    pub fn valuation_f64(&self) -> Option<f64> {
        self.valuation.as_ref().and_then(|v| v.to_f64())
    }
}

/// Contractor-facing sales opportunity derived from a permit.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    /// Canonical permit identifier; unique across leads.
    pub external_permit_id: String,
    pub name: String,
    /// Primary trade/service classification.
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
    pub score_label: String,
    pub status: String,
    /// Provenance bag (source, source record, permit row, ...).
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Scoring result stored per lead.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LeadOutcome {
    pub lead_id: Uuid,
    pub calibrated_score: i32,
    pub win_label: Option<bool>,
    pub win_probability: Option<f64>,
    pub scored_at: DateTime<Utc>,
}

/// Historical reason a user dropped a lead or subscription area.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Cancellation {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Reason category, e.g. "out_of_area" or "low_quality".
    pub reason: String,
    pub weight: f64,
    pub region: Option<String>,
    pub trade: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============ Scoring Models ============

/// Discrete budget range used when no exact project value is known.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BudgetBand {
    #[serde(rename = "under_5k")]
    Under5k,
    #[serde(rename = "5k_15k")]
    From5kTo15k,
    #[serde(rename = "15k_50k")]
    From15kTo50k,
    #[serde(rename = "50k_plus")]
    Over50k,
}

impl BudgetBand {
    /// Representative amount for the band, aligned with the value tiers.
    pub fn proxy_value(self) -> f64 {
        match self {
            BudgetBand::Under5k => 0.0,
            BudgetBand::From5kTo15k => 5_000.0,
            BudgetBand::From15kTo50k => 15_000.0,
            BudgetBand::Over50k => 50_000.0,
        }
    }
}

/// Strongly-typed lead record accepted by the scorers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LeadInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default)]
    pub trade_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_band: Option<BudgetBand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_built: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_feedback_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_contact_issue: bool,
    #[serde(default)]
    pub has_qualification_issue: bool,
}

impl LeadInput {
    /// Every trade label on the lead, including the primary service.
    pub fn all_trade_tags(&self) -> impl Iterator<Item = &str> {
        self.trade_tags
            .iter()
            .map(String::as_str)
            .chain(self.service.as_deref())
    }

    /// Exact value if known, otherwise the budget band proxy.
    pub fn estimated_value(&self) -> Option<f64> {
        self.value
            .or_else(|| self.budget_band.map(BudgetBand::proxy_value))
    }

    pub fn validate(&self, index: usize, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(value) = self.value {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::BadRequest(format!(
                    "leads[{}].value must be a non-negative number",
                    index
                )));
            }
        }
        if let Some(year) = self.year_built {
            if !(MIN_YEAR_BUILT..=now.year() + 1).contains(&year) {
                return Err(AppError::BadRequest(format!(
                    "leads[{}].year_built {} is out of range",
                    index, year
                )));
            }
        }
        if self.trade_tags.len() > 20 {
            return Err(AppError::BadRequest(format!(
                "leads[{}].trade_tags accepts at most 20 entries",
                index
            )));
        }
        Ok(())
    }
}

impl From<&Lead> for LeadInput {
    fn from(lead: &Lead) -> Self {
        Self {
            id: Some(lead.id),
            name: Some(lead.name.clone()),
            service: Some(lead.service.clone()),
            trade_tags: lead.trade_tags.clone(),
            value: lead.value,
            budget_band: None,
            year_built: lead.year_built,
            owner_kind: lead.owner_kind.clone(),
            city: lead.city.clone(),
            zip_code: lead.zip_code.clone(),
            created_at: Some(lead.created_at),
            last_feedback_at: None,
            has_contact_issue: false,
            has_qualification_issue: false,
        }
    }
}

/// Categorical bucket derived from the numeric score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScoreLabel {
    Hot,
    Warm,
    Cold,
}

impl ScoreLabel {
    pub fn from_score(score: i32) -> Self {
        if score >= 80 {
            ScoreLabel::Hot
        } else if score >= 50 {
            ScoreLabel::Warm
        } else {
            ScoreLabel::Cold
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreLabel::Hot => "Hot",
            ScoreLabel::Warm => "Warm",
            ScoreLabel::Cold => "Cold",
        }
    }
}

/// Weighted points contributed by each rule factor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreFactors {
    pub recency: i32,
    pub trade_match: i32,
    pub project_value: i32,
    pub property_age: i32,
    pub owner_type: i32,
}

impl ScoreFactors {
    pub fn total(&self) -> i32 {
        self.recency + self.trade_match + self.project_value + self.property_age + self.owner_type
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredLead {
    #[serde(flatten)]
    pub lead: LeadInput,
    pub score: i32,
    pub score_label: ScoreLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factors: Option<ScoreFactors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_probability: Option<f64>,
}

impl ScoredLead {
    /// Replaces the score, keeping it inside [0, 100] and the label in sync.
    pub fn set_score(&mut self, score: i32) {
        self.score = score.clamp(0, 100);
        self.score_label = ScoreLabel::from_score(self.score);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
    Ml,
    Rules,
}

// ============ API Models ============

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreLeadsRequest {
    pub leads: Vec<LeadInput>,
    #[serde(default)]
    pub use_ml: Option<bool>,
    /// Requesting contractor, enables personalization when present.
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

impl ScoreLeadsRequest {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.leads.is_empty() {
            return Err(AppError::BadRequest(
                "leads must contain at least one lead".to_string(),
            ));
        }
        if self.leads.len() > MAX_LEADS_PER_REQUEST {
            return Err(AppError::BadRequest(format!(
                "at most {} leads can be scored per request",
                MAX_LEADS_PER_REQUEST
            )));
        }
        for (index, lead) in self.leads.iter().enumerate() {
            lead.validate(index, now)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreLeadsResponse {
    pub method: ScoringMethod,
    pub data: Vec<ScoredLead>,
}

/// Permit record exactly as a source feed sends it. Jurisdictions name the
/// same field differently and some send several spellings at once, so every
/// spelling is kept apart here and merged in `PermitPayload::from`.
#[derive(Debug, Default, Deserialize)]
struct RawPermitPayload {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    source_record_id: Option<String>,
    #[serde(default)]
    record_id: Option<String>,
    #[serde(default)]
    source_id: Option<String>,
    #[serde(default)]
    permit_id: Option<String>,
    #[serde(default)]
    permit_number: Option<String>,
    #[serde(default)]
    permit_no: Option<String>,
    #[serde(default)]
    permitnum: Option<String>,
    #[serde(default)]
    work_description: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    work_desc: Option<String>,
    #[serde(default)]
    permit_type: Option<String>,
    #[serde(default)]
    permit_class: Option<String>,
    #[serde(default)]
    permit_type_desc: Option<String>,
    #[serde(default)]
    valuation: Option<f64>,
    #[serde(default)]
    total_valuation: Option<f64>,
    #[serde(default)]
    estimated_cost: Option<f64>,
    #[serde(default)]
    issue_date: Option<NaiveDate>,
    #[serde(default)]
    issued_date: Option<NaiveDate>,
    #[serde(default)]
    application_date: Option<NaiveDate>,
    #[serde(default)]
    applied_date: Option<NaiveDate>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    original_address: Option<String>,
    #[serde(default)]
    street_address: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    zip_code: Option<String>,
    #[serde(default)]
    zip: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
    #[serde(default)]
    year_built: Option<i32>,
    #[serde(default)]
    applicant_name: Option<String>,
    #[serde(default)]
    applicant: Option<String>,
    #[serde(default)]
    applicant_full_name: Option<String>,
    #[serde(default)]
    owner_name: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    property_owner: Option<String>,
    #[serde(default)]
    owner_full_name: Option<String>,
    #[serde(default)]
    contractor_name: Option<String>,
    #[serde(default)]
    contractor: Option<String>,
    #[serde(default)]
    contractor_company: Option<String>,
    #[serde(default)]
    contractor_company_name: Option<String>,
}

/// First candidate that is non-blank after trimming.
fn first_non_blank<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Permit from a source feed with field spellings merged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawPermitPayload")]
pub struct PermitPayload {
    pub source: String,
    pub source_record_id: String,
    pub permit_id: Option<String>,
    pub permit_number: Option<String>,
    pub work_description: Option<String>,
    pub permit_type: Option<String>,
    pub valuation: Option<f64>,
    pub issue_date: Option<NaiveDate>,
    pub application_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub year_built: Option<i32>,
    pub applicant_name: Option<String>,
    pub owner_name: Option<String>,
    pub contractor_name: Option<String>,
}

impl From<RawPermitPayload> for PermitPayload {
    fn from(raw: RawPermitPayload) -> Self {
        Self {
            source: first_non_blank([raw.source]).unwrap_or_default(),
            source_record_id: first_non_blank([raw.source_record_id, raw.record_id, raw.source_id])
                .unwrap_or_default(),
            permit_id: first_non_blank([raw.permit_id]),
            permit_number: first_non_blank([raw.permit_number, raw.permit_no, raw.permitnum]),
            work_description: first_non_blank([
                raw.work_description,
                raw.description,
                raw.work_desc,
            ]),
            permit_type: first_non_blank([raw.permit_type, raw.permit_class, raw.permit_type_desc]),
            valuation: raw.valuation.or(raw.total_valuation).or(raw.estimated_cost),
            issue_date: raw.issue_date.or(raw.issued_date),
            application_date: raw.application_date.or(raw.applied_date),
            address: first_non_blank([raw.address, raw.original_address, raw.street_address]),
            city: first_non_blank([raw.city]),
            state: first_non_blank([raw.state]),
            zip_code: first_non_blank([raw.zip_code, raw.zip, raw.postal_code]),
            year_built: raw.year_built,
            applicant_name: first_non_blank([
                raw.applicant_name,
                raw.applicant,
                raw.applicant_full_name,
            ]),
            owner_name: first_non_blank([
                raw.owner_name,
                raw.owner,
                raw.property_owner,
                raw.owner_full_name,
            ]),
            contractor_name: first_non_blank([
                raw.contractor_name,
                raw.contractor,
                raw.contractor_company,
                raw.contractor_company_name,
            ]),
        }
    }
}

impl PermitPayload {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.source.is_empty() {
            return Err(AppError::BadRequest("source is required".to_string()));
        }
        if self.source_record_id.is_empty() {
            return Err(AppError::BadRequest(
                "source_record_id is required".to_string(),
            ));
        }
        if let Some(valuation) = self.valuation {
            if !valuation.is_finite() || valuation < 0.0 {
                return Err(AppError::BadRequest(
                    "valuation must be a non-negative number".to_string(),
                ));
            }
            if valuation > MAX_VALUATION {
                return Err(AppError::BadRequest(format!(
                    "valuation must not exceed {}",
                    MAX_VALUATION
                )));
            }
        }
        if let Some(year) = self.year_built {
            if !(MIN_YEAR_BUILT..=now.year() + 1).contains(&year) {
                return Err(AppError::BadRequest(format!(
                    "year_built {} is out of range",
                    year
                )));
            }
        }
        Ok(())
    }

    /// Builds the permit row this payload describes.
    pub fn into_permit(self, id: Uuid, now: DateTime<Utc>) -> Permit {
        Permit {
            id,
            source: self.source.trim().to_string(),
            source_record_id: self.source_record_id.trim().to_string(),
            permit_id: self.permit_id,
            permit_number: self.permit_number,
            work_description: self.work_description,
            permit_type: self.permit_type,
            valuation: self
                .valuation
                .and_then(|v| BigDecimal::from_str(&format!("{:.2}", v)).ok()),
            issue_date: self.issue_date,
            application_date: self.application_date,
            address: self.address,
            city: self.city,
            state: self.state,
            zip_code: self.zip_code,
            year_built: self.year_built,
            applicant_name: self.applicant_name,
            owner_name: self.owner_name,
            contractor_name: self.contractor_name,
            created_at: now,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PermitIngestResponse {
    pub permit_id: Uuid,
    /// False when the permit already had a lead.
    pub lead_created: bool,
    pub lead: Lead,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLeadRequest {
    pub name: String,
    #[serde(default)]
    pub external_permit_id: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub trade_tags: Vec<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub year_built: Option<i32>,
    #[serde(default)]
    pub owner_kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLeadStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeadListParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Contractor's reported result for a lead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Won,
    Lost,
    NoResponse,
    NotInterested,
}

impl FeedbackOutcome {
    /// Win label recorded on the outcome row, if this outcome decides one.
    pub fn win_label(self) -> Option<bool> {
        match self {
            FeedbackOutcome::Won => Some(true),
            FeedbackOutcome::Lost => Some(false),
            FeedbackOutcome::NoResponse | FeedbackOutcome::NotInterested => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackOutcome::Won => "won",
            FeedbackOutcome::Lost => "lost",
            FeedbackOutcome::NoResponse => "no_response",
            FeedbackOutcome::NotInterested => "not_interested",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRequest {
    pub lead_id: Uuid,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub rating: i16,
    #[serde(default)]
    pub outcome: Option<FeedbackOutcome>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl FeedbackRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=5).contains(&self.rating) {
            return Err(AppError::BadRequest(
                "rating must be between 1 and 5".to_string(),
            ));
        }
        if self.notes.as_ref().is_some_and(|n| n.len() > 2000) {
            return Err(AppError::BadRequest(
                "notes must be at most 2000 characters".to_string(),
            ));
        }
        Ok(())
    }
}
