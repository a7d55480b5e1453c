use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use moka::future::Cache;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::db_storage::{LeadStorage, OutcomeStorage, PermitStorage};
use crate::errors::AppError;
use crate::ingest::{lead_from_permit, lead_from_request};
use crate::ml_client::ModelScoringClient;
use crate::models::*;
use crate::services::LeadScoringService;

const MAX_STATUS_LENGTH: usize = 50;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Model inference client; `None` when ML scoring is off.
    pub ml_client: Option<ModelScoringClient>,
    /// Recent cancellation records per user, short TTL.
    pub penalty_cache: Cache<Uuid, Arc<Vec<Cancellation>>>,
}

/// Unwraps a JSON body, turning axum's rejection into a 400 with our error body.
fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "permit-leads-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/v1/score-leads
///
/// Scores a batch of leads with the rule scorer, or with the model when
/// enabled and requested. Model failures are not surfaced: the response then
/// reports `method: "rules"`.
pub async fn score_leads(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScoreLeadsRequest>, JsonRejection>,
) -> Result<Json<ScoreLeadsResponse>, AppError> {
    let request = parse_body(payload)?;
    let now = Utc::now();
    request.validate(now)?;

    tracing::info!(
        "POST /score-leads - {} lead(s), use_ml: {:?}, personalized: {}",
        request.leads.len(),
        request.use_ml,
        request.user_id.is_some()
    );

    let service = LeadScoringService::from_state(&state);
    Ok(Json(service.score(request, now).await))
}

/// POST /api/v1/feedback
///
/// Records a contractor's rating of a lead.
pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let feedback = parse_body(payload)?;
    feedback.validate()?;

    tracing::info!(
        "POST /feedback - lead_id: {}, rating: {}",
        feedback.lead_id,
        feedback.rating
    );

    let leads = LeadStorage::new(state.db.clone());
    if leads.get_lead(feedback.lead_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "Lead with id {} not found",
            feedback.lead_id
        )));
    }

    let outcomes = OutcomeStorage::new(state.db.clone());
    let feedback_id = outcomes.record_feedback(&feedback).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": feedback_id,
            "lead_id": feedback.lead_id,
            "status": "recorded"
        })),
    ))
}

/// POST /api/v1/permits
///
/// Stores a permit and derives its lead. Re-sending the same source record
/// refreshes the permit and returns the lead created the first time.
pub async fn ingest_permit(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PermitPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<PermitIngestResponse>), AppError> {
    let payload = parse_body(payload)?;
    let now = Utc::now();
    payload.validate(now)?;

    tracing::info!(
        "POST /permits - {}/{}",
        payload.source,
        payload.source_record_id
    );

    let permit = payload.into_permit(Uuid::new_v4(), now);
    let stored = PermitStorage::new(state.db.clone())
        .upsert_permit(&permit)
        .await?;

    let new_lead = lead_from_permit(&stored, now);
    let (lead, lead_created) = LeadStorage::new(state.db.clone())
        .insert_lead(&new_lead)
        .await?;

    if lead_created {
        tracing::info!(
            "Created lead {} for permit {} (score {})",
            lead.id,
            lead.external_permit_id,
            lead.lead_score
        );
    } else {
        tracing::debug!(
            "Permit {} already has lead {}",
            lead.external_permit_id,
            lead.id
        );
    }

    let status = if lead_created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(PermitIngestResponse {
            permit_id: stored.id,
            lead_created,
            lead,
        }),
    ))
}

/// GET /api/v1/leads
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeadListParams>,
) -> Result<Json<Vec<Lead>>, AppError> {
    let leads = LeadStorage::new(state.db.clone())
        .list_leads(&params)
        .await?;
    Ok(Json(leads))
}

/// POST /api/v1/leads
///
/// Creates a lead by hand (not backed by an ingested permit).
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateLeadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Lead>), AppError> {
    let request = parse_body(payload)?;
    let now = Utc::now();

    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    let as_input = LeadInput {
        value: request.value,
        year_built: request.year_built,
        trade_tags: request.trade_tags.clone(),
        ..Default::default()
    };
    as_input.validate(0, now)?;

    let new_lead = lead_from_request(request, now);
    let (lead, created) = LeadStorage::new(state.db.clone())
        .insert_lead(&new_lead)
        .await?;

    if !created {
        return Err(AppError::BadRequest(format!(
            "A lead already exists for external_permit_id {}",
            new_lead.external_permit_id
        )));
    }

    tracing::info!("Created manual lead {}", lead.id);
    Ok((StatusCode::CREATED, Json(lead)))
}

/// GET /api/v1/leads/:id
pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, AppError> {
    let lead = LeadStorage::new(state.db.clone())
        .get_lead(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead with id {} not found", id)))?;
    Ok(Json(lead))
}

/// PATCH /api/v1/leads/:id/status
pub async fn update_lead_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateLeadStatusRequest>, JsonRejection>,
) -> Result<Json<Lead>, AppError> {
    let request = parse_body(payload)?;
    let status = request.status.trim().to_lowercase();

    if status.is_empty() || status.len() > MAX_STATUS_LENGTH {
        return Err(AppError::BadRequest(format!(
            "status must be 1-{} characters",
            MAX_STATUS_LENGTH
        )));
    }

    tracing::info!("PATCH /leads/{}/status -> {}", id, status);

    let lead = LeadStorage::new(state.db.clone())
        .update_status(id, &status)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead with id {} not found", id)))?;
    Ok(Json(lead))
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    id: Uuid,
    external_permit_id: &'a str,
    name: &'a str,
    service: &'a str,
    address: Option<&'a str>,
    city: Option<&'a str>,
    state: Option<&'a str>,
    zip_code: Option<&'a str>,
    value: Option<f64>,
    lead_score: i32,
    score_label: &'a str,
    status: &'a str,
    created_at: String,
}

impl<'a> From<&'a Lead> for ExportRow<'a> {
    fn from(lead: &'a Lead) -> Self {
        Self {
            id: lead.id,
            external_permit_id: &lead.external_permit_id,
            name: &lead.name,
            service: &lead.service,
            address: lead.address.as_deref(),
            city: lead.city.as_deref(),
            state: lead.state.as_deref(),
            zip_code: lead.zip_code.as_deref(),
            value: lead.value,
            lead_score: lead.lead_score,
            score_label: &lead.score_label,
            status: &lead.status,
            created_at: lead.created_at.to_rfc3339(),
        }
    }
}

/// Renders leads as CSV with a header row.
pub fn leads_to_csv(leads: &[Lead]) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for lead in leads {
        writer
            .serialize(ExportRow::from(lead))
            .map_err(|e| AppError::InternalError(format!("Failed to write CSV row: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::InternalError(format!("Failed to finish CSV: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| AppError::InternalError(format!("CSV was not UTF-8: {}", e)))
}

/// GET /api/v1/leads/export
///
/// CSV download of all leads. Disabled unless `EXPORTS_ENABLED` is on.
pub async fn export_leads(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    if !state.config.exports_enabled {
        return Err(AppError::Forbidden("Lead exports are disabled".to_string()));
    }

    let leads = LeadStorage::new(state.db.clone()).all_leads().await?;
    tracing::info!("Exporting {} lead(s) as CSV", leads.len());
    let body = leads_to_csv(&leads)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"leads.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lead() -> Lead {
        Lead {
            id: Uuid::nil(),
            external_permit_id: "BP-1".to_string(),
            name: "Doe, Jane".to_string(),
            service: "Roofing".to_string(),
            trade_tags: vec!["Roofing".to_string()],
            address: Some("12 Oak St".to_string()),
            city: Some("Austin".to_string()),
            state: Some("TX".to_string()),
            zip_code: None,
            value: Some(62000.0),
            year_built: Some(1990),
            owner_kind: Some("individual".to_string()),
            lead_score: 100,
            score_label: "Hot".to_string(),
            status: "new".to_string(),
            metadata: json!({}),
            created_at: Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap(),
            updated_at: None,
        }
    }

    #[test]
    fn test_csv_export() {
        let csv = leads_to_csv(&[lead()]).unwrap();
        let mut lines = csv.lines();

        assert_eq!(
            lines.next().unwrap(),
            "id,external_permit_id,name,service,address,city,state,zip_code,value,lead_score,score_label,status,created_at"
        );
        assert_eq!(
            lines.next().unwrap(),
            "00000000-0000-0000-0000-000000000000,BP-1,\"Doe, Jane\",Roofing,12 Oak St,Austin,TX,,62000.0,100,Hot,new,2026-10-18T12:00:00+00:00"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_csv_export_empty() {
        assert_eq!(leads_to_csv(&[]).unwrap(), "");
    }
}
