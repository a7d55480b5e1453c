use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::ingest::NewLead;
use crate::models::{
    Cancellation, FeedbackRequest, Lead, LeadListParams, LeadOutcome, Permit, ScoreLabel,
};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;

/// One scoring result to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreWrite {
    pub lead_id: Uuid,
    pub score: i32,
    pub win_probability: Option<f64>,
}

/// Persistence for scoring results.
#[derive(Clone)]
pub struct OutcomeStorage {
    pool: PgPool,
}

impl OutcomeStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts the outcome row for a lead and mirrors the score onto the lead.
    ///
    /// Keyed by `lead_id`; on conflict the newer write replaces score,
    /// probability and timestamp. Calling twice with the same arguments leaves
    /// the same state.
    pub async fn upsert_outcome(
        &self,
        lead_id: Uuid,
        score: i32,
        win_probability: Option<f64>,
        as_of: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        self.upsert_outcomes(
            &[ScoreWrite {
                lead_id,
                score,
                win_probability,
            }],
            as_of,
        )
        .await
    }

    /// Batched form of `upsert_outcome`: one transaction, two statements,
    /// however many leads. Ids with no lead row are skipped. When an id
    /// repeats, its last entry wins.
    ///
    /// Returns the number of outcome rows written.
    pub async fn upsert_outcomes(
        &self,
        writes: &[ScoreWrite],
        as_of: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut latest: HashMap<Uuid, &ScoreWrite> = HashMap::with_capacity(writes.len());
        for write in writes {
            latest.insert(write.lead_id, write);
        }
        if latest.is_empty() {
            return Ok(0);
        }

        let mut lead_ids = Vec::with_capacity(latest.len());
        let mut scores = Vec::with_capacity(latest.len());
        let mut probabilities = Vec::with_capacity(latest.len());
        let mut labels = Vec::with_capacity(latest.len());
        for write in latest.values() {
            lead_ids.push(write.lead_id);
            scores.push(write.score);
            probabilities.push(write.win_probability);
            labels.push(ScoreLabel::from_score(write.score).as_str().to_string());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("starting outcome transaction")?;

        let written = sqlx::query(
            r#"
            INSERT INTO lead_outcomes (lead_id, calibrated_score, win_probability, scored_at)
            SELECT t.lead_id, t.score, t.win_probability, $4
            FROM UNNEST($1::uuid[], $2::int4[], $3::float8[]) AS t(lead_id, score, win_probability)
            JOIN leads l ON l.id = t.lead_id
            ON CONFLICT (lead_id) DO UPDATE
            SET calibrated_score = EXCLUDED.calibrated_score,
                win_probability = EXCLUDED.win_probability,
                scored_at = EXCLUDED.scored_at
            "#,
        )
        .bind(&lead_ids)
        .bind(&scores)
        .bind(&probabilities)
        .bind(as_of)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("upserting {} lead outcome(s)", lead_ids.len()))?
        .rows_affected();

        sqlx::query(
            r#"
            UPDATE leads AS l
            SET lead_score = t.score,
                score_label = t.label,
                updated_at = $4
            FROM UNNEST($1::uuid[], $2::int4[], $3::text[]) AS t(lead_id, score, label)
            WHERE l.id = t.lead_id
            "#,
        )
        .bind(&lead_ids)
        .bind(&scores)
        .bind(&labels)
        .bind(as_of)
        .execute(&mut *tx)
        .await
        .context("mirroring scores onto leads")?;

        tx.commit().await.context("committing lead outcomes")?;

        Ok(written)
    }

    pub async fn get_outcome(&self, lead_id: Uuid) -> Result<Option<LeadOutcome>, AppError> {
        let outcome = sqlx::query_as::<_, LeadOutcome>(
            "SELECT lead_id, calibrated_score, win_label, win_probability, scored_at
             FROM lead_outcomes WHERE lead_id = $1",
        )
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(outcome)
    }

    /// Records contractor feedback and, for won/lost outcomes, the win label.
    pub async fn record_feedback(&self, feedback: &FeedbackRequest) -> Result<Uuid, AppError> {
        let feedback_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO lead_feedback (id, lead_id, user_id, rating, outcome, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            "#,
        )
        .bind(feedback_id)
        .bind(feedback.lead_id)
        .bind(feedback.user_id)
        .bind(feedback.rating)
        .bind(feedback.outcome.map(|o| o.as_str()))
        .bind(feedback.notes.as_deref())
        .execute(&self.pool)
        .await
        .context("inserting lead feedback")?;

        if let Some(win_label) = feedback.outcome.and_then(|o| o.win_label()) {
            sqlx::query(
                r#"
                INSERT INTO lead_outcomes (lead_id, calibrated_score, win_label, scored_at)
                SELECT id, lead_score, $2, now() FROM leads WHERE id = $1
                ON CONFLICT (lead_id) DO UPDATE
                SET win_label = EXCLUDED.win_label
                "#,
            )
            .bind(feedback.lead_id)
            .bind(win_label)
            .execute(&self.pool)
            .await
            .context("recording win label")?;
        }

        Ok(feedback_id)
    }
}

/// Leads table access.
#[derive(Clone)]
pub struct LeadStorage {
    pool: PgPool,
}

impl LeadStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a lead unless one already exists for its external permit id.
    ///
    /// Returns the stored lead and whether this call created it.
    pub async fn insert_lead(&self, lead: &NewLead) -> Result<(Lead, bool), AppError> {
        let inserted = sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (
                id, external_permit_id, name, service, trade_tags,
                address, city, state, zip_code, value, year_built, owner_kind,
                lead_score, score_label, status, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (external_permit_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(lead.id)
        .bind(&lead.external_permit_id)
        .bind(&lead.name)
        .bind(&lead.service)
        .bind(&lead.trade_tags)
        .bind(lead.address.as_deref())
        .bind(lead.city.as_deref())
        .bind(lead.state.as_deref())
        .bind(lead.zip_code.as_deref())
        .bind(lead.value)
        .bind(lead.year_built)
        .bind(lead.owner_kind.as_deref())
        .bind(lead.lead_score)
        .bind(lead.score_label.as_str())
        .bind(&lead.status)
        .bind(&lead.metadata)
        .bind(lead.created_at)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("inserting lead {}", lead.external_permit_id))?;

        if let Some(created) = inserted {
            return Ok((created, true));
        }

        let existing = self
            .find_by_external_id(&lead.external_permit_id)
            .await?
            .ok_or_else(|| {
                AppError::InternalError(format!(
                    "Lead {} conflicted but could not be read back",
                    lead.external_permit_id
                ))
            })?;

        Ok((existing, false))
    }

    pub async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE external_permit_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(lead)
    }

    pub async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(lead)
    }

    pub async fn list_leads(&self, params: &LeadListParams) -> Result<Vec<Lead>, AppError> {
        let limit = params
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = params.offset.unwrap_or(0).max(0);

        let leads = sqlx::query_as::<_, Lead>(
            r#"
            SELECT * FROM leads
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY lead_score DESC, created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(params.status.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("listing leads")?;

        Ok(leads)
    }

    /// All leads in score order, for exports.
    pub async fn all_leads(&self) -> Result<Vec<Lead>, AppError> {
        let leads = sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads ORDER BY lead_score DESC, created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("exporting leads")?;

        Ok(leads)
    }

    pub async fn update_status(&self, id: Uuid, status: &str) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"
            UPDATE leads
            SET status = $2, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("updating status of lead {}", id))?;

        Ok(lead)
    }
}

/// Permits table access.
#[derive(Clone)]
pub struct PermitStorage {
    pool: PgPool,
}

impl PermitStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a permit, or refreshes the stored copy when the same
    /// `(source, source_record_id)` reappears. Returns the stored row.
    pub async fn upsert_permit(&self, permit: &Permit) -> Result<Permit, AppError> {
        let stored = sqlx::query_as::<_, Permit>(
            r#"
            INSERT INTO permits (
                id, source, source_record_id, permit_id, permit_number,
                work_description, permit_type, valuation, issue_date, application_date,
                address, city, state, zip_code, year_built,
                applicant_name, owner_name, contractor_name, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            ON CONFLICT (source, source_record_id) DO UPDATE
            SET permit_id = COALESCE(EXCLUDED.permit_id, permits.permit_id),
                permit_number = COALESCE(EXCLUDED.permit_number, permits.permit_number),
                work_description = COALESCE(EXCLUDED.work_description, permits.work_description),
                permit_type = COALESCE(EXCLUDED.permit_type, permits.permit_type),
                valuation = COALESCE(EXCLUDED.valuation, permits.valuation),
                issue_date = COALESCE(EXCLUDED.issue_date, permits.issue_date),
                application_date = COALESCE(EXCLUDED.application_date, permits.application_date),
                address = COALESCE(EXCLUDED.address, permits.address),
                city = COALESCE(EXCLUDED.city, permits.city),
                state = COALESCE(EXCLUDED.state, permits.state),
                zip_code = COALESCE(EXCLUDED.zip_code, permits.zip_code),
                year_built = COALESCE(EXCLUDED.year_built, permits.year_built),
                applicant_name = COALESCE(EXCLUDED.applicant_name, permits.applicant_name),
                owner_name = COALESCE(EXCLUDED.owner_name, permits.owner_name),
                contractor_name = COALESCE(EXCLUDED.contractor_name, permits.contractor_name),
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(permit.id)
        .bind(&permit.source)
        .bind(&permit.source_record_id)
        .bind(permit.permit_id.as_deref())
        .bind(permit.permit_number.as_deref())
        .bind(permit.work_description.as_deref())
        .bind(permit.permit_type.as_deref())
        .bind(permit.valuation.as_ref())
        .bind(permit.issue_date)
        .bind(permit.application_date)
        .bind(permit.address.as_deref())
        .bind(permit.city.as_deref())
        .bind(permit.state.as_deref())
        .bind(permit.zip_code.as_deref())
        .bind(permit.year_built)
        .bind(permit.applicant_name.as_deref())
        .bind(permit.owner_name.as_deref())
        .bind(permit.contractor_name.as_deref())
        .bind(permit.created_at)
        .fetch_one(&self.pool)
        .await
        .with_context(|| {
            format!(
                "upserting permit {}/{}",
                permit.source, permit.source_record_id
            )
        })?;

        Ok(stored)
    }

    /// Permits that never produced a lead, oldest first, skipping `offset`.
    pub async fn permits_without_leads_from(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Permit>, AppError> {
        let permits = sqlx::query_as::<_, Permit>(
            r#"
            SELECT p.* FROM permits p
            WHERE NOT EXISTS (
                SELECT 1 FROM leads l WHERE l.metadata->>'permit_row_id' = p.id::text
            )
            ORDER BY p.created_at ASC, p.id ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("listing permits without leads")?;

        Ok(permits)
    }
}

/// Read access to cancellation/penalty history.
#[derive(Clone)]
pub struct PenaltyStorage {
    pool: PgPool,
}

impl PenaltyStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn fetch_recent_cancellations(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Cancellation>, AppError> {
        let records = sqlx::query_as::<_, Cancellation>(
            r#"
            SELECT id, user_id, reason, weight, region, trade, created_at
            FROM cancellations
            WHERE user_id = $1 AND created_at >= $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("fetching cancellations for user {}", user_id))?;

        Ok(records)
    }
}
