use chrono::{DateTime, Utc};
use moka::future::Cache;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::db_storage::{OutcomeStorage, ScoreWrite};
use crate::handlers::AppState;
use crate::ml_client::{score_with_fallback, ModelScoringClient};
use crate::models::{Cancellation, ScoreLeadsRequest, ScoreLeadsResponse, ScoredLead, ScoringMethod};
use crate::personalization::PersonalizationService;
use crate::scoring::score_with_rules;

/// Runs the scoring pipeline for one request:
/// rules or model (with rule fallback) -> personalization -> outcome upsert.
pub struct LeadScoringService {
    ml_enabled: bool,
    ml_client: Option<ModelScoringClient>,
    personalization: PersonalizationService,
    outcomes: OutcomeStorage,
}

impl LeadScoringService {
    pub fn new(
        config: &Config,
        pool: PgPool,
        ml_client: Option<ModelScoringClient>,
        penalty_cache: Cache<Uuid, Arc<Vec<Cancellation>>>,
    ) -> Self {
        Self {
            ml_enabled: config.ml_scoring_enabled,
            ml_client,
            personalization: PersonalizationService::new(pool.clone(), penalty_cache),
            outcomes: OutcomeStorage::new(pool),
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            &state.config,
            state.db.clone(),
            state.ml_client.clone(),
            state.penalty_cache.clone(),
        )
    }

    /// The model is used only when the deployment enables it, a client
    /// exists and the caller did not opt out.
    fn model_client(&self, use_ml: Option<bool>) -> Option<&ModelScoringClient> {
        if !self.ml_enabled || !use_ml.unwrap_or(true) {
            return None;
        }
        self.ml_client.as_ref()
    }

    /// Scores a validated request. Never fails: model errors fall back to
    /// rules, personalization and persistence errors are logged.
    pub async fn score(&self, request: ScoreLeadsRequest, now: DateTime<Utc>) -> ScoreLeadsResponse {
        let ScoreLeadsRequest {
            leads,
            use_ml,
            user_id,
        } = request;

        let mut response = match self.model_client(use_ml) {
            Some(client) => score_with_fallback(client, &leads, now).await,
            None => ScoreLeadsResponse {
                method: ScoringMethod::Rules,
                data: score_with_rules(&leads, now),
            },
        };

        tracing::info!(
            "Scored {} lead(s) with method {:?}",
            response.data.len(),
            response.method
        );

        if let Some(user_id) = user_id {
            let scored = std::mem::take(&mut response.data);
            let fallback = scored.clone();
            response.data = match self.personalization.adjust(scored, user_id, now).await {
                Ok(adjusted) => adjusted,
                Err(e) => {
                    tracing::warn!("Personalization skipped for user {}: {}", user_id, e);
                    fallback
                }
            };
        }

        self.persist(&response.data, now).await;

        response
    }

    /// Best-effort outcome upserts for leads that carry an id, written as
    /// one batch.
    async fn persist(&self, scored: &[ScoredLead], now: DateTime<Utc>) {
        let writes: Vec<ScoreWrite> = scored
            .iter()
            .filter_map(|lead| {
                lead.lead.id.map(|lead_id| ScoreWrite {
                    lead_id,
                    score: lead.score,
                    win_probability: lead.win_probability,
                })
            })
            .collect();

        if writes.is_empty() {
            return;
        }

        match self.outcomes.upsert_outcomes(&writes, now).await {
            Ok(stored) => tracing::debug!("Stored {} lead outcome(s)", stored),
            Err(e) => tracing::error!(
                "Failed to store outcomes for {} lead(s): {}",
                writes.len(),
                e
            ),
        }
    }
}
