//! Per-user score adjustments derived from cancellation history.
//!
//! A user who cancelled leads as `out_of_area` or `low_quality` carries
//! penalty records. Each record becomes a region- or trade-scoped delta.
//!
//! `should_apply_adjustment` decides whether a delta touches a given lead and
//! currently never matches, so adjustments are computed but have no effect.
//! Region/trade matching needs a product decision before it is turned on; the
//! regression tests in this module fail if that changes silently.
//!
//! Deltas are negative: a cancellation lowers matching leads. Only their
//! magnitude, `round(weight x 0.5)` and `round(weight x 0.3)`, is settled;
//! the sign needs confirming when matching is turned on.

use chrono::{DateTime, Duration, Utc};
use moka::future::Cache;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::db_storage::PenaltyStorage;
use crate::errors::AppError;
use crate::models::{Cancellation, ScoredLead};

/// Only cancellations newer than this count.
pub const PENALTY_WINDOW_DAYS: i64 = 90;

const OUT_OF_AREA_FACTOR: f64 = 0.5;
const LOW_QUALITY_FACTOR: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustmentScope {
    /// Applies to leads in the cancelled region.
    Region(Option<String>),
    /// Applies to leads of the cancelled trade.
    Trade(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreAdjustment {
    pub scope: AdjustmentScope,
    pub delta: i32,
}

/// Turns penalty records into score deltas. Unknown reasons are ignored.
pub fn derive_adjustments(records: &[Cancellation]) -> Vec<ScoreAdjustment> {
    records
        .iter()
        .filter_map(|record| match record.reason.as_str() {
            "out_of_area" => Some(ScoreAdjustment {
                scope: AdjustmentScope::Region(record.region.clone()),
                delta: -((record.weight * OUT_OF_AREA_FACTOR).round() as i32),
            }),
            "low_quality" => Some(ScoreAdjustment {
                scope: AdjustmentScope::Trade(record.trade.clone()),
                delta: -((record.weight * LOW_QUALITY_FACTOR).round() as i32),
            }),
            _ => None,
        })
        .collect()
}

/// Whether `adjustment` applies to `lead`. Always false for now.
pub fn should_apply_adjustment(_lead: &ScoredLead, _adjustment: &ScoreAdjustment) -> bool {
    false
}

/// Sums the applicable deltas per lead and keeps the result in [0, 100].
pub fn apply_adjustments(
    mut leads: Vec<ScoredLead>,
    adjustments: &[ScoreAdjustment],
) -> Vec<ScoredLead> {
    for lead in &mut leads {
        let delta: i32 = adjustments
            .iter()
            .filter(|adjustment| should_apply_adjustment(lead, adjustment))
            .map(|adjustment| adjustment.delta)
            .sum();

        if delta != 0 {
            let adjusted = lead.score + delta;
            lead.set_score(adjusted);
        }
    }
    leads
}

/// Applies a requesting user's penalties to freshly scored leads.
#[derive(Clone)]
pub struct PersonalizationService {
    storage: PenaltyStorage,
    /// Recent penalties per user; short TTL, set up in `main`.
    cache: Cache<Uuid, Arc<Vec<Cancellation>>>,
}

impl PersonalizationService {
    pub fn new(pool: PgPool, cache: Cache<Uuid, Arc<Vec<Cancellation>>>) -> Self {
        Self {
            storage: PenaltyStorage::new(pool),
            cache,
        }
    }

    async fn recent_penalties(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Arc<Vec<Cancellation>>, AppError> {
        if let Some(cached) = self.cache.get(&user_id).await {
            tracing::debug!("Penalty cache HIT for user {}", user_id);
            return Ok(cached);
        }

        let since = now - Duration::days(PENALTY_WINDOW_DAYS);
        let records = Arc::new(
            self.storage
                .fetch_recent_cancellations(user_id, since)
                .await?,
        );
        self.cache.insert(user_id, records.clone()).await;

        Ok(records)
    }

    /// Returns the leads with the user's penalties applied. Without recent
    /// penalties the input comes back untouched.
    pub async fn adjust(
        &self,
        leads: Vec<ScoredLead>,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredLead>, AppError> {
        let penalties = self.recent_penalties(user_id, now).await?;
        if penalties.is_empty() {
            return Ok(leads);
        }

        let adjustments = derive_adjustments(&penalties);
        tracing::debug!(
            "User {} has {} penalty record(s) -> {} adjustment(s)",
            user_id,
            penalties.len(),
            adjustments.len()
        );

        Ok(apply_adjustments(leads, &adjustments))
    }
}
