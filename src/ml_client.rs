use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use failsafe::futures::CircuitBreaker;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::circuit_breaker::{create_ml_circuit_breaker, MlCircuitBreaker};
use crate::errors::AppError;
use crate::models::{LeadInput, ScoreLabel, ScoreLeadsResponse, ScoredLead, ScoringMethod};
use crate::scoring::{score_with_rules, MAX_SCORE};

/// Engineered features sent to the model for one lead.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelFeatures {
    /// Position of the lead in the request, echoed back by the model.
    pub index: usize,
    pub estimated_deal_value: f64,
    pub feedback_age_days: i64,
    pub is_weekend: bool,
    pub hour_of_day: u32,
    pub is_business_hours: bool,
    pub has_contact_issue: bool,
    pub has_qualification_issue: bool,
}

impl ModelFeatures {
    pub fn from_lead(index: usize, lead: &LeadInput, now: DateTime<Utc>) -> Self {
        let reference = lead.created_at.unwrap_or(now);
        let feedback_age_days = lead
            .last_feedback_at
            .or(lead.created_at)
            .map(|at| (now - at).num_days().max(0))
            .unwrap_or(0);
        let hour_of_day = reference.hour();

        Self {
            index,
            estimated_deal_value: lead.estimated_value().unwrap_or(0.0),
            feedback_age_days,
            is_weekend: matches!(reference.weekday(), Weekday::Sat | Weekday::Sun),
            hour_of_day,
            is_business_hours: (9..17).contains(&hour_of_day),
            has_contact_issue: lead.has_contact_issue,
            has_qualification_issue: lead.has_qualification_issue,
        }
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    leads: Vec<ModelFeatures>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    index: usize,
    win_probability: f64,
    /// 0-100 score from the calibration layer; derived from the probability
    /// when the model omits it.
    #[serde(default)]
    calibrated_score: Option<f64>,
}

/// Client for the external model-serving process.
#[derive(Clone)]
pub struct ModelScoringClient {
    client: reqwest::Client,
    base_url: String,
    breaker: MlCircuitBreaker,
}

impl ModelScoringClient {
    /// Creates a new `ModelScoringClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Root URL of the inference service (no trailing slash).
    /// * `timeout` - Upper bound for a whole inference request.
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create model client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            breaker: create_ml_circuit_breaker(),
        })
    }

    /// Scores leads with the model.
    ///
    /// Fails on transport errors, timeouts, non-2xx responses, unparseable
    /// bodies, missing predictions and while the circuit is open.
    pub async fn score_leads(
        &self,
        leads: &[LeadInput],
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredLead>, AppError> {
        let request = PredictRequest {
            leads: leads
                .iter()
                .enumerate()
                .map(|(index, lead)| ModelFeatures::from_lead(index, lead, now))
                .collect(),
        };

        let response = self
            .breaker
            .call(self.predict(&request))
            .await
            .map_err(|e| match e {
                failsafe::Error::Rejected => {
                    AppError::ExternalApiError("Model circuit breaker is open".to_string())
                }
                failsafe::Error::Inner(inner) => inner,
            })?;

        merge_predictions(leads, response)
    }

    async fn predict(&self, request: &PredictRequest) -> Result<PredictResponse, AppError> {
        let url = format!("{}/predict", self.base_url);
        tracing::debug!("Requesting {} model predictions from {}", request.leads.len(), url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Model request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Model service returned {}: {}",
                status, error_text
            )));
        }

        response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse model response: {}", e))
        })
    }
}

fn merge_predictions(
    leads: &[LeadInput],
    response: PredictResponse,
) -> Result<Vec<ScoredLead>, AppError> {
    let mut slots: Vec<Option<Prediction>> = leads.iter().map(|_| None).collect();

    for prediction in response.predictions {
        let slot = slots.get_mut(prediction.index).ok_or_else(|| {
            AppError::ExternalApiError(format!(
                "Model returned prediction for unknown index {}",
                prediction.index
            ))
        })?;
        if !prediction.win_probability.is_finite() {
            return Err(AppError::ExternalApiError(format!(
                "Model returned non-numeric probability for index {}",
                prediction.index
            )));
        }
        *slot = Some(prediction);
    }

    leads
        .iter()
        .zip(slots)
        .enumerate()
        .map(|(index, (lead, slot))| {
            let prediction = slot.ok_or_else(|| {
                AppError::ExternalApiError(format!("Model omitted prediction for index {}", index))
            })?;
            let probability = prediction.win_probability.clamp(0.0, 1.0);
            let score = prediction
                .calibrated_score
                .filter(|s| s.is_finite())
                .unwrap_or(probability * 100.0)
                .round()
                .clamp(0.0, MAX_SCORE as f64) as i32;

            Ok(ScoredLead {
                lead: lead.clone(),
                score,
                score_label: ScoreLabel::from_score(score),
                factors: None,
                win_probability: Some(probability),
            })
        })
        .collect()
}

/// Scores with the model, falling back to the rule scorer on any model error.
///
/// Always completes: the returned `method` says which scorer produced the data.
pub async fn score_with_fallback(
    client: &ModelScoringClient,
    leads: &[LeadInput],
    now: DateTime<Utc>,
) -> ScoreLeadsResponse {
    client
        .score_leads(leads, now)
        .await
        .map(|data| ScoreLeadsResponse {
            method: ScoringMethod::Ml,
            data,
        })
        .unwrap_or_else(|e| {
            tracing::warn!("Model scoring failed, falling back to rules: {}", e);
            ScoreLeadsResponse {
                method: ScoringMethod::Rules,
                data: score_with_rules(leads, now),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_feature_engineering() {
        // 2026-10-17 is a Saturday
        let created = Utc.with_ymd_and_hms(2026, 10, 17, 10, 15, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 20, 8, 0, 0).unwrap();
        let lead = LeadInput {
            created_at: Some(created),
            value: Some(42_000.0),
            has_contact_issue: true,
            ..Default::default()
        };

        let features = ModelFeatures::from_lead(3, &lead, now);

        assert_eq!(features.index, 3);
        assert_eq!(features.estimated_deal_value, 42_000.0);
        assert_eq!(features.feedback_age_days, 2);
        assert!(features.is_weekend);
        assert_eq!(features.hour_of_day, 10);
        assert!(features.is_business_hours);
        assert!(features.has_contact_issue);
        assert!(!features.has_qualification_issue);
    }

    #[test]
    fn test_merge_orders_by_index() {
        let leads = vec![
            LeadInput {
                name: Some("first".into()),
                ..Default::default()
            },
            LeadInput {
                name: Some("second".into()),
                ..Default::default()
            },
        ];
        let response = PredictResponse {
            predictions: vec![
                Prediction {
                    index: 1,
                    win_probability: 0.2,
                    calibrated_score: None,
                },
                Prediction {
                    index: 0,
                    win_probability: 0.9,
                    calibrated_score: Some(87.4),
                },
            ],
        };

        let scored = merge_predictions(&leads, response).unwrap();

        assert_eq!(scored[0].lead.name.as_deref(), Some("first"));
        assert_eq!(scored[0].score, 87);
        assert_eq!(scored[0].score_label, ScoreLabel::Hot);
        assert_eq!(scored[1].score, 20);
        assert_eq!(scored[1].win_probability, Some(0.2));
    }

    #[test]
    fn test_merge_rejects_missing_prediction() {
        let leads = vec![LeadInput::default(), LeadInput::default()];
        let response = PredictResponse {
            predictions: vec![Prediction {
                index: 0,
                win_probability: 0.5,
                calibrated_score: None,
            }],
        };

        assert!(merge_predictions(&leads, response).is_err());
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client =
            ModelScoringClient::new("https://example.com/".to_string(), Duration::from_secs(1));
        assert!(client.is_ok());
    }
}
