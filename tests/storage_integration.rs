use chrono::{Duration, Utc};
use std::env;
use uuid::Uuid;

use permit_leads_api::core::ingest::lead_from_permit;
use permit_leads_api::core::models::{FeedbackOutcome, FeedbackRequest, PermitPayload};
use permit_leads_api::db::Database;
use permit_leads_api::db_storage::{LeadStorage, OutcomeStorage, PermitStorage, ScoreWrite};

/// Connects to the database named by TEST_DATABASE_URL (or DATABASE_URL).
async fn connect() -> anyhow::Result<Database> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    Database::new(&db_url).await
}

fn payload(record_id: &str) -> anyhow::Result<PermitPayload> {
    Ok(serde_json::from_value(serde_json::json!({
        "source": "storage-test",
        "source_record_id": record_id,
        "permit_number": format!("ST-{}", record_id),
        "work_description": "Reroof single family residence",
        "valuation": 18500.0,
        "owner_name": "Jane Doe",
        "city": "Austin",
        "zip_code": "78701"
    }))?)
}

/// Re-ingesting the same source record keeps one permit and one lead.
/// Marked ignored so it only runs against a scratch database; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn permit_ingestion_is_idempotent() -> anyhow::Result<()> {
    let db = connect().await?;
    let permits = PermitStorage::new(db.pool.clone());
    let leads = LeadStorage::new(db.pool.clone());
    let record_id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let first = permits
        .upsert_permit(&payload(&record_id)?.into_permit(Uuid::new_v4(), now))
        .await?;
    let (lead, created) = leads.insert_lead(&lead_from_permit(&first, now)).await?;
    assert!(created);
    assert_eq!(lead.external_permit_id, format!("ST-{}", record_id));
    assert_eq!(lead.service, "Roofing");

    let second = permits
        .upsert_permit(&payload(&record_id)?.into_permit(Uuid::new_v4(), now))
        .await?;
    assert_eq!(second.id, first.id);
    assert!(second.updated_at.is_some());

    let (again, created) = leads.insert_lead(&lead_from_permit(&second, now)).await?;
    assert!(!created);
    assert_eq!(again.id, lead.id);

    Ok(())
}

/// The latest scoring write wins for a lead's outcome row.
#[tokio::test]
#[ignore]
async fn outcome_upsert_keeps_latest_score() -> anyhow::Result<()> {
    let db = connect().await?;
    let permits = PermitStorage::new(db.pool.clone());
    let leads = LeadStorage::new(db.pool.clone());
    let outcomes = OutcomeStorage::new(db.pool.clone());
    let now = Utc::now();

    let permit = permits
        .upsert_permit(&payload(&Uuid::new_v4().to_string())?.into_permit(Uuid::new_v4(), now))
        .await?;
    let (lead, _) = leads.insert_lead(&lead_from_permit(&permit, now)).await?;

    outcomes.upsert_outcome(lead.id, 40, None, now).await?;
    outcomes
        .upsert_outcome(lead.id, 85, Some(0.85), now + Duration::seconds(5))
        .await?;

    let outcome = outcomes
        .get_outcome(lead.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("outcome row missing"))?;
    assert_eq!(outcome.calibrated_score, 85);
    assert_eq!(outcome.win_probability, Some(0.85));

    let stored = leads
        .get_lead(lead.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("lead missing"))?;
    assert_eq!(stored.lead_score, 85);
    assert_eq!(stored.score_label, "Hot");

    outcomes
        .record_feedback(&FeedbackRequest {
            lead_id: lead.id,
            user_id: None,
            rating: 5,
            outcome: Some(FeedbackOutcome::Won),
            notes: Some("Signed contract".to_string()),
        })
        .await?;

    let outcome = outcomes
        .get_outcome(lead.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("outcome row missing"))?;
    assert_eq!(outcome.win_label, Some(true));

    Ok(())
}

/// A batch with a repeated id keeps its last entry and skips ids without a lead.
#[tokio::test]
#[ignore]
async fn batched_outcomes_keep_last_entry_per_lead() -> anyhow::Result<()> {
    let db = connect().await?;
    let permits = PermitStorage::new(db.pool.clone());
    let leads = LeadStorage::new(db.pool.clone());
    let outcomes = OutcomeStorage::new(db.pool.clone());
    let now = Utc::now();

    let permit = permits
        .upsert_permit(&payload(&Uuid::new_v4().to_string())?.into_permit(Uuid::new_v4(), now))
        .await?;
    let (lead, _) = leads.insert_lead(&lead_from_permit(&permit, now)).await?;
    let unknown = Uuid::new_v4();

    let written = outcomes
        .upsert_outcomes(
            &[
                ScoreWrite {
                    lead_id: lead.id,
                    score: 30,
                    win_probability: None,
                },
                ScoreWrite {
                    lead_id: unknown,
                    score: 70,
                    win_probability: Some(0.7),
                },
                ScoreWrite {
                    lead_id: lead.id,
                    score: 62,
                    win_probability: Some(0.62),
                },
            ],
            now,
        )
        .await?;
    assert_eq!(written, 1);

    let outcome = outcomes
        .get_outcome(lead.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("outcome row missing"))?;
    assert_eq!(outcome.calibrated_score, 62);
    assert_eq!(outcome.win_probability, Some(0.62));
    assert!(outcomes.get_outcome(unknown).await?.is_none());

    let stored = leads
        .get_lead(lead.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("lead missing"))?;
    assert_eq!(stored.score_label, "Warm");

    Ok(())
}
