//! Script to create leads for stored permits that never got one.

use chrono::Utc;
use dotenvy::dotenv;
use std::env;

use permit_leads_api::db::Database;
use permit_leads_api::db_storage::{LeadStorage, PermitStorage};
use permit_leads_api::ingest::lead_from_permit;

/// Main entry point for the backfill script.
///
/// Walks permits without a lead in batches, oldest first, and inserts the
/// derived lead. Permits whose canonical id already belongs to another lead
/// are counted as duplicates and skipped.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt::init();

    let database_url = env::var("DATABASE_URL")
        .or_else(|_| env::var("DB_URL"))
        .map_err(|_| anyhow::anyhow!("DATABASE_URL or DB_URL must be set"))?;
    let batch_size: i64 = env::var("BACKFILL_BATCH_SIZE")
        .unwrap_or_else(|_| "500".to_string())
        .parse()
        .map_err(|_| anyhow::anyhow!("BACKFILL_BATCH_SIZE must be a number"))?;

    let db = Database::new(&database_url).await?;
    let permits = PermitStorage::new(db.pool.clone());
    let leads = LeadStorage::new(db.pool.clone());

    tracing::info!("Connected to database. Starting lead backfill...");

    let mut created = 0usize;
    let mut duplicates = 0usize;

    loop {
        // Created permits leave the result set, duplicates stay, so skip past them
        let batch = permits
            .permits_without_leads_from(duplicates as i64, batch_size)
            .await?;
        if batch.is_empty() {
            break;
        }

        for permit in &batch {
            let new_lead = lead_from_permit(permit, Utc::now());
            match leads.insert_lead(&new_lead).await {
                Ok((_, true)) => created += 1,
                Ok((existing, false)) => {
                    tracing::debug!(
                        "Permit {} maps to existing lead {} ({})",
                        permit.id,
                        existing.id,
                        existing.external_permit_id
                    );
                    duplicates += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to create lead for permit {}: {}", permit.id, e);
                    duplicates += 1;
                }
            }
        }

        tracing::info!("Progress: {} created, {} skipped", created, duplicates);
    }

    tracing::info!(
        "Backfill complete. Created {} lead(s), skipped {} permit(s).",
        created,
        duplicates
    );

    Ok(())
}
