use moka::future::Cache;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use permit_leads_api::config::Config;
use permit_leads_api::db::Database;
use permit_leads_api::handlers::AppState;
use permit_leads_api::ml_client::ModelScoringClient;
use permit_leads_api::router::build_router;

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool, the penalty cache
/// and the optional model client, then serves the Axum app.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "permit_leads_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Cancellation history per user (60 second TTL, 10k max entries)
    let penalty_cache = Cache::builder()
        .time_to_live(Duration::from_secs(60))
        .max_capacity(10_000)
        .build();
    tracing::info!("Penalty cache initialized");

    let ml_client = match (config.ml_scoring_enabled, config.ml_service_url.clone()) {
        (true, Some(url)) => match ModelScoringClient::new(url.clone(), config.ml_timeout()) {
            Ok(client) => {
                tracing::info!("✓ Model client initialized: {}", url);
                Some(client)
            }
            Err(e) => {
                tracing::error!("Failed to initialize model client, using rules only: {}", e);
                None
            }
        },
        _ => {
            tracing::info!("ML scoring disabled, leads are scored by rules");
            None
        }
    };

    let app_state = Arc::new(AppState {
        db: db.pool.clone(),
        config: config.clone(),
        ml_client,
        penalty_cache,
    });

    let app = build_router(app_state, true)?;

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Peer address is the rate limiter's fallback key when no proxy headers are present
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
