use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::handlers::{self, AppState};

/// Maximum request payload (5MB).
const BODY_LIMIT_BYTES: usize = 5 * 1024 * 1024;

/// Builds the HTTP application.
///
/// With `rate_limited`, API routes get per-IP rate limiting from the config.
/// The health check is never rate limited.
pub fn build_router(state: Arc<AppState>, rate_limited: bool) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/api/v1/score-leads", post(handlers::score_leads))
        .route("/api/v1/feedback", post(handlers::submit_feedback))
        .route("/api/v1/permits", post(handlers::ingest_permit))
        .route(
            "/api/v1/leads",
            get(handlers::list_leads).post(handlers::create_lead),
        )
        .route("/api/v1/leads/export", get(handlers::export_leads))
        .route("/api/v1/leads/:id", get(handlers::get_lead))
        .route(
            "/api/v1/leads/:id/status",
            patch(handlers::update_lead_status),
        )
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES));

    let api_routes = if rate_limited {
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(state.config.rate_limit_per_second)
                .burst_size(state.config.rate_limit_burst)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?,
        );
        api_routes.layer(ServiceBuilder::new().layer(GovernorLayer {
            config: governor_conf,
        }))
    } else {
        api_routes
    };

    Ok(Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()))
}
