use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Gates the ML scoring path. When off, every request is scored by rules.
    pub ml_scoring_enabled: bool,
    pub ml_service_url: Option<String>,
    pub ml_timeout_ms: u64,
    /// Gates the CSV export endpoint.
    pub exports_enabled: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let ml_scoring_enabled = parse_flag("ML_SCORING_ENABLED")?;

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            ml_scoring_enabled,
            ml_service_url: match std::env::var("ML_SERVICE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
            {
                Some(url) => Some(validate_http_url("ML_SERVICE_URL", &url)?),
                None if ml_scoring_enabled => {
                    anyhow::bail!("ML_SERVICE_URL is required when ML_SCORING_ENABLED is on")
                }
                None => None,
            },
            ml_timeout_ms: std::env::var("ML_TIMEOUT_MS")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("ML_TIMEOUT_MS must be a number of milliseconds"))?,
            exports_enabled: parse_flag("EXPORTS_ENABLED")?,
            rate_limit_per_second: std::env::var("RATE_LIMIT_PER_SECOND")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_PER_SECOND must be a number"))?,
            rate_limit_burst: std::env::var("RATE_LIMIT_BURST")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_BURST must be a number"))?,
        };

        // Never log the full database URL, it carries credentials
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("ML scoring enabled: {}", config.ml_scoring_enabled);
        if let Some(ref url) = config.ml_service_url {
            tracing::info!("ML service URL configured: {}", url);
        }
        tracing::debug!("Exports enabled: {}", config.exports_enabled);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn ml_timeout(&self) -> Duration {
        Duration::from_millis(self.ml_timeout_ms)
    }
}

/// Reads an on/off environment switch. Unset means off.
fn parse_flag(name: &str) -> anyhow::Result<bool> {
    match std::env::var(name) {
        Ok(raw) => parse_flag_value(&raw)
            .ok_or_else(|| anyhow::anyhow!("{} must be one of 1/0, true/false, yes/no, on/off", name)),
        Err(_) => Ok(false),
    }
}

fn parse_flag_value(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn validate_http_url(name: &str, raw: &str) -> anyhow::Result<String> {
    let parsed =
        url::Url::parse(raw.trim()).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}
