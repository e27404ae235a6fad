//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;

/// Where snapshots and the activity log live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process maps; local development and tests
    Memory,
    Firestore,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "firestore" => Ok(Self::Firestore),
            other => Err(ConfigError::Invalid("STORE_BACKEND", other.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Shared secret the scheduler presents in `x-ops-token`
    pub ops_token: String,
    pub store_backend: StoreBackend,
    /// GCP project ID (Firestore backend only)
    pub gcp_project_id: String,
    /// Optional JSON file with scoring weights
    pub scoring_config_path: Option<String>,

    // --- Engine tuning ---
    /// Entities aggregated or ranked in parallel
    pub aggregation_concurrency: usize,
    /// Days of recent activity fed to the scoring function
    pub scoring_window_days: u32,
    pub streak_max_retries: u32,
    pub default_weekly_goal: u32,
    /// Activities shorter than this do not count toward streaks
    pub min_qualifying_duration_secs: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let store_backend: StoreBackend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .parse()?;

        let gcp_project_id = match store_backend {
            StoreBackend::Firestore => {
                env::var("GCP_PROJECT_ID").map_err(|_| ConfigError::Missing("GCP_PROJECT_ID"))?
            }
            StoreBackend::Memory => {
                env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string())
            }
        };

        Ok(Self {
            port: parse_or("PORT", 8080)?,
            ops_token: env::var("OPS_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("OPS_TOKEN"))?,
            store_backend,
            gcp_project_id,
            scoring_config_path: env::var("SCORING_CONFIG_PATH").ok(),
            aggregation_concurrency: parse_or("AGGREGATION_CONCURRENCY", 16)?,
            scoring_window_days: parse_or("SCORING_WINDOW_DAYS", 28)?,
            streak_max_retries: parse_or("STREAK_MAX_RETRIES", 5)?,
            default_weekly_goal: parse_or("DEFAULT_WEEKLY_GOAL", 3)?,
            min_qualifying_duration_secs: parse_or("MIN_QUALIFYING_DURATION_SECS", 0)?,
        })
    }

    /// Config for tests: memory backend, fixed ops token.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            ops_token: "test_ops_token".to_string(),
            store_backend: StoreBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            scoring_config_path: None,
            aggregation_concurrency: 4,
            scoring_window_days: 28,
            streak_max_retries: 5,
            default_weekly_goal: 3,
            min_qualifying_duration_secs: 0,
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("OPS_TOKEN", " ops-secret ");
        env::set_var("SCORING_WINDOW_DAYS", "14");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.ops_token, "ops-secret");
        assert_eq!(config.scoring_window_days, 14);
        assert_eq!(config.streak_max_retries, 5);
        assert_eq!(config.store_backend, StoreBackend::Memory);

        env::remove_var("SCORING_WINDOW_DAYS");
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("Firestore".parse::<StoreBackend>().unwrap(), StoreBackend::Firestore);
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!(matches!(
            "postgres".parse::<StoreBackend>(),
            Err(ConfigError::Invalid("STORE_BACKEND", _))
        ));
    }
}
