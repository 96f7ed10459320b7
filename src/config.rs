//! Application configuration loaded from environment variables.
//!
//! On Cloud Run all values arrive as plain environment variables; there are
//! no secrets to fetch because Firestore and FCM both authenticate through
//! application default credentials.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// GCP project ID (Firestore database and FCM sender)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Base URL of the FCM HTTP v1 endpoint.
    /// Overridable for tests; defaults to the production endpoint.
    pub fcm_endpoint: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            gcp_project_id: env::var("GCP_PROJECT_ID")
                .map_err(|_| ConfigError::Missing("GCP_PROJECT_ID"))?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            fcm_endpoint: env::var("FCM_ENDPOINT")
                .unwrap_or_else(|_| "https://fcm.googleapis.com".to_string()),
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            fcm_endpoint: "http://localhost:9099".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("GCP_PROJECT_ID", "test-project");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.gcp_project_id, "test-project");
        assert_eq!(config.port, 8080);
        assert_eq!(config.fcm_endpoint, "https://fcm.googleapis.com");
    }
}
