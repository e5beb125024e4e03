//! Runtime configuration for Pulse
//!
//! Settings are read from the environment. Missing external credentials are
//! not fatal at startup: the endpoints that need them report a 4xx instead,
//! so a partially configured instance can still serve analytics.

use crate::error::Result;
use serde::Deserialize;

fn default_database_url() -> String {
    "pulse.db".to_string()
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_reasoning_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_local_utc_offset_hours() -> i32 {
    -8
}

/// Application settings, deserialized from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Path to the libsql database file, or `:memory:`
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_api_host")]
    pub api_host: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// GitHub token for the events API
    #[serde(default)]
    pub gh_token: Option<String>,

    /// Linear API key (GraphQL)
    #[serde(default)]
    pub linear_api_key: Option<String>,

    /// Linear team whose issues are ingested
    #[serde(default)]
    pub linear_team_id: Option<String>,

    /// Anthropic API key for prose reasoning; absent means fallback reasoning
    #[serde(default)]
    pub anthropic_api_key: Option<String>,

    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,

    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,

    /// Fixed offset applied to UTC for the user's local time context.
    /// No DST handling.
    #[serde(default = "default_local_utc_offset_hours")]
    pub local_utc_offset_hours: i32,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let settings: Settings = cfg.try_deserialize()?;
        Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            api_host: default_api_host(),
            api_port: default_api_port(),
            gh_token: None,
            linear_api_key: None,
            linear_team_id: None,
            anthropic_api_key: None,
            reasoning_model: default_reasoning_model(),
            cors_origin: default_cors_origin(),
            local_utc_offset_hours: default_local_utc_offset_hours(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.database_url, "pulse.db");
        assert_eq!(settings.api_port, 8000);
        assert_eq!(settings.local_utc_offset_hours, -8);
        assert!(settings.gh_token.is_none());
    }
}
