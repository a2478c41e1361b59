//! Environment configuration and fixed timing constants.

use anyhow::{Result, anyhow};
use std::str::FromStr;
use std::time::Duration;

pub const API_BASE_URL_VAR: &str = "TELEGO_API_BASE_URL";
pub const MAPS_API_KEY_VAR: &str = "GOOGLE_MAPS_API_KEY";
pub const INIT_DATA_VAR: &str = "TELEGO_INIT_DATA";
pub const ENV_VAR: &str = "TELEGO_ENV";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Local,
    Production,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "local" => Ok(Environment::Local),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(anyhow!("unknown environment '{other}'")),
        }
    }
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Periods of every timer in the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub geosim_tick: Duration,
    pub offer_poll: Duration,
    pub active_ride_poll: Duration,
    pub snapshot_poll: Duration,
    pub position_report: Duration,
    pub http_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            geosim_tick: Duration::from_millis(1000),
            offer_poll: Duration::from_secs(3),
            active_ride_poll: Duration::from_secs(5),
            snapshot_poll: Duration::from_secs(3),
            position_report: Duration::from_secs(3),
            http_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_base_url: String,
    pub maps_api_key: String,
    /// Telegram init data, sent as `Authorization: tma <init data>`.
    pub init_data: Option<String>,
    pub environment: Environment,
    pub timings: Timings,
}

impl AppConfig {
    /// Telegram init data for backend calls. Production refuses to run
    /// without it; other environments go on unauthenticated.
    pub fn backend_init_data(&self) -> Result<Option<&str>> {
        match self.init_data.as_deref() {
            None if self.environment.is_production() => {
                Err(anyhow!("{INIT_DATA_VAR} is required in production"))
            }
            init_data => Ok(init_data),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. All missing
    /// required variables are reported together.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_base_url = get(API_BASE_URL_VAR);
        let maps_api_key = get(MAPS_API_KEY_VAR);
        let missing: Vec<&str> = [(API_BASE_URL_VAR, &api_base_url), (MAPS_API_KEY_VAR, &maps_api_key)]
            .into_iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k)
            .collect();

        let (Some(api_base_url), Some(maps_api_key)) = (api_base_url, maps_api_key) else {
            return Err(anyhow!("missing environment variables: {}", missing.join(", ")));
        };

        let environment = match get(ENV_VAR) {
            Some(v) => v.parse()?,
            None => {
                tracing::trace!("{ENV_VAR} not set, using development");
                Environment::default()
            }
        };

        Ok(Self {
            api_base_url,
            maps_api_key,
            init_data: get(INIT_DATA_VAR),
            environment,
            timings: Timings::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_reports_all_missing_variables() {
        let err = AppConfig::from_lookup(lookup(&[(INIT_DATA_VAR, "x")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing environment variables: TELEGO_API_BASE_URL, GOOGLE_MAPS_API_KEY"
        );
    }

    #[test]
    fn test_blank_counts_as_missing() {
        let err = AppConfig::from_lookup(lookup(&[
            (API_BASE_URL_VAR, "https://api.test"),
            (MAPS_API_KEY_VAR, "   "),
        ]))
        .unwrap_err();
        assert!(err.to_string().ends_with("GOOGLE_MAPS_API_KEY"));
    }

    #[test]
    fn test_full_config() {
        let config = AppConfig::from_lookup(lookup(&[
            (API_BASE_URL_VAR, "https://api.test"),
            (MAPS_API_KEY_VAR, "k"),
            (ENV_VAR, "Production"),
        ]))
        .unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.init_data, None);
        assert_eq!(config.timings.geosim_tick, Duration::from_secs(1));
        assert_eq!(config.timings.http_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_production_requires_init_data() {
        let mut config = AppConfig::from_lookup(lookup(&[
            (API_BASE_URL_VAR, "https://api.test"),
            (MAPS_API_KEY_VAR, "k"),
            (ENV_VAR, "prod"),
        ]))
        .unwrap();
        let err = config.backend_init_data().unwrap_err();
        assert_eq!(err.to_string(), "TELEGO_INIT_DATA is required in production");

        config.init_data = Some("query_id=1".to_string());
        assert_eq!(config.backend_init_data().unwrap(), Some("query_id=1"));
    }

    #[test]
    fn test_development_runs_without_init_data() {
        let config = AppConfig::from_lookup(lookup(&[
            (API_BASE_URL_VAR, "https://api.test"),
            (MAPS_API_KEY_VAR, "k"),
        ]))
        .unwrap();
        assert!(!config.environment.is_production());
        assert_eq!(config.backend_init_data().unwrap(), None);
    }

    #[test]
    fn test_unknown_environment_is_error() {
        assert!("staging".parse::<Environment>().is_err());
    }
}
