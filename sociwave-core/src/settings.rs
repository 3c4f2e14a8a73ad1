//! Daemon settings loaded from a TOML file with environment overrides.
//!
//! Every field has a default so the daemon can start with no settings file
//! at all; the Facebook credentials themselves live in the config store.

use crate::{AppConfig, ConfigError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const MIN_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_INTERVAL_SECS: u64 = 5 * 60;
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite connection string.
    /// Env: `SOCIWAVE_DATABASE_URL`
    pub database_url: String,

    /// `tracing` filter directive used when `RUST_LOG` is unset.
    /// Env: `SOCIWAVE_LOG`
    pub log_filter: String,

    pub monitoring: MonitoringSettings,

    pub graph: GraphSettings,

    /// Optional page configuration written to the config store at startup.
    pub facebook: Option<AppConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    /// Env: `SOCIWAVE_INTERVAL_SECS`
    pub interval_secs: u64,
    pub dedup_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub base_url: String,
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Calls allowed per rate-limit window.
    pub max_requests: u32,
    pub window_secs: u64,
    pub burst_allowance: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://sociwave.db".to_string(),
            log_filter: "sociwave=info,monitor_service=info,graph_client=info,database=info"
                .to_string(),
            monitoring: MonitoringSettings::default(),
            graph: GraphSettings::default(),
            facebook: None,
        }
    }
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            base_url: "https://graph.facebook.com".to_string(),
            user_agent: concat!("sociwave/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            max_requests: 600,
            window_secs: 3600,
            burst_allowance: 50,
        }
    }
}

impl MonitoringSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl GraphSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Settings {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads `path` if given, otherwise starts from defaults, then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => {
                let contents =
                    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
                        path: path.display().to_string(),
                    })?;
                toml::from_str(&contents)?
            }
            None => Settings::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SOCIWAVE_DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(filter) = lookup("SOCIWAVE_LOG") {
            self.log_filter = filter;
        }
        if let Some(raw) = lookup("SOCIWAVE_INTERVAL_SECS") {
            self.monitoring.interval_secs =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        field: "SOCIWAVE_INTERVAL_SECS".to_string(),
                        value: raw.clone(),
                    })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "database_url".to_string(),
            });
        }
        if self.monitoring.interval_secs < MIN_INTERVAL_SECS {
            return Err(ConfigError::InvalidValue {
                field: "monitoring.interval_secs".to_string(),
                value: self.monitoring.interval_secs.to_string(),
            });
        }
        if self.graph.max_requests == 0 || self.graph.window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "graph.max_requests".to_string(),
                value: format!("{}/{}s", self.graph.max_requests, self.graph.window_secs),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.monitoring.interval(), Duration::from_secs(300));
        assert!(settings.facebook.is_none());
    }

    #[test]
    fn test_parse_partial_file() {
        let settings = Settings::from_toml_str(
            r#"
            database_url = "sqlite::memory:"

            [monitoring]
            interval_secs = 120

            [facebook]
            access_token = "token"
            page_id = "1234"
            reels_limit = 10
            "#,
        )
        .unwrap();

        assert_eq!(settings.database_url, "sqlite::memory:");
        assert_eq!(settings.monitoring.interval_secs, 120);
        assert_eq!(
            settings.monitoring.dedup_capacity,
            DEFAULT_DEDUP_CAPACITY
        );
        let facebook = settings.facebook.unwrap();
        assert_eq!(facebook.page_id, "1234");
        assert_eq!(facebook.reels_limit, 10);
        assert_eq!(facebook.comments_limit, 100);
        assert_eq!(facebook.api_version, "v20.0");
    }

    #[test]
    fn test_interval_below_floor_rejected() {
        let result = Settings::from_toml_str("[monitoring]\ninterval_secs = 30\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SOCIWAVE_DATABASE_URL", "sqlite://other.db"),
            ("SOCIWAVE_INTERVAL_SECS", "600"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.database_url, "sqlite://other.db");
        assert_eq!(settings.monitoring.interval_secs, 600);

        let result = settings.apply_overrides(|key| {
            (key == "SOCIWAVE_INTERVAL_SECS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = Settings::load(Some(Path::new("/nonexistent/sociwave.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }
}
