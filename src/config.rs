use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub survey: SurveyConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

/// Longest accepted session lifetime, roughly ten years.
pub const MAX_SESSION_TTL_DAYS: i64 = 3650;

/// Respondent sessions, login redirects and the survey status cache
#[derive(Debug, Clone, Deserialize)]
pub struct SurveyConfig {
    pub session_cookie_name: String,
    pub session_ttl_days: i64,
    pub session_purge_interval_minutes: u64,
    pub session_cookie_secure: bool,
    pub login_url: String,
    pub status_cache_max_entries: usize,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            session_cookie_name: "sessionid".to_string(),
            session_ttl_days: 14,
            session_purge_interval_minutes: 60,
            session_cookie_secure: false,
            login_url: "/login".to_string(),
            status_cache_max_entries: 1024,
        }
    }
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn env_lookup(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn parse_bool(lookup: Lookup<'_>, key: &str, default: bool) -> bool {
    lookup(key)
        .and_then(|value| value.parse::<bool>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env_lookup)
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        log_system_event!(config, "Loading application configuration");

        let config = Config {
            database: DatabaseConfig::from_lookup(lookup)?,
            server: ServerConfig::from_lookup(lookup)?,
            logging: LoggingConfig::from_lookup(lookup),
            survey: SurveyConfig::from_lookup(lookup)?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            max_connections = self.database.max_connections,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            log_level = %self.logging.level,
            session_cookie = %self.survey.session_cookie_name,
            login_url = %self.survey.login_url,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.survey.session_ttl_days <= 0 {
            return Err(anyhow!("SESSION_TTL_DAYS must be greater than 0"));
        }

        if self.survey.session_ttl_days > MAX_SESSION_TTL_DAYS {
            return Err(anyhow!(
                "SESSION_TTL_DAYS must be at most {}",
                MAX_SESSION_TTL_DAYS
            ));
        }

        if self.survey.session_purge_interval_minutes == 0 {
            return Err(anyhow!("SESSION_PURGE_INTERVAL_MINUTES must be greater than 0"));
        }

        if self.survey.session_cookie_name.is_empty() {
            return Err(anyhow!("SESSION_COOKIE_NAME must not be empty"));
        }

        if self.survey.status_cache_max_entries == 0 {
            warn!("STATUS_CACHE_MAX_ENTRIES is 0 - survey status will never be cached");
        }

        let base_level = self
            .logging
            .level
            .split(',')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&base_level.as_str()) {
            warn!("Invalid log level '{}', using 'info' as fallback", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        let url = lookup("DATABASE_URL").unwrap_or_else(|| "sqlite:survey.db".to_string());

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(value) => value.parse::<u32>().map_err(|_| {
                anyhow!("Invalid DATABASE_MAX_CONNECTIONS value: '{}'", value)
            })?,
            None => 5,
        };

        Ok(DatabaseConfig { url, max_connections })
    }
}

impl ServerConfig {
    fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        let port_str = lookup("PORT").unwrap_or_else(|| "3000".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str)
        })?;

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl LoggingConfig {
    fn from_lookup(lookup: Lookup<'_>) -> Self {
        LoggingConfig {
            level: lookup("RUST_LOG").unwrap_or_else(|| "info,survey_tool=debug".to_string()),
            file_enabled: parse_bool(lookup, "LOG_FILE_ENABLED", true),
            console_enabled: parse_bool(lookup, "LOG_CONSOLE_ENABLED", true),
            log_directory: lookup("LOG_DIRECTORY").unwrap_or_else(|| "logs".to_string()),
        }
    }
}

impl SurveyConfig {
    fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        let defaults = SurveyConfig::default();

        let session_ttl_days = match lookup("SESSION_TTL_DAYS") {
            Some(value) => value
                .parse::<i64>()
                .map_err(|_| anyhow!("Invalid SESSION_TTL_DAYS value: '{}'", value))?,
            None => defaults.session_ttl_days,
        };

        let session_purge_interval_minutes = match lookup("SESSION_PURGE_INTERVAL_MINUTES") {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| anyhow!("Invalid SESSION_PURGE_INTERVAL_MINUTES value: '{}'", value))?,
            None => defaults.session_purge_interval_minutes,
        };

        let status_cache_max_entries = match lookup("STATUS_CACHE_MAX_ENTRIES") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| anyhow!("Invalid STATUS_CACHE_MAX_ENTRIES value: '{}'", value))?,
            None => defaults.status_cache_max_entries,
        };

        Ok(SurveyConfig {
            session_cookie_name: lookup("SESSION_COOKIE_NAME")
                .unwrap_or(defaults.session_cookie_name),
            session_ttl_days,
            session_purge_interval_minutes,
            session_cookie_secure: parse_bool(
                lookup,
                "SESSION_COOKIE_SECURE",
                defaults.session_cookie_secure,
            ),
            login_url: lookup("LOGIN_URL").unwrap_or(defaults.login_url),
            status_cache_max_entries,
        })
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    if data.len() <= 8 {
        "*".repeat(data.len())
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sqlite:survey.db"), "sqli***y.db");
    }

    #[test]
    fn test_defaults() {
        let lookup = lookup_from(&[]);
        let config = Config::from_lookup(&lookup).unwrap();

        assert_eq!(config.database.url, "sqlite:survey.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.survey.session_cookie_name, "sessionid");
        assert_eq!(config.survey.session_ttl_days, 14);
        assert_eq!(config.survey.session_purge_interval_minutes, 60);
        assert_eq!(config.survey.login_url, "/login");
        assert!(config.logging.file_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let lookup = lookup_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("PORT", "8080"),
            ("SESSION_COOKIE_NAME", "survey_session"),
            ("SESSION_COOKIE_SECURE", "true"),
            ("LOGIN_URL", "/accounts/login/"),
            ("LOG_FILE_ENABLED", "false"),
            ("STATUS_CACHE_MAX_ENTRIES", "16"),
        ]);
        let config = Config::from_lookup(&lookup).unwrap();

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.server.address(), "0.0.0.0:8080");
        assert_eq!(config.survey.session_cookie_name, "survey_session");
        assert!(config.survey.session_cookie_secure);
        assert_eq!(config.survey.login_url, "/accounts/login/");
        assert!(!config.logging.file_enabled);
        assert_eq!(config.survey.status_cache_max_entries, 16);
    }

    #[test]
    fn test_invalid_port_parsing() {
        let lookup = lookup_from(&[("PORT", "not-a-number")]);
        assert!(Config::from_lookup(&lookup).is_err());
    }

    #[test]
    fn test_config_validation() {
        let lookup = lookup_from(&[]);
        let config = Config::from_lookup(&lookup).unwrap();

        let mut invalid = config.clone();
        invalid.server.port = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.database.url = "postgres://localhost/survey".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.survey.session_ttl_days = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.survey.session_purge_interval_minutes = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_session_ttl_upper_bound() {
        let lookup = lookup_from(&[("SESSION_TTL_DAYS", "9223372036854775807")]);
        let config = Config::from_lookup(&lookup).unwrap();
        assert!(config.validate().is_err());

        let limit = MAX_SESSION_TTL_DAYS.to_string();
        let lookup = lookup_from(&[("SESSION_TTL_DAYS", limit.as_str())]);
        let config = Config::from_lookup(&lookup).unwrap();
        assert!(config.validate().is_ok());
    }
}
