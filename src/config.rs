use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DATABASE_URL must be set to a production Postgres instance")]
    MissingDatabaseUrl,

    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Upper bound for each of the refresh cycle's fetches.
    pub fetch_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingDatabaseUrl)?;
        let max_connections = positive(&lookup, "ORACLE_DB_MAX_CONNECTIONS", 5)?;
        let fetch_timeout_secs = positive(&lookup, "ORACLE_FETCH_TIMEOUT_SECS", 15)?;
        let log_level = lookup("ORACLE_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            database: DatabaseConfig {
                url,
                max_connections,
                fetch_timeout: Duration::from_secs(u64::from(fetch_timeout_secs)),
            },
            telemetry: TelemetryConfig { log_level },
        })
    }
}

fn positive<F>(lookup: &F, key: &'static str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<u32>() {
            Ok(parsed) if parsed > 0 => Ok(parsed),
            _ => Err(ConfigError::InvalidNumber { key, value }),
        },
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
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_url_is_set() {
        let config =
            AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/oracle")]))
                .unwrap();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.fetch_timeout, Duration::from_secs(15));
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn missing_url_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingDatabaseUrl);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/oracle"),
            ("ORACLE_DB_MAX_CONNECTIONS", "12"),
            ("ORACLE_FETCH_TIMEOUT_SECS", "3"),
            ("ORACLE_LOG_LEVEL", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.database.max_connections, 12);
        assert_eq!(config.database.fetch_timeout, Duration::from_secs(3));
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let err = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/oracle"),
            ("ORACLE_FETCH_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                key: "ORACLE_FETCH_TIMEOUT_SECS",
                ..
            }
        ));
    }
}
