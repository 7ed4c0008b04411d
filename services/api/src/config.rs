//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Without a database every store lives in process memory.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub content_path: PathBuf,
    pub practice_session_size: usize,
    pub db_max_connections: u32,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let db_max_connections = parse_number(&lookup, "DB_MAX_CONNECTIONS", 5u32)?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Content and Session Settings ---
        let content_path = lookup("CONTENT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./content"));

        let practice_session_size = parse_number(&lookup, "PRACTICE_SESSION_SIZE", 5usize)?;
        if practice_session_size == 0 {
            return Err(ConfigError::InvalidValue(
                "PRACTICE_SESSION_SIZE".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            content_path,
            practice_session_size,
            db_max_connections,
            cors_origin,
        })
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert!(config.database_url.is_none());
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.content_path, PathBuf::from("./content"));
        assert_eq!(config.practice_session_size, 5);
        assert_eq!(config.db_max_connections, 5);
    }

    #[test]
    fn values_are_read_from_the_source() {
        let config = config_from(&[
            ("BIND_ADDRESS", "127.0.0.1:8080"),
            ("DATABASE_URL", "postgres://localhost/dictation"),
            ("RUST_LOG", "debug"),
            ("PRACTICE_SESSION_SIZE", "10"),
            ("CONTENT_PATH", "/srv/content"),
        ])
        .unwrap();
        assert_eq!(config.bind_address.port(), 8080);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/dictation")
        );
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.practice_session_size, 10);
        assert_eq!(config.content_path, PathBuf::from("/srv/content"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("BIND_ADDRESS", "nowhere")]),
            Err(ConfigError::InvalidValue(key, _)) if key == "BIND_ADDRESS"
        ));
        assert!(matches!(
            config_from(&[("PRACTICE_SESSION_SIZE", "0")]),
            Err(ConfigError::InvalidValue(key, _)) if key == "PRACTICE_SESSION_SIZE"
        ));
        assert!(matches!(
            config_from(&[("DB_MAX_CONNECTIONS", "many")]),
            Err(ConfigError::InvalidValue(key, _)) if key == "DB_MAX_CONNECTIONS"
        ));
        assert!(config_from(&[("RUST_LOG", "chatty")]).is_err());
    }

    #[test]
    fn blank_database_url_means_in_memory() {
        let config = config_from(&[("DATABASE_URL", "  ")]).unwrap();
        assert!(config.database_url.is_none());
    }
}
