use std::collections::HashMap;
use thiserror::Error;

use crate::ingest::consumer::DEFAULT_SUBJECT_PREFIX;

/// Service configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub nats_url: String,
    pub nats_subject_prefix: String,
    /// Disable to run API-only, without the stream consumer.
    pub consumer_enabled: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let nats_url = env_map
            .get("NATS_URL")
            .cloned()
            .unwrap_or_else(|| "nats://localhost:4222".to_string());

        let nats_subject_prefix = env_map
            .get("NATS_SUBJECT_PREFIX")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SUBJECT_PREFIX.to_string());
        if !nats_subject_prefix.ends_with('.') {
            return Err(ConfigError::InvalidValue(
                "NATS_SUBJECT_PREFIX".to_string(),
                "must end with '.'".to_string(),
            ));
        }

        let consumer_enabled = match env_map
            .get("CONSUMER_ENABLED")
            .map(|s| s.as_str())
            .unwrap_or("true")
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "CONSUMER_ENABLED".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        Ok(Config {
            port,
            database_path,
            nats_url,
            nats_subject_prefix,
            consumer_enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/ledger.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.nats_url, "nats://localhost:4222");
        assert_eq!(config.nats_subject_prefix, "ledger.trades.");
        assert!(config.consumer_enabled);
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_subject_prefix_must_end_with_dot() {
        let mut env_map = setup_required_env();
        env_map.insert(
            "NATS_SUBJECT_PREFIX".to_string(),
            "ledger.trades".to_string(),
        );
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "NATS_SUBJECT_PREFIX"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_consumer_toggle() {
        let mut env_map = setup_required_env();
        env_map.insert("CONSUMER_ENABLED".to_string(), "false".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert!(!config.consumer_enabled);

        let mut env_map = setup_required_env();
        env_map.insert("CONSUMER_ENABLED".to_string(), "maybe".to_string());
        assert!(Config::from_env_map(env_map).is_err());
    }
}
