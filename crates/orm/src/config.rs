//! Database configuration
//!
//! Loaded from the environment or assembled with `with_*` setters, then
//! validated before a pool is created.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backends::{detect_backend_from_url, DatabaseBackendType, SqlDialect};
use crate::error::ModelError;

/// Configuration errors raised while loading or validating settings
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

impl From<ConfigError> for ModelError {
    fn from(err: ConfigError) -> Self {
        ModelError::Configuration(err.to_string())
    }
}

/// Connection pool and query-layer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: Option<u64>,
    pub max_lifetime_seconds: Option<u64>,
    pub test_before_acquire: bool,
    /// Default recursion bound for dotted eager-load paths
    pub eager_max_depth: usize,
}

impl DatabaseConfig {
    pub const DEFAULT_EAGER_MAX_DEPTH: usize = 5;

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: Some(600),
            max_lifetime_seconds: Some(1800),
            test_before_acquire: true,
            eager_max_depth: Self::DEFAULT_EAGER_MAX_DEPTH,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = get_env_required("DATABASE_URL")?;
        let mut config = Self::new(url);

        if let Some(value) = get_env_optional("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = parse_value("max_connections", value, "positive integer")?;
        }
        if let Some(value) = get_env_optional("DATABASE_MIN_CONNECTIONS") {
            config.min_connections = parse_value("min_connections", value, "non-negative integer")?;
        }
        if let Some(value) = get_env_optional("DATABASE_ACQUIRE_TIMEOUT") {
            config.acquire_timeout_seconds = parse_value("acquire_timeout_seconds", value, "number of seconds")?;
        }
        let depth = get_env_or_default("ORM_EAGER_MAX_DEPTH", &Self::DEFAULT_EAGER_MAX_DEPTH.to_string());
        config.eager_max_depth = parse_value("eager_max_depth", depth, "positive integer")?;

        config.validate()?;
        Ok(config)
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn with_acquire_timeout(mut self, seconds: u64) -> Self {
        self.acquire_timeout_seconds = seconds;
        self
    }

    pub fn with_idle_timeout(mut self, seconds: Option<u64>) -> Self {
        self.idle_timeout_seconds = seconds;
        self
    }

    pub fn with_max_lifetime(mut self, seconds: Option<u64>) -> Self {
        self.max_lifetime_seconds = seconds;
        self
    }

    pub fn with_test_before_acquire(mut self, enabled: bool) -> Self {
        self.test_before_acquire = enabled;
        self
    }

    pub fn with_eager_max_depth(mut self, depth: usize) -> Self {
        self.eager_max_depth = depth;
        self
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_seconds.map(Duration::from_secs)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_seconds.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "url".to_string(),
                reason: "Database URL cannot be empty".to_string(),
            });
        }

        if self.max_connections == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "max_connections".to_string(),
                reason: "Pool must allow at least one connection".to_string(),
            });
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::ValidationFailed {
                field: "min_connections".to_string(),
                reason: format!(
                    "min_connections ({}) exceeds max_connections ({})",
                    self.min_connections, self.max_connections
                ),
            });
        }

        if self.eager_max_depth == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "eager_max_depth".to_string(),
                reason: "Eager loading depth must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    pub fn backend_type(&self) -> Result<DatabaseBackendType, ModelError> {
        detect_backend_from_url(&self.url)
    }

    pub fn dialect(&self) -> Result<SqlDialect, ModelError> {
        Ok(self.backend_type()?.dialect())
    }
}

fn get_env_required(var: &str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingEnvVar { var: var.to_string() })
}

fn get_env_optional(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

fn get_env_or_default(var: &str, default: &str) -> String {
    get_env_optional(var).unwrap_or_else(|| default.to_string())
}

fn parse_value<T: FromStr>(field: &str, value: String, expected: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        expected: expected.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-wide
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "DATABASE_URL",
            "DATABASE_MAX_CONNECTIONS",
            "DATABASE_MIN_CONNECTIONS",
            "DATABASE_ACQUIRE_TIMEOUT",
            "ORM_EAGER_MAX_DEPTH",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_from_env_requires_url() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let err = DatabaseConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar { ref var } if var == "DATABASE_URL"));
    }

    #[test]
    fn test_from_env_reads_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("DATABASE_URL", "sqlite::memory:");
        env::set_var("DATABASE_MAX_CONNECTIONS", "4");
        env::set_var("ORM_EAGER_MAX_DEPTH", "3");

        let config = DatabaseConfig::from_env().unwrap();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.eager_max_depth, 3);
        assert_eq!(config.backend_type().unwrap(), DatabaseBackendType::SQLite);

        env::set_var("DATABASE_MAX_CONNECTIONS", "many");
        let err = DatabaseConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "max_connections"));
        clear_env();
    }

    #[test]
    fn test_validate() {
        assert!(DatabaseConfig::new("sqlite::memory:").validate().is_ok());
        assert!(DatabaseConfig::new("").validate().is_err());
        assert!(DatabaseConfig::new("sqlite::memory:")
            .with_max_connections(2)
            .with_min_connections(3)
            .validate()
            .is_err());
        assert!(DatabaseConfig::new("sqlite::memory:")
            .with_eager_max_depth(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_error_maps_to_configuration() {
        let err: ModelError = ConfigError::MissingEnvVar { var: "DATABASE_URL".into() }.into();
        assert!(err.is_configuration());
    }
}
