//! Room orchestrator configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default TTL for per-account distributed locks, in milliseconds.
pub const DEFAULT_ACCOUNT_LOCK_TTL_MS: u64 = 60_000;

/// Upper bound on the account lock TTL. A lock held longer than this would
/// starve the pool after an allocator crash.
pub const MAX_ACCOUNT_LOCK_TTL_MS: u64 = 600_000;

/// Default meeting duration in minutes, used when the session's scheduled
/// window is degenerate or non-positive.
pub const DEFAULT_MEETING_MINUTES: i64 = 45;

/// Default orchestrator instance ID prefix.
pub const DEFAULT_ORCHESTRATOR_ID_PREFIX: &str = "orch";

/// Room orchestrator configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Connection URLs are redacted in Debug output to prevent credential leakage.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Redis connection URL (account lock store).
    pub redis_url: String,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Base URL of the external meeting provider API.
    pub provider_base_url: String,

    /// IANA timezone sent with meeting-creation requests (default: "UTC").
    pub provider_timezone: String,

    /// TTL for per-account distributed locks in milliseconds.
    /// A crashed allocation attempt loses its reservation when this lapses.
    pub account_lock_ttl_ms: u64,

    /// Fallback meeting duration in minutes for degenerate session windows.
    pub default_meeting_minutes: i64,

    /// Unique identifier for this orchestrator instance.
    /// Used for audit fields and debugging.
    pub orchestrator_id: String,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("redis_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("provider_base_url", &self.provider_base_url)
            .field("provider_timezone", &self.provider_timezone)
            .field("account_lock_ttl_ms", &self.account_lock_ttl_ms)
            .field("default_meeting_minutes", &self.default_meeting_minutes)
            .field("orchestrator_id", &self.orchestrator_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid account lock TTL configuration: {0}")]
    InvalidLockTtl(String),

    #[error("Invalid default meeting duration configuration: {0}")]
    InvalidMeetingDuration(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let redis_url = vars
            .get("REDIS_URL")
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let provider_base_url = vars
            .get("PROVIDER_BASE_URL")
            .cloned()
            .unwrap_or_else(|| "https://api.meetings.example.com/v2".to_string());

        let provider_timezone = vars
            .get("PROVIDER_TIMEZONE")
            .cloned()
            .unwrap_or_else(|| "UTC".to_string());

        // Parse lock TTL with validation
        let account_lock_ttl_ms = if let Some(value_str) = vars.get("ACCOUNT_LOCK_TTL_MS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidLockTtl(format!(
                    "ACCOUNT_LOCK_TTL_MS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidLockTtl(
                    "ACCOUNT_LOCK_TTL_MS must be greater than 0".to_string(),
                ));
            }

            if value > MAX_ACCOUNT_LOCK_TTL_MS {
                return Err(ConfigError::InvalidLockTtl(format!(
                    "ACCOUNT_LOCK_TTL_MS must not exceed {} ms, got {}",
                    MAX_ACCOUNT_LOCK_TTL_MS, value
                )));
            }

            value
        } else {
            DEFAULT_ACCOUNT_LOCK_TTL_MS
        };

        // Parse default meeting duration with validation
        let default_meeting_minutes = if let Some(value_str) = vars.get("DEFAULT_MEETING_MINUTES") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidMeetingDuration(format!(
                    "DEFAULT_MEETING_MINUTES must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidMeetingDuration(format!(
                    "DEFAULT_MEETING_MINUTES must be positive, got {}",
                    value
                )));
            }

            value
        } else {
            DEFAULT_MEETING_MINUTES
        };

        // Generate orchestrator instance ID
        let orchestrator_id = vars.get("ORCHESTRATOR_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!(
                "{}-{}-{}",
                DEFAULT_ORCHESTRATOR_ID_PREFIX, hostname, short_suffix
            )
        });

        Ok(Config {
            database_url,
            redis_url,
            bind_address,
            provider_base_url,
            provider_timezone,
            account_lock_ttl_ms,
            default_meeting_minutes,
            orchestrator_id,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "DATABASE_URL".to_string(),
            "postgresql://localhost/rooms_test".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let vars = base_vars();

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.database_url, "postgresql://localhost/rooms_test");
        assert_eq!(config.redis_url, "redis://localhost:6379");
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(
            config.provider_base_url,
            "https://api.meetings.example.com/v2"
        );
        assert_eq!(config.provider_timezone, "UTC");
        assert_eq!(config.account_lock_ttl_ms, DEFAULT_ACCOUNT_LOCK_TTL_MS);
        assert_eq!(config.default_meeting_minutes, DEFAULT_MEETING_MINUTES);
        // Instance ID should be auto-generated
        assert!(config.orchestrator_id.starts_with("orch-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("REDIS_URL".to_string(), "redis://cache:6380".to_string());
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert(
            "PROVIDER_BASE_URL".to_string(),
            "https://provider.internal/v2".to_string(),
        );
        vars.insert(
            "PROVIDER_TIMEZONE".to_string(),
            "Europe/Berlin".to_string(),
        );
        vars.insert("ACCOUNT_LOCK_TTL_MS".to_string(), "30000".to_string());
        vars.insert("DEFAULT_MEETING_MINUTES".to_string(), "60".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.redis_url, "redis://cache:6380");
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.provider_base_url, "https://provider.internal/v2");
        assert_eq!(config.provider_timezone, "Europe/Berlin");
        assert_eq!(config.account_lock_ttl_ms, 30000);
        assert_eq!(config.default_meeting_minutes, 60);
    }

    #[test]
    fn test_orchestrator_id_custom_value() {
        let mut vars = base_vars();
        vars.insert("ORCHESTRATOR_ID".to_string(), "orch-custom-001".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.orchestrator_id, "orch-custom-001");
    }

    #[test]
    fn test_from_vars_missing_database_url() {
        let vars = HashMap::new();

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn test_lock_ttl_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("ACCOUNT_LOCK_TTL_MS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidLockTtl(msg)) if msg.contains("must be greater than 0"))
        );
    }

    #[test]
    fn test_lock_ttl_rejects_too_large() {
        let mut vars = base_vars();
        vars.insert("ACCOUNT_LOCK_TTL_MS".to_string(), "600001".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidLockTtl(msg)) if msg.contains("must not exceed 600000"))
        );
    }

    #[test]
    fn test_lock_ttl_accepts_max() {
        let mut vars = base_vars();
        vars.insert("ACCOUNT_LOCK_TTL_MS".to_string(), "600000".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.account_lock_ttl_ms, 600000);
    }

    #[test]
    fn test_lock_ttl_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert("ACCOUNT_LOCK_TTL_MS".to_string(), "one-minute".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidLockTtl(msg)) if msg.contains("must be a valid positive integer"))
        );
    }

    #[test]
    fn test_meeting_duration_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("DEFAULT_MEETING_MINUTES".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidMeetingDuration(msg)) if msg.contains("must be positive"))
        );
    }

    #[test]
    fn test_meeting_duration_rejects_negative() {
        let mut vars = base_vars();
        vars.insert("DEFAULT_MEETING_MINUTES".to_string(), "-45".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidMeetingDuration(msg)) if msg.contains("must be positive"))
        );
    }

    #[test]
    fn test_meeting_duration_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert(
            "DEFAULT_MEETING_MINUTES".to_string(),
            "forty-five".to_string(),
        );

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidMeetingDuration(msg)) if msg.contains("must be a valid integer"))
        );
    }

    #[test]
    fn test_debug_redacts_connection_urls() {
        let mut vars = base_vars();
        vars.insert(
            "REDIS_URL".to_string(),
            "redis://:hunter2@cache:6379".to_string(),
        );
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let debug_output = format!("{:?}", config);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("postgresql://"));
        assert!(!debug_output.contains("hunter2"));
    }
}
