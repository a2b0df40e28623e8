//! Environment-backed configuration for the scheduling & accountability core.

use std::env;

use chrono::NaiveTime;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Application configuration loaded from environment variables. Field names
/// mirror the flat `scheduler.*` / `accountability.*` / `srs.*` keys named in
/// the external interfaces section; the `_` separators below stand in for the
/// `.`-separated env var names (`SCHEDULER__QUIET_HOURS_START`, etc.) since
/// dots are awkward in most shells.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection URL for the Store.
    pub database_url: String,
    /// Root directory of the note vault.
    pub vault_root: String,
    /// Address the health/ready/metrics surface binds to.
    pub bind_address: String,
    /// Shared key gating the `/metrics` endpoint. Empty disables the gate.
    pub admin_api_key: String,

    pub quiet_hours_start: NaiveTime,
    pub quiet_hours_end: NaiveTime,

    pub default_check_time: NaiveTime,
    pub default_struggle_threshold: i64,

    pub srs_morning_batch_time: NaiveTime,
    pub srs_morning_batch_size: usize,
    pub srs_morning_batch_max_size: usize,

    pub life_weeks_enabled: bool,

    /// One of `1_month` | `6_months` | `1_year` | `forever`.
    pub retention_default: String,
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults named in the external interfaces section.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env_var("DATABASE_URL")?,
            vault_root: env_var_or("VAULT_ROOT", "./vault"),
            bind_address: env_var_or("BIND_ADDRESS", "0.0.0.0:8090"),
            admin_api_key: env_var_or("ADMIN_API_KEY", ""),

            quiet_hours_start: env_time("SCHEDULER_QUIET_HOURS_START", "22:00")?,
            quiet_hours_end: env_time("SCHEDULER_QUIET_HOURS_END", "07:00")?,

            default_check_time: env_time("ACCOUNTABILITY_DEFAULT_CHECK_TIME", "19:00")?,
            default_struggle_threshold: env_var_or("ACCOUNTABILITY_DEFAULT_STRUGGLE_THRESHOLD", "3")
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue(
                        "ACCOUNTABILITY_DEFAULT_STRUGGLE_THRESHOLD".to_string(),
                        "expected an integer".to_string(),
                    )
                })?,

            srs_morning_batch_time: env_time("SRS_MORNING_BATCH_TIME", "09:00")?,
            srs_morning_batch_size: env_usize("SRS_MORNING_BATCH_SIZE", 5)?,
            srs_morning_batch_max_size: env_usize("SRS_MORNING_BATCH_MAX_SIZE", 20)?,

            life_weeks_enabled: env_var_or("LIFE_WEEKS_ENABLED", "true") == "true",

            retention_default: env_var_or("RETENTION_DEFAULT", "1_year"),
        })
    }
}

fn env_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_time(name: &str, default: &str) -> Result<NaiveTime, ConfigError> {
    let raw = env_var_or(name, default);
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .map_err(|_| ConfigError::InvalidValue(name.to_string(), format!("expected HH:MM, got `{raw}`")))
}

fn env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    let raw = env_var_or(name, &default.to_string());
    raw.parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string(), format!("expected a non-negative integer, got `{raw}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_or_uses_default() {
        let val = env_var_or("NON_EXISTENT_VAR_12345", "default_value");
        assert_eq!(val, "default_value");
    }

    #[test]
    fn test_env_time_parses_hh_mm() {
        let val = env_time("NON_EXISTENT_TIME_VAR_12345", "22:00").unwrap();
        assert_eq!(val, NaiveTime::from_hms_opt(22, 0, 0).unwrap());
    }

    #[test]
    fn test_env_time_rejects_malformed_default_override() {
        unsafe {
            env::set_var("CONFIG_TEST_BAD_TIME", "not-a-time");
        }
        let err = env_time("CONFIG_TEST_BAD_TIME", "22:00").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_, _)));
        unsafe {
            env::remove_var("CONFIG_TEST_BAD_TIME");
        }
    }
}
