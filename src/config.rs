use std::env;
use std::str::FromStr;

use chrono_tz::Tz;

use crate::errors::AppError;
use crate::models::{Schedule, SessionConfig};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub storage: StorageBackend,
    pub admin_token: String,
    pub provider_name: String,
    pub schedule: Schedule,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = SessionConfig::default();

        let timezone = match lookup("TIMEZONE") {
            Some(name) => Tz::from_str(name.trim())
                .map_err(|e| AppError::Config(format!("unknown timezone {name}: {e}")))?,
            None => defaults.timezone,
        };

        let session = SessionConfig {
            timezone,
            session_minutes: parse_or(&lookup, "SESSION_MINUTES", defaults.session_minutes)?,
            buffer_minutes: parse_or(&lookup, "BUFFER_MINUTES", defaults.buffer_minutes)?,
            weeks_forward: parse_or(&lookup, "WEEKS_FORWARD", defaults.weeks_forward)?,
        };

        let rules = match lookup("WEEKDAY_RULES") {
            Some(json) => Schedule::rules_from_json(&json)?,
            None => Schedule::default().rules,
        };

        let storage = match lookup("STORAGE_BACKEND").as_deref() {
            None | Some("sqlite") => StorageBackend::Sqlite,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "unknown storage backend: {other}"
                )))
            }
        };

        Ok(Self {
            port: parse_or(&lookup, "PORT", 3000)?,
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "slotbook.db".to_string()),
            storage,
            admin_token: lookup("ADMIN_TOKEN").unwrap_or_else(|| "changeme".to_string()),
            provider_name: lookup("PROVIDER_NAME").unwrap_or_else(|| "Provider".to_string()),
            schedule: Schedule::new(session, rules)?,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("invalid value for {key}: {raw}"))),
        None => Ok(default),
    }
}
