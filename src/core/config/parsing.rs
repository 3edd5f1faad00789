use std::env;

use reqwest::Url;

use super::types::{ConfigError, Environment};
use crate::domain::draft::DraftPrecedence;

pub(super) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

pub(super) fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_positive_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    let parsed = parse_u64(field, value.clone())?;
    if parsed == 0 {
        return Err(ConfigError::InvalidValue { field, value });
    }
    Ok(parsed)
}

pub(super) fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

pub(super) fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|val| val.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

pub(super) fn parse_base_url(value: String) -> Result<String, ConfigError> {
    let parsed = Url::parse(&value).map_err(|_| ConfigError::InvalidUrl(value.clone()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(value));
    }
    Ok(value.trim_end_matches('/').to_string())
}

pub(super) fn parse_precedence(value: String) -> Result<DraftPrecedence, ConfigError> {
    DraftPrecedence::parse(&value)
        .ok_or(ConfigError::InvalidValue { field: "TESTVERSE_DRAFT_PRECEDENCE", value })
}
