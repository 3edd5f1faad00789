use super::parsing::{
    env_optional, env_or_default, parse_base_url, parse_bool, parse_environment,
    parse_positive_u64, parse_precedence, parse_u64,
};
use super::types::{
    ApiSettings, ConfigError, RuntimeSettings, SessionSettings, Settings, StorageSettings,
    TelemetrySettings,
};
use crate::session::SessionConfig;

pub(crate) const DEFAULT_BASE_URL: &str = "https://testverse-backend.onrender.com";

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let environment = parse_environment(env_optional("TESTVERSE_ENV"));
        let strict_config = env_optional("TESTVERSE_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let base_url = parse_base_url(env_or_default("TESTVERSE_BASE_URL", DEFAULT_BASE_URL))?;
        let access_token = env_optional("TESTVERSE_ACCESS_TOKEN");
        let refresh_token = env_optional("TESTVERSE_REFRESH_TOKEN");
        let request_timeout_seconds = parse_positive_u64(
            "TESTVERSE_REQUEST_TIMEOUT_SECONDS",
            env_or_default("TESTVERSE_REQUEST_TIMEOUT_SECONDS", "30"),
        )?;

        let autosave_interval_seconds = parse_positive_u64(
            "TESTVERSE_AUTOSAVE_INTERVAL_SECONDS",
            env_or_default("TESTVERSE_AUTOSAVE_INTERVAL_SECONDS", "30"),
        )?;
        let redirect_delay_millis = parse_u64(
            "TESTVERSE_REDIRECT_DELAY_MILLIS",
            env_or_default("TESTVERSE_REDIRECT_DELAY_MILLIS", "1500"),
        )?;
        let default_time_seconds = parse_positive_u64(
            "TESTVERSE_DEFAULT_TIME_SECONDS",
            env_or_default("TESTVERSE_DEFAULT_TIME_SECONDS", "3600"),
        )?;
        let results_route = env_or_default("TESTVERSE_RESULTS_ROUTE", "results.html");
        let draft_precedence =
            parse_precedence(env_or_default("TESTVERSE_DRAFT_PRECEDENCE", "server"))?;

        let draft_dir = env_or_default("TESTVERSE_DRAFT_DIR", ".testverse/drafts");

        let log_level = env_or_default("TESTVERSE_LOG_LEVEL", "info");
        let json = env_optional("TESTVERSE_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { base_url, access_token, refresh_token, request_timeout_seconds },
            session: SessionSettings {
                autosave_interval_seconds,
                redirect_delay_millis,
                default_time_seconds,
                results_route,
                draft_precedence,
            },
            storage: StorageSettings { draft_dir },
            telemetry: TelemetrySettings { log_level, json },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    pub fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub fn session(&self) -> &SessionSettings {
        &self.session
    }

    pub fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            autosave_interval: self.session.autosave_interval(),
            redirect_delay: self.session.redirect_delay(),
            default_time_seconds: self.session.default_time_seconds,
            results_route: self.session.results_route.clone(),
            draft_precedence: self.session.draft_precedence,
            ..SessionConfig::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.results_route.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "TESTVERSE_RESULTS_ROUTE",
                value: String::from("<empty>"),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.api.access_token.is_none() {
            return Err(ConfigError::MissingValue("TESTVERSE_ACCESS_TOKEN"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::draft::DraftPrecedence;
    use crate::test_support;

    #[tokio::test]
    async fn defaults_load_without_environment() {
        let _guard = test_support::env_lock().await;
        test_support::clear_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.api().base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.api().request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.session().autosave_interval(), Duration::from_secs(30));
        assert_eq!(settings.session().default_time_seconds, 3600);
        assert_eq!(settings.session().draft_precedence, DraftPrecedence::ServerFirst);
        assert_eq!(settings.storage().draft_dir, ".testverse/drafts");
        assert!(!settings.telemetry().json);
    }

    #[tokio::test]
    async fn overrides_flow_into_session_config() {
        let _guard = test_support::env_lock().await;
        test_support::clear_env();
        std::env::set_var("TESTVERSE_BASE_URL", "http://localhost:8000/");
        std::env::set_var("TESTVERSE_AUTOSAVE_INTERVAL_SECONDS", "5");
        std::env::set_var("TESTVERSE_REDIRECT_DELAY_MILLIS", "0");
        std::env::set_var("TESTVERSE_DRAFT_PRECEDENCE", "local");
        std::env::set_var("TESTVERSE_RESULTS_ROUTE", "/pages/student/results.html");

        let settings = Settings::load().expect("settings");
        let config = settings.session_config();
        test_support::clear_env();

        assert_eq!(settings.api().base_url, "http://localhost:8000");
        assert_eq!(config.autosave_interval, Duration::from_secs(5));
        assert_eq!(config.redirect_delay, Duration::ZERO);
        assert_eq!(config.draft_precedence, DraftPrecedence::LocalFirst);
        assert_eq!(config.results_route, "/pages/student/results.html");
        assert_eq!(config.tick_interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn strict_config_requires_access_token() {
        let _guard = test_support::env_lock().await;
        test_support::clear_env();
        std::env::set_var("TESTVERSE_ENV", "production");

        let result = Settings::load();
        test_support::clear_env();

        assert!(matches!(result, Err(ConfigError::MissingValue("TESTVERSE_ACCESS_TOKEN"))));
    }

    #[tokio::test]
    async fn zero_autosave_interval_is_rejected() {
        let _guard = test_support::env_lock().await;
        test_support::clear_env();
        std::env::set_var("TESTVERSE_AUTOSAVE_INTERVAL_SECONDS", "0");

        let result = Settings::load();
        test_support::clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "TESTVERSE_AUTOSAVE_INTERVAL_SECONDS", .. })
        ));
    }
}
