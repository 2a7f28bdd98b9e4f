use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use mechat_llm::{
    DEFAULT_GEMINI_MODEL, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_IDLE_TTL, ProviderConfig,
    RIG_GEMINI_PROVIDER_ID, SessionPolicy,
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use tracing_subscriber::filter::LevelFilter;

use crate::overlay::CallDurationPolicy;

pub const DEFAULT_PROVIDER_ID: &str = RIG_GEMINI_PROVIDER_ID;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const SETTINGS_DIRECTORY_NAME: &str = "mechat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const CONFIG_PATH_ENV: &str = "MECHAT_CONFIG";
pub const ENV_PREFIX: &str = "MECHAT_";
/// Consulted in order when no key is configured under the `MECHAT_` prefix.
pub const FALLBACK_API_KEY_ENVS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub api_key: String,
    /// Empty means the provider's public endpoint.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_session_idle_ttl_secs")]
    pub session_idle_ttl_secs: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default)]
    pub call_duration_policy: CallDurationPolicy,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            api_key: String::new(),
            endpoint: String::new(),
            model: default_model(),
            session_idle_ttl_secs: default_session_idle_ttl_secs(),
            max_sessions: default_max_sessions(),
            call_duration_policy: CallDurationPolicy::default(),
            log_level: default_log_level(),
        }
    }
}

impl AppSettings {
    /// Returns `None` when there is no credential; the assistant then runs offline.
    pub fn to_provider_config(&self) -> Option<ProviderConfig> {
        if self.api_key.trim().is_empty() {
            return None;
        }

        Some(ProviderConfig::new(&self.provider_id, &self.api_key, &self.endpoint))
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy::new(
            Duration::from_secs(self.session_idle_ttl_secs),
            self.max_sessions,
        )
    }

    pub fn log_filter(&self) -> SettingsResult<LevelFilter> {
        self.log_level
            .parse::<LevelFilter>()
            .ok()
            .ok_or_else(|| SettingsError::InvalidLogLevel {
                stage: "parse-log-level",
                value: self.log_level.clone(),
            })
    }

    /// Fills a blank credential from the first non-empty fallback variable.
    pub fn with_api_key_fallback<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.has_api_key() {
            return self;
        }

        if let Some(key) = FALLBACK_API_KEY_ENVS.iter().find_map(|name| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        }) {
            self.api_key = key;
        }

        self
    }

    pub fn normalized(mut self) -> Self {
        self.provider_id = non_blank_or(self.provider_id, default_provider_id);
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = self.endpoint.trim().to_string();
        self.model = non_blank_or(self.model, default_model);
        let log_level = non_blank_or(self.log_level, default_log_level);
        self.log_level = log_level.to_lowercase();
        if self.session_idle_ttl_secs == 0 {
            self.session_idle_ttl_secs = default_session_idle_ttl_secs();
        }
        if self.max_sessions == 0 {
            self.max_sessions = default_max_sessions();
        }

        self
    }
}

/// Layered settings: built-in defaults, then the JSON file, then `MECHAT_*` variables.
///
/// Loading never fails; a broken file leaves defaults in place and the error
/// is kept for the caller to report once logging is up.
pub struct SettingsStore {
    settings: AppSettings,
    config_path: PathBuf,
    load_error: Option<SettingsError>,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".mechat"))
    }

    pub fn default_config_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::default_config_dir().join(SETTINGS_FILE_NAME))
    }

    pub fn new(config_path: PathBuf) -> Self {
        let figment = Self::figment(&config_path).merge(Env::prefixed(ENV_PREFIX));
        let (settings, load_error) = match Self::extract(&figment) {
            Ok(settings) => (settings, None),
            Err(error) => (AppSettings::default(), Some(error)),
        };

        Self {
            settings: settings.with_api_key_fallback(|name| std::env::var(name).ok()),
            config_path,
            load_error,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn file_exists(&self) -> bool {
        self.config_path.exists()
    }

    /// Why the configured values were discarded, if they were.
    pub fn load_error(&self) -> Option<&SettingsError> {
        self.load_error.as_ref()
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppSettings::default())).merge(Json::file(path))
    }

    fn extract(figment: &Figment) -> SettingsResult<AppSettings> {
        let settings = figment.extract::<AppSettings>().context(ExtractSnafu {
            stage: "extract-settings",
        })?;

        Ok(settings.normalized())
    }
}

pub type SettingsResult<T> = Result<T, SettingsError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to extract settings on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        #[snafu(source(from(figment::Error, Box::new)))]
        source: Box<figment::Error>,
    },
    #[snafu(display("unknown log level '{value}' on `{stage}`"))]
    InvalidLogLevel { stage: &'static str, value: String },
}

fn non_blank_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_provider_id() -> String {
    DEFAULT_PROVIDER_ID.to_string()
}

fn default_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_session_idle_ttl_secs() -> u64 {
    DEFAULT_SESSION_IDLE_TTL.as_secs()
}

fn default_max_sessions() -> usize {
    DEFAULT_MAX_SESSIONS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_json(json: &str) -> SettingsResult<AppSettings> {
        let figment =
            Figment::from(Serialized::defaults(AppSettings::default())).merge(Json::string(json));
        SettingsStore::extract(&figment)
    }

    #[test]
    fn file_values_override_defaults_and_are_normalized() {
        let settings = from_json(
            r#"{
                "api_key": "  secret  ",
                "model": "  ",
                "max_sessions": 8,
                "call_duration_policy": "elapsed",
                "log_level": "DEBUG"
            }"#,
        )
        .unwrap();

        assert_eq!(settings.provider_id, DEFAULT_PROVIDER_ID);
        assert_eq!(settings.api_key, "secret");
        assert_eq!(settings.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(settings.max_sessions, 8);
        assert_eq!(settings.call_duration_policy, CallDurationPolicy::Elapsed);
        assert_eq!(settings.log_filter().unwrap(), LevelFilter::DEBUG);
    }

    #[test]
    fn malformed_values_are_reported() {
        let result = from_json(r#"{ "max_sessions": "many" }"#);
        assert!(matches!(result, Err(SettingsError::Extract { .. })));
    }

    #[test]
    fn missing_credential_yields_no_provider_config() {
        let settings = AppSettings::default();
        assert!(settings.to_provider_config().is_none());
        assert_eq!(
            settings.call_duration_policy,
            CallDurationPolicy::Fixed { seconds: 45 }
        );
    }

    #[test]
    fn fallback_variables_fill_a_blank_key_in_order() {
        let settings = AppSettings::default().with_api_key_fallback(|name| match name {
            "GEMINI_API_KEY" => Some("   ".to_string()),
            "API_KEY" => Some("from-api-key".to_string()),
            _ => None,
        });
        assert_eq!(settings.api_key, "from-api-key");

        let configured = AppSettings {
            api_key: "configured".to_string(),
            ..AppSettings::default()
        }
        .with_api_key_fallback(|_| Some("ignored".to_string()));
        assert_eq!(configured.api_key, "configured");
    }

    #[test]
    fn session_policy_follows_settings() {
        let settings = AppSettings {
            session_idle_ttl_secs: 90,
            max_sessions: 3,
            ..AppSettings::default()
        };
        let policy = settings.session_policy();
        assert_eq!(policy.idle_ttl, Duration::from_secs(90));
        assert_eq!(policy.max_sessions, 3);
    }

    #[test]
    fn unknown_log_level_is_an_error() {
        let settings = AppSettings {
            log_level: "chatty".to_string(),
            ..AppSettings::default()
        };
        assert!(matches!(
            settings.log_filter(),
            Err(SettingsError::InvalidLogLevel { .. })
        ));
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mechat-{}-{name}", std::process::id()))
    }

    #[test]
    fn invalid_file_falls_back_to_defaults_and_keeps_the_error() {
        let path = scratch_path("invalid-settings.json");
        std::fs::write(&path, r#"{ "max_sessions": "many", "log_level": "debug" }"#).unwrap();

        let store = SettingsStore::new(path.clone());
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(store.load_error(), Some(SettingsError::Extract { .. })));
        assert_eq!(store.settings().max_sessions, DEFAULT_MAX_SESSIONS);
        assert_eq!(store.settings().log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let store = SettingsStore::new(scratch_path("absent-settings.json"));
        assert!(!store.file_exists());
        assert!(store.load_error().is_none());
        assert_eq!(store.settings().provider_id, DEFAULT_PROVIDER_ID);
    }
}
