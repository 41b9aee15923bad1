//! Configuration management for Boostloop
//!
//! Settings come from an optional TOML file; account credentials come from
//! the environment (optionally seeded from a `.env` file) and are required.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

pub const IDENTIFIER_ENV: &str = "BSKY_IDENTIFIER";
pub const PASSWORD_ENV: &str = "BSKY_PASSWORD";
pub const CONFIG_ENV: &str = "BOOSTLOOP_CONFIG";

/// Largest page the upstream list endpoints accept
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub store: StoreConfig,
    pub filter: FilterConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// PDS base URL
    pub url: String,
    pub page_size: u32,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: "https://bsky.social".to_string(),
            page_size: MAX_PAGE_SIZE,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding following.json and reposted.json
    pub dir: Option<String>,
}

/// Thresholds for picking timeline posts worth reposting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Posts younger than this are left alone
    #[serde(with = "duration_str")]
    pub min_age: Duration,
    /// Posts older than this are stale and end timeline paging
    #[serde(with = "duration_str")]
    pub max_age: Duration,
    /// Lowest weighted engagement score that qualifies
    pub like_min: u64,
    /// Posts with more likes than this are already popular
    pub like_max: u64,
    pub like_weight: u64,
    pub repost_weight: u64,
    /// Accepted top-1 language names, lowercase
    pub languages: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_age: Duration::from_secs(30 * 60),
            max_age: Duration::from_secs(2 * 60 * 60),
            like_min: 6,
            like_max: 11,
            like_weight: 1,
            repost_weight: 2,
            languages: vec!["english".to_string(), "pidgin".to_string()],
        }
    }
}

/// What the runner does when a cycle fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Log, count and keep going until `max_errors` is exceeded
    #[default]
    Isolate,
    /// Stop at the first failed cycle
    FailFast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Delay between the end of one cycle and the start of the next
    #[serde(with = "duration_str")]
    pub interval: Duration,
    /// Run unfollow reconciliation every Nth cycle
    pub reconcile_every: u32,
    pub error_policy: ErrorPolicy,
    pub max_errors: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            reconcile_every: 5,
            error_policy: ErrorPolicy::Isolate,
            max_errors: 10,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file is not an error: defaults are used instead.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the loops cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.service.page_size == 0 || self.service.page_size > MAX_PAGE_SIZE {
            return Err(invalid(
                "service.page_size",
                format!("must be between 1 and {}", MAX_PAGE_SIZE),
            ));
        }
        if self.filter.min_age >= self.filter.max_age {
            return Err(invalid("filter.min_age", "must be shorter than filter.max_age"));
        }
        if self.schedule.reconcile_every == 0 {
            return Err(invalid("schedule.reconcile_every", "must be at least 1"));
        }
        Ok(())
    }

    /// Directory for persisted state, with `~` expanded
    pub fn store_dir(&self) -> Result<PathBuf> {
        match &self.store.dir {
            Some(dir) => Ok(PathBuf::from(shellexpand::tilde(dir).to_string())),
            None => resolve_data_path(),
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> crate::error::BoostError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
    .into()
}

/// Account login, read once at startup
#[derive(Debug)]
pub struct Credentials {
    pub identifier: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Read credentials from `BSKY_IDENTIFIER` and `BSKY_PASSWORD`
    ///
    /// Values from a `.env` file in the working directory are loaded first
    /// without overriding variables that are already set.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let identifier = required_env(IDENTIFIER_ENV)?;
        let password = required_env(PASSWORD_ENV)?;
        Ok(Self::new(identifier, password))
    }
}

fn required_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingField(name.to_string()).into()),
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("boostloop").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("boostloop"))
}

/// Durations written as humantime strings ("30s", "2h", "1h 30m")
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoostError;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    #[test]
    fn test_defaults_match_reference_thresholds() {
        let config = Config::default();
        assert_eq!(config.service.url, "https://bsky.social");
        assert_eq!(config.service.page_size, 100);
        assert_eq!(config.filter.min_age, Duration::from_secs(1800));
        assert_eq!(config.filter.max_age, Duration::from_secs(7200));
        assert_eq!(config.filter.like_min, 6);
        assert_eq!(config.filter.like_max, 11);
        assert_eq!(config.filter.like_weight, 1);
        assert_eq!(config.filter.repost_weight, 2);
        assert_eq!(config.filter.languages, vec!["english", "pidgin"]);
        assert_eq!(config.schedule.interval, Duration::from_secs(30));
        assert_eq!(config.schedule.reconcile_every, 5);
        assert_eq!(config.schedule.error_policy, ErrorPolicy::Isolate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[filter]
max_age = "3h"
like_max = 20

[schedule]
interval = "2m"
error_policy = "fail-fast"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.filter.max_age, Duration::from_secs(3 * 3600));
        assert_eq!(config.filter.like_max, 20);
        assert_eq!(config.filter.like_min, 6);
        assert_eq!(config.schedule.interval, Duration::from_secs(120));
        assert_eq!(config.schedule.error_policy, ErrorPolicy::FailFast);
        assert_eq!(config.service.page_size, 100);
    }

    #[test]
    fn test_unparsable_duration_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[schedule]\ninterval = \"soon\"\n").unwrap();

        match Config::load_from_path(&path) {
            Err(BoostError::Config(ConfigError::ParseError(_))) => {}
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_inverted_age_window_rejected() {
        let mut config = Config::default();
        config.filter.min_age = Duration::from_secs(7200);
        match config.validate() {
            Err(BoostError::Config(ConfigError::InvalidValue { field, .. })) => {
                assert_eq!(field, "filter.min_age");
            }
            other => panic!("Expected invalid value, got {:?}", other),
        }
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = Config::default();
        config.service.page_size = 0;
        assert!(config.validate().is_err());
        config.service.page_size = 101;
        assert!(config.validate().is_err());
        config.service.page_size = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_dir_expands_tilde() {
        let config = Config {
            store: StoreConfig {
                dir: Some("~/boostloop-state".to_string()),
            },
            ..Default::default()
        };
        let dir = config.store_dir().unwrap();
        assert!(!dir.to_string_lossy().starts_with('~'));
        assert!(dir.ends_with("boostloop-state"));
    }

    #[test]
    #[serial]
    fn test_missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(CONFIG_ENV, dir.path().join("absent.toml"));
        let config = Config::load().unwrap();
        std::env::remove_var(CONFIG_ENV);
        assert_eq!(config.schedule.max_errors, 10);
    }

    #[test]
    #[serial]
    fn test_credentials_from_env() {
        std::env::set_var(IDENTIFIER_ENV, "bot.bsky.social");
        std::env::set_var(PASSWORD_ENV, "app-pass-word");
        let creds = Credentials::from_env().unwrap();
        assert_eq!(creds.identifier, "bot.bsky.social");
        assert_eq!(creds.password.expose_secret(), "app-pass-word");
        std::env::remove_var(IDENTIFIER_ENV);
        std::env::remove_var(PASSWORD_ENV);
    }

    #[test]
    #[serial]
    fn test_credentials_missing_fail_fast() {
        std::env::set_var(IDENTIFIER_ENV, "bot.bsky.social");
        std::env::set_var(PASSWORD_ENV, "   ");
        let result = Credentials::from_env();
        std::env::remove_var(IDENTIFIER_ENV);
        std::env::remove_var(PASSWORD_ENV);

        match result {
            Err(BoostError::Config(ConfigError::MissingField(name))) => {
                assert_eq!(name, PASSWORD_ENV);
            }
            other => panic!("Expected missing field, got {:?}", other),
        }
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("bot.bsky.social", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter2"));
    }
}
