//! # Configuration
//!
//! Layered client configuration: built-in defaults, then an optional YAML,
//! JSON or TOML file, then `STORYKEEP_*` environment variables for values the
//! file left at their defaults.

use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, time::Duration};
use thiserror::Error;
use tracing::debug;

pub const ENV_API_BASE_URL: &str = "STORYKEEP_API_BASE_URL";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "STORYKEEP_REQUEST_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "STORYKEEP_LOG_LEVEL";
pub const ENV_TOKEN_PATH: &str = "STORYKEEP_TOKEN_PATH";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported configuration format '{0}'. Use 'yaml', 'json' or 'toml'.")]
    UnsupportedFormat(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid {name} value: {reason}")]
    InvalidEnv { name: &'static str, reason: String },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// API connection settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every endpoint path is joined onto.
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            request_timeout_ms: 10_000,
            user_agent: "storykeep-cli".to_string(),
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Idle-timeout thresholds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct IdleConfig {
    /// Inactivity before the warning is shown.
    pub warn_after_secs: u64,
    /// Inactivity before the session is ended outright.
    pub logout_after_secs: u64,
    /// Length of the countdown shown with the warning.
    pub warning_countdown_secs: u32,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            warn_after_secs: 25 * 60,
            logout_after_secs: 30 * 60,
            warning_countdown_secs: 300,
        }
    }
}

impl IdleConfig {
    #[must_use]
    pub fn warn_after(&self) -> Duration {
        Duration::from_secs(self.warn_after_secs)
    }

    #[must_use]
    pub fn logout_after(&self) -> Duration {
        Duration::from_secs(self.logout_after_secs)
    }
}

/// Where credentials are persisted.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Token file. Falls back to [`default_token_path`] when unset.
    pub token_path: Option<PathBuf>,
}

impl StorageConfig {
    /// The configured token path, or the per-user default.
    #[must_use]
    pub fn resolved_token_path(&self) -> PathBuf {
        self.token_path.clone().unwrap_or_else(default_token_path)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Complete client configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub idle: IdleConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Creates a configuration holding only built-in defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Loads the configuration from an optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed, when an
    /// environment override is malformed, or when the result fails validation.
    pub fn load_config(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_file(&path)?,
            None => Self::with_defaults(),
        };

        config.apply_env_overrides()?;
        config.validate().map_err(ConfigError::Invalid)?;

        Ok(config)
    }

    fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "loading configuration file");
        let content = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => {
                serde_yml::from_str(&content).map_err(|err| ConfigError::Parse(err.to_string()))
            }
            "json" => {
                serde_json::from_str(&content).map_err(|err| ConfigError::Parse(err.to_string()))
            }
            "toml" => toml::from_str(&content).map_err(|err| ConfigError::Parse(err.to_string())),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Applies environment variables to values still at their defaults.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let defaults = Self::with_defaults();

        if self.api.base_url == defaults.api.base_url {
            if let Ok(base_url) = env::var(ENV_API_BASE_URL) {
                self.api.base_url = base_url;
            }
        }
        if self.api.request_timeout_ms == defaults.api.request_timeout_ms {
            if let Ok(timeout) = env::var(ENV_REQUEST_TIMEOUT_MS) {
                self.api.request_timeout_ms =
                    timeout.parse().map_err(|_| ConfigError::InvalidEnv {
                        name: ENV_REQUEST_TIMEOUT_MS,
                        reason: format!("'{timeout}' is not a number of milliseconds"),
                    })?;
            }
        }
        if self.logging.level == defaults.logging.level {
            if let Ok(level) = env::var(ENV_LOG_LEVEL) {
                self.logging.level = level;
            }
        }
        if self.storage.token_path.is_none() {
            if let Ok(path) = env::var(ENV_TOKEN_PATH) {
                self.storage.token_path = Some(PathBuf::from(path));
            }
        }

        Ok(())
    }

    /// Checks the configuration for values the client cannot work with.
    ///
    /// # Errors
    ///
    /// Returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match url::Url::parse(&self.api.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!(
                "API base URL must use http or https, got '{}'",
                url.scheme()
            )),
            Err(err) => errors.push(format!(
                "API base URL '{}' is invalid: {err}",
                self.api.base_url
            )),
        }

        if self.api.request_timeout_ms == 0 {
            errors.push("Request timeout must be greater than 0.".to_string());
        }

        if self.idle.warn_after_secs == 0 {
            errors.push("Idle warning threshold must be greater than 0.".to_string());
        }
        if self.idle.warn_after_secs >= self.idle.logout_after_secs {
            errors.push(format!(
                "Idle warning threshold ({}s) must be shorter than the logout threshold ({}s).",
                self.idle.warn_after_secs, self.idle.logout_after_secs
            ));
        }
        if self.idle.warning_countdown_secs == 0 {
            errors.push("Warning countdown must be greater than 0.".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Per-user default location of the token file.
#[must_use]
pub fn default_token_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".storykeep").join("tokens.json"),
        |dirs| dirs.config_dir().join("storykeep").join("tokens.json"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::TempDir;

    fn clear_env() {
        unsafe {
            env::remove_var(ENV_API_BASE_URL);
            env::remove_var(ENV_REQUEST_TIMEOUT_MS);
            env::remove_var(ENV_LOG_LEVEL);
            env::remove_var(ENV_TOKEN_PATH);
        }
    }

    fn write_config(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_config_with_defaults() {
        let config = Config::with_defaults();
        assert_eq!(config.api.base_url, "http://localhost:8000/api");
        assert_eq!(config.api.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.idle.warn_after(), Duration::from_secs(1500));
        assert_eq!(config.idle.logout_after(), Duration::from_secs(1800));
        assert_eq!(config.idle.warning_countdown_secs, 300);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.storage.token_path.is_none());
    }

    #[test]
    #[serial]
    fn test_load_config_with_defaults() {
        clear_env();
        let config = Config::load_config(None).unwrap();
        assert_eq!(config, Config::with_defaults());
    }

    #[test]
    #[serial]
    fn test_load_config_with_environment_variables() {
        clear_env();
        unsafe {
            env::set_var(ENV_API_BASE_URL, "https://storykeep.example/api");
            env::set_var(ENV_REQUEST_TIMEOUT_MS, "2500");
            env::set_var(ENV_LOG_LEVEL, "debug");
            env::set_var(ENV_TOKEN_PATH, "/tmp/storykeep/tokens.json");
        }

        let config = Config::load_config(None).unwrap();
        clear_env();

        assert_eq!(config.api.base_url, "https://storykeep.example/api");
        assert_eq!(config.api.request_timeout_ms, 2500);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.storage.token_path,
            Some(PathBuf::from("/tmp/storykeep/tokens.json"))
        );
    }

    #[test]
    #[serial]
    fn test_load_config_invalid_timeout_environment() {
        clear_env();
        unsafe {
            env::set_var(ENV_REQUEST_TIMEOUT_MS, "soon");
        }

        let result = Config::load_config(None);
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv {
                name: ENV_REQUEST_TIMEOUT_MS,
                ..
            })
        ));
    }

    #[test]
    #[serial]
    fn test_file_values_take_precedence_over_environment() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "config.yaml",
            "api:\n  base_url: https://file.example/api\nlogging:\n  level: warn\n  format: json\n",
        );
        unsafe {
            env::set_var(ENV_API_BASE_URL, "https://env.example/api");
            env::set_var(ENV_LOG_LEVEL, "trace");
        }

        let config = Config::load_config(Some(path)).unwrap();
        clear_env();

        assert_eq!(config.api.base_url, "https://file.example/api");
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.api.request_timeout_ms, 10_000);
    }

    #[test]
    #[serial]
    fn test_load_config_from_json_file() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "config.json",
            r#"{"idle": {"warn_after_secs": 60, "logout_after_secs": 120}}"#,
        );

        let config = Config::load_config(Some(path)).unwrap();
        assert_eq!(config.idle.warn_after_secs, 60);
        assert_eq!(config.idle.logout_after_secs, 120);
        assert_eq!(config.idle.warning_countdown_secs, 300);
    }

    #[test]
    #[serial]
    fn test_load_config_from_toml_file() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "config.toml",
            "[api]\nrequest_timeout_ms = 500\n\n[storage]\ntoken_path = \"/var/tmp/tokens.json\"\n",
        );

        let config = Config::load_config(Some(path)).unwrap();
        assert_eq!(config.api.request_timeout_ms, 500);
        assert_eq!(
            config.storage.resolved_token_path(),
            PathBuf::from("/var/tmp/tokens.json")
        );
    }

    #[test]
    fn test_load_config_unsupported_format() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.ini", "level=info");

        let result = Config::load_config(Some(path));
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(ext)) if ext == "ini"));
    }

    #[test]
    fn test_load_config_nonexistent_file() {
        let result = Config::load_config(Some(PathBuf::from("/nonexistent/storykeep.yaml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_malformed_yaml() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.yaml", "api: [unclosed");

        let result = Config::load_config(Some(path));
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::with_defaults();
        config.api.base_url = "ftp://example.com".to_string();
        config.api.request_timeout_ms = 0;
        config.idle.warn_after_secs = 1800;
        config.idle.warning_countdown_secs = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors[0].contains("http or https"));
    }

    #[test]
    fn test_validate_valid() {
        assert!(Config::with_defaults().validate().is_ok());
    }

    #[test]
    fn test_default_token_path_file_name() {
        let path = default_token_path();
        assert_eq!(
            path.file_name().and_then(|name| name.to_str()),
            Some("tokens.json")
        );
    }
}
