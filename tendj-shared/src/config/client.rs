use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "http://localhost:8005/";
const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Overrides `api.base_url`
pub const ENV_API_BASE_URL: &str = "TENDJ_API_BASE_URL";
/// Overrides `session.state_path`
pub const ENV_STATE_PATH: &str = "TENDJ_STATE_PATH";
/// Overrides `session.key_prefix`
pub const ENV_STORAGE_PREFIX: &str = "TENDJ_STORAGE_PREFIX";
/// Overrides `logging.level`
pub const ENV_LOG_LEVEL: &str = "TENDJ_LOG_LEVEL";
/// Overrides `logging.format`
pub const ENV_LOG_FORMAT: &str = "TENDJ_LOG_FORMAT";
/// Overrides `session.auth_token`
pub const ENV_AUTH_TOKEN: &str = "TENDJ_AUTH_TOKEN";

/// Errors raised while loading or rendering configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported configuration format '{0}'; use yaml, json, or toml")]
    UnsupportedFormat(String),

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to render TOML configuration: {0}")]
    TomlRender(#[from] toml::ser::Error),

    #[error("invalid {var} value: {message}")]
    InvalidEnv { var: &'static str, message: String },
}

/// Serialization formats accepted for configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    /// Picks the format from a file extension.
    ///
    /// # Errors
    /// Returns [`ConfigError::UnsupportedFormat`] for unknown extensions.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        extension.parse()
    }

    /// Name of the generated default file.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Yaml => "config.yaml",
            Self::Json => "config.json",
            Self::Toml => "config.toml",
        }
    }
}

impl FromStr for ConfigFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Log output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Backend endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    /// Root URL of the chat backend
    pub base_url: Url,
    /// Conversation listing; a conversation's transcript lives at `<chats_path>/<id>`
    pub chats_path: String,
    /// Message submission endpoint
    pub send_path: String,
    /// Server-Sent Events push stream
    pub stream_path: String,
    /// Pause before reconnecting a dropped push stream
    pub reconnect_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chats_path: "api/v1/chats".to_string(),
            send_path: "chat".to_string(),
            stream_path: "api/v1/stream".to_string(),
            reconnect_delay_ms: 1_000,
        }
    }
}

impl ApiConfig {
    /// Resolves `path` against the base URL, treating the base as a
    /// directory even when it lacks a trailing slash.
    ///
    /// # Errors
    /// Returns the URL parse error for malformed paths.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let directory = format!("{}/", base.path());
            base.set_path(&directory);
        }
        base.join(path.trim_start_matches('/'))
    }
}

/// Where session state (active conversation, task, token) is persisted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// JSON file holding the session keys
    pub state_path: PathBuf,
    /// Prefix for persisted keys, e.g. `10dj` gives `10dj-chatId`
    pub key_prefix: String,
    /// Explicit bearer token; wins over a stored one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            key_prefix: "10dj".to_string(),
            auth_token: None,
        }
    }
}

/// Chat behaviour.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ChatConfig {
    /// Reload the transcript after a send is acknowledged
    pub refetch_after_send: bool,
    /// Name used in the "thinking" indicator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            refetch_after_send: true,
            agent_name: None,
        }
    }
}

/// Log output of the binary.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Text or JSON lines
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

/// The main configuration structure for the tendj client.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Backend endpoints
    pub api: ApiConfig,
    /// Persisted session state
    pub session: SessionConfig,
    /// Chat behaviour
    pub chat: ChatConfig,
    /// Log output
    pub logging: LoggingConfig,
}

impl Config {
    /// Generates a default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// Precedence, lowest first: defaults, file, environment, `base_url_override`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or an
    /// environment variable holds an invalid value.
    pub fn load_config(
        config_path: Option<PathBuf>,
        base_url_override: Option<Url>,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_file(&path)?,
            None => Self::with_defaults(),
        };

        config.apply_env_overrides()?;

        if let Some(base_url) = base_url_override {
            config.api.base_url = base_url;
        }

        Ok(config)
    }

    /// Parses a configuration file; missing sections fall back to defaults.
    ///
    /// # Errors
    /// Returns an error for unreadable files, unknown extensions, or
    /// malformed content.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = match format {
            ConfigFormat::Yaml => serde_yml::from_str(&content)?,
            ConfigFormat::Json => serde_json::from_str(&content)?,
            ConfigFormat::Toml => toml::from_str(&content)?,
        };
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var(ENV_API_BASE_URL) {
            self.api.base_url = Url::parse(&value).map_err(|err| ConfigError::InvalidEnv {
                var: ENV_API_BASE_URL,
                message: err.to_string(),
            })?;
        }
        if let Ok(value) = env::var(ENV_STATE_PATH) {
            self.session.state_path = PathBuf::from(value);
        }
        if let Ok(value) = env::var(ENV_STORAGE_PREFIX) {
            self.session.key_prefix = value;
        }
        if let Ok(value) = env::var(ENV_AUTH_TOKEN)
            && !value.trim().is_empty()
        {
            self.session.auth_token = Some(value);
        }
        if let Ok(value) = env::var(ENV_LOG_LEVEL) {
            self.logging.level = value;
        }
        if let Ok(value) = env::var(ENV_LOG_FORMAT) {
            self.logging.format = value.parse().map_err(|message| ConfigError::InvalidEnv {
                var: ENV_LOG_FORMAT,
                message,
            })?;
        }
        Ok(())
    }

    /// Serializes the configuration in the requested format.
    ///
    /// # Errors
    /// Propagates serializer failures.
    pub fn render(&self, format: ConfigFormat) -> Result<String, ConfigError> {
        let rendered = match format {
            ConfigFormat::Yaml => serde_yml::to_string(self)?,
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };
        Ok(rendered)
    }

    /// Validate the complete configuration, collecting every problem.
    ///
    /// # Errors
    /// Returns the list of validation messages when any check fails.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !matches!(self.api.base_url.scheme(), "http" | "https") {
            errors.push(format!(
                "api.base_url must use http or https, got '{}'",
                self.api.base_url.scheme()
            ));
        }
        for (name, value) in [
            ("api.chats_path", &self.api.chats_path),
            ("api.send_path", &self.api.send_path),
            ("api.stream_path", &self.api.stream_path),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{name} must not be empty"));
            }
        }
        if self.api.reconnect_delay_ms == 0 {
            errors.push("api.reconnect_delay_ms must be greater than 0".to_string());
        }
        if self.session.key_prefix.trim().is_empty() {
            errors.push("session.key_prefix must not be empty".to_string());
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            errors.push(format!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid")
}

fn default_state_path() -> PathBuf {
    BaseDirs::new().map_or_else(
        || PathBuf::from("./tendj-session.json"),
        |dirs| dirs.config_dir().join("tendj").join("session.json"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            for var in [
                ENV_API_BASE_URL,
                ENV_STATE_PATH,
                ENV_STORAGE_PREFIX,
                ENV_LOG_LEVEL,
                ENV_LOG_FORMAT,
                ENV_AUTH_TOKEN,
            ] {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_config_with_defaults() {
        let config = Config::with_defaults();

        assert_eq!(config.api.base_url.as_str(), "http://localhost:8005/");
        assert_eq!(config.api.chats_path, "api/v1/chats");
        assert_eq!(config.api.send_path, "chat");
        assert_eq!(config.session.key_prefix, "10dj");
        assert!(config.chat.refetch_after_send);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn endpoint_treats_base_path_as_directory() {
        let mut api = ApiConfig::default();
        api.base_url = Url::parse("https://chat.example.com/backend").unwrap();

        assert_eq!(
            api.endpoint("api/v1/chats").unwrap().as_str(),
            "https://chat.example.com/backend/api/v1/chats"
        );
        assert_eq!(
            api.endpoint("/chat").unwrap().as_str(),
            "https://chat.example.com/backend/chat"
        );
    }

    #[test]
    #[serial]
    fn test_load_config_with_defaults() {
        cleanup_env_vars();
        let config = Config::load_config(None, None).unwrap();
        assert_eq!(config, Config::with_defaults());
    }

    #[test]
    #[serial]
    fn test_load_partial_yaml_file() {
        cleanup_env_vars();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tendj.yaml");
        fs::write(
            &path,
            "api:\n  base_url: \"https://api.example.com/\"\nchat:\n  agent_name: \"Okto\"\n",
        )
        .unwrap();

        let config = Config::load_config(Some(path), None).unwrap();

        assert_eq!(config.api.base_url.as_str(), "https://api.example.com/");
        assert_eq!(config.api.send_path, "chat");
        assert_eq!(config.chat.agent_name.as_deref(), Some("Okto"));
        assert!(config.chat.refetch_after_send);
    }

    #[test]
    #[serial]
    fn test_load_toml_and_json_files() {
        cleanup_env_vars();
        let temp_dir = TempDir::new().unwrap();

        let toml_path = temp_dir.path().join("tendj.toml");
        fs::write(&toml_path, "[logging]\nlevel = \"debug\"\nformat = \"json\"\n").unwrap();
        let config = Config::load_config(Some(toml_path), None).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);

        let json_path = temp_dir.path().join("tendj.json");
        fs::write(&json_path, r#"{"session":{"key_prefix":"dev"}}"#).unwrap();
        let config = Config::load_config(Some(json_path), None).unwrap();
        assert_eq!(config.session.key_prefix, "dev");
    }

    #[test]
    #[serial]
    fn test_unsupported_extension_is_rejected() {
        cleanup_env_vars();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tendj.ini");
        fs::write(&path, "x=1").unwrap();

        let error = Config::load_config(Some(path), None).unwrap_err();
        assert!(matches!(error, ConfigError::UnsupportedFormat(ext) if ext == "ini"));
    }

    #[test]
    #[serial]
    fn test_missing_file_reports_path() {
        cleanup_env_vars();
        let error =
            Config::load_config(Some(PathBuf::from("/nonexistent/tendj.yaml")), None).unwrap_err();
        assert!(error.to_string().contains("/nonexistent/tendj.yaml"));
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file_and_flag_overrides_environment() {
        cleanup_env_vars();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tendj.yaml");
        fs::write(
            &path,
            "api:\n  base_url: \"https://file.example.com/\"\nlogging:\n  level: warn\n",
        )
        .unwrap();

        unsafe {
            std::env::set_var(ENV_API_BASE_URL, "https://env.example.com/");
            std::env::set_var(ENV_LOG_LEVEL, "debug");
            std::env::set_var(ENV_AUTH_TOKEN, "secret");
            std::env::set_var(ENV_STATE_PATH, "/tmp/tendj-state.json");
        }

        let config = Config::load_config(Some(path.clone()), None).unwrap();
        assert_eq!(config.api.base_url.as_str(), "https://env.example.com/");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.session.auth_token.as_deref(), Some("secret"));
        assert_eq!(
            config.session.state_path,
            PathBuf::from("/tmp/tendj-state.json")
        );

        let flag = Url::parse("https://flag.example.com/").unwrap();
        let config = Config::load_config(Some(path), Some(flag)).unwrap();
        assert_eq!(config.api.base_url.as_str(), "https://flag.example.com/");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_environment_values() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var(ENV_API_BASE_URL, "not a url");
        }
        let error = Config::load_config(None, None).unwrap_err();
        assert!(error.to_string().contains(ENV_API_BASE_URL));
        cleanup_env_vars();

        unsafe {
            std::env::set_var(ENV_LOG_FORMAT, "xml");
        }
        let error = Config::load_config(None, None).unwrap_err();
        assert!(error.to_string().contains("unknown log format"));
        cleanup_env_vars();
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = Config::with_defaults();
        config.api.base_url = Url::parse("ftp://files.example.com/").unwrap();
        config.api.send_path = "  ".to_string();
        config.api.reconnect_delay_ms = 0;
        config.session.key_prefix = String::new();
        config.logging.level = "loud".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.iter().any(|e| e.contains("http or https")));
        assert!(errors.iter().any(|e| e.contains("api.send_path")));
        assert!(errors.iter().any(|e| e.contains("logging.level")));
    }

    #[test]
    fn test_render_round_trips_every_format() {
        let config = Config::with_defaults();
        for format in [ConfigFormat::Yaml, ConfigFormat::Json, ConfigFormat::Toml] {
            let rendered = config.render(format).unwrap();
            let parsed: Config = match format {
                ConfigFormat::Yaml => serde_yml::from_str(&rendered).unwrap(),
                ConfigFormat::Json => serde_json::from_str(&rendered).unwrap(),
                ConfigFormat::Toml => toml::from_str(&rendered).unwrap(),
            };
            assert_eq!(parsed, config, "format {format:?}");
        }
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("YML".parse::<ConfigFormat>().unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::Toml.file_name(), "config.toml");
        assert!("ini".parse::<ConfigFormat>().is_err());
    }
}
