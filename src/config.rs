use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Source of a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    pub fn default_value(value: T) -> Self {
        Self::new(value, ConfigSource::Default)
    }

    fn set(&mut self, value: T, source: ConfigSource) {
        self.value = value;
        self.source = source;
    }
}

/// Sync configuration
#[derive(Debug, Clone, Serialize)]
pub struct SyncConfig {
    /// Backend base URL (e.g., "http://localhost:8080")
    pub server_url: ConfigValue<Option<String>>,
    /// API key sent as a bearer token
    pub api_key: ConfigValue<Option<String>>,
    /// Sync the affected collection after every local write
    pub auto_sync: ConfigValue<bool>,
    /// Per-request timeout
    pub timeout_secs: ConfigValue<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: ConfigValue::default_value(None),
            api_key: ConfigValue::default_value(None),
            auto_sync: ConfigValue::default_value(false),
            timeout_secs: ConfigValue::default_value(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl SyncConfig {
    /// Returns true if sync is configured (has both server_url and api_key)
    pub fn is_configured(&self) -> bool {
        self.server_url.value.is_some() && self.api_key.value.is_some()
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub sync: SyncConfig,
}

/// Internal structs for deserializing the config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    sync: Option<SyncFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SyncFile {
    server_url: Option<String>,
    api_key: Option<String>,
    auto_sync: Option<bool>,
    timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    fn load_with_env(
        config_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut database_path =
            ConfigValue::default_value(Self::default_data_dir().join("mintboard.db"));
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            if let Some(db_path) = file_config.database_path {
                database_path.set(resolve_relative(&path, db_path), ConfigSource::File);
            }
            if let Some(file_sync) = file_config.sync {
                if let Some(url) = file_sync.server_url {
                    sync.server_url.set(Some(url), ConfigSource::File);
                }
                if let Some(key) = file_sync.api_key {
                    sync.api_key.set(Some(key), ConfigSource::File);
                }
                if let Some(auto) = file_sync.auto_sync {
                    sync.auto_sync.set(auto, ConfigSource::File);
                }
                if let Some(secs) = file_sync.timeout_secs {
                    sync.timeout_secs.set(secs, ConfigSource::File);
                }
            }

            config_file = Some(path);
        }

        // Apply environment variable overrides
        if let Some(db_path) = env("MINTBOARD_DATABASE_PATH") {
            database_path.set(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Some(url) = env("MINTBOARD_SYNC_URL") {
            sync.server_url.set(Some(url), ConfigSource::Environment);
        }
        if let Some(key) = env("MINTBOARD_SYNC_API_KEY") {
            sync.api_key.set(Some(key), ConfigSource::Environment);
        }
        if let Some(raw) = env("MINTBOARD_AUTO_SYNC") {
            let auto = parse_bool(&raw).ok_or_else(|| ConfigError::InvalidEnv {
                name: "MINTBOARD_AUTO_SYNC",
                value: raw.clone(),
            })?;
            sync.auto_sync.set(auto, ConfigSource::Environment);
        }

        Ok(Self {
            database_path,
            config_file,
            sync,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/mintboard/
    /// - macOS: ~/Library/Application Support/mintboard/
    /// - Windows: %APPDATA%/mintboard/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mintboard")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/mintboard/
    /// - macOS: ~/Library/Application Support/mintboard/
    /// - Windows: %APPDATA%/mintboard/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mintboard")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

// Relative paths in the file are relative to the file itself
fn resolve_relative(config_path: &Path, value: PathBuf) -> PathBuf {
    if value.is_relative() {
        config_path
            .parent()
            .map(|p| p.join(&value))
            .unwrap_or(value)
    } else {
        value
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidEnv { name: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidEnv { name, value } => {
                write!(f, "Invalid value '{}' for {}", value, name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load_with_env(Some(config_path), no_env).unwrap();
        assert!(config
            .database_path
            .value
            .to_string_lossy()
            .contains("mintboard.db"));
        assert_eq!(config.database_path.source, ConfigSource::Default);
        assert!(config.config_file.is_none());
        assert!(!config.sync.is_configured());
        assert!(!config.sync.auto_sync.value);
        assert_eq!(config.sync.timeout_secs.value, 30);
        assert_eq!(config.sync.timeout_secs.source, ConfigSource::Default);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path: data/board.db").unwrap();
        writeln!(file, "sync:").unwrap();
        writeln!(file, "  server_url: http://localhost:8080").unwrap();
        writeln!(file, "  api_key: secret").unwrap();
        writeln!(file, "  auto_sync: true").unwrap();

        let config = Config::load_with_env(Some(config_path.clone()), no_env).unwrap();
        assert_eq!(
            config.database_path.value,
            temp_dir.path().join("data/board.db")
        );
        assert_eq!(config.database_path.source, ConfigSource::File);
        assert!(config.sync.is_configured());
        assert_eq!(config.sync.server_url.source, ConfigSource::File);
        assert!(config.sync.auto_sync.value);
        // Untouched keys keep their defaults
        assert_eq!(config.sync.timeout_secs.source, ConfigSource::Default);
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "sync:\n  server_url: http://fromfile\n").unwrap();

        let env: HashMap<&str, &str> = [
            ("MINTBOARD_SYNC_URL", "http://fromenv"),
            ("MINTBOARD_DATABASE_PATH", "/tmp/env.db"),
            ("MINTBOARD_AUTO_SYNC", "yes"),
        ]
        .into_iter()
        .collect();

        let config = Config::load_with_env(Some(config_path), |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();
        assert_eq!(
            config.sync.server_url.value.as_deref(),
            Some("http://fromenv")
        );
        assert_eq!(config.sync.server_url.source, ConfigSource::Environment);
        assert_eq!(config.database_path.value, PathBuf::from("/tmp/env.db"));
        assert!(config.sync.auto_sync.value);
        assert_eq!(config.sync.auto_sync.source, ConfigSource::Environment);
    }

    #[test]
    fn test_invalid_auto_sync_env() {
        let temp_dir = tempdir().unwrap();
        let result = Config::load_with_env(Some(temp_dir.path().join("none.yaml")), |key| {
            (key == "MINTBOARD_AUTO_SYNC").then(|| "maybe".to_string())
        });
        let err = result.unwrap_err();
        assert!(err.to_string().contains("MINTBOARD_AUTO_SYNC"));
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "sync: [not, a, map").unwrap();

        let result = Config::load_with_env(Some(config_path), no_env);
        assert!(matches!(result, Err(ConfigError::ParseError(_, _))));
    }
}
