//! Configuration system for the sqlask server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, database, datasets, model, logging)
//! 2. .env file - secrets (API keys)
//!
//! Environment variables always override config.yaml values. A missing
//! config.yaml falls back to defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidEnvVar { name: String, value: String },
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// DuckDB database file; in-memory when unset
    pub path: Option<String>,
}

/// Dataset file handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetsConfig {
    /// Where uploads are written as `<id>.<ext>`
    pub directory: String,

    /// Load `<directory>/<id>.<ext>` when a queried table does not exist yet
    pub lazy_registration: bool,

    /// Largest accepted upload body
    pub max_upload_mb: usize,
}

impl Default for DatasetsConfig {
    fn default() -> Self {
        Self {
            directory: "./uploads".to_string(),
            lazy_registration: true,
            max_upload_mb: 100,
        }
    }
}

impl DatasetsConfig {
    pub fn directory_path(&self) -> PathBuf {
        PathBuf::from(&self.directory)
    }
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,

    /// OpenAI-compatible endpoint; the public API when unset
    pub base_url: Option<String>,

    pub timeout_secs: u64,

    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            timeout_secs: 60,
            temperature: 0.0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub datasets: DatasetsConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            return Self::load(path);
        }
        let mut config = Config::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("SQLASK_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_env("SQLASK_SERVER_PORT")? {
            self.server.port = port;
        }

        if let Ok(path) = std::env::var("SQLASK_DATABASE_PATH") {
            self.database.path = Some(path).filter(|p| !p.is_empty());
        }

        if let Ok(dir) = std::env::var("SQLASK_DATA_DIR") {
            self.datasets.directory = dir;
        }
        if let Some(lazy) = parse_env("SQLASK_LAZY_REGISTRATION")? {
            self.datasets.lazy_registration = lazy;
        }

        if let Ok(model) = std::env::var("SQLASK_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(url) = std::env::var("SQLASK_LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(timeout) = parse_env("SQLASK_LLM_TIMEOUT_SECS")? {
            self.llm.timeout_secs = timeout;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }

        Ok(())
    }

    /// Get OpenAI API key from environment (must be in .env)
    pub fn get_openai_api_key() -> Result<String, ConfigError> {
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
