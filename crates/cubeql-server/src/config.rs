//! Configuration for the CubeQL server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, warehouse, model, logging, registry)
//! 2. .env file - secrets (API keys)
//!
//! Environment variables always override config.yaml values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
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
    InvalidEnvVar { name: &'static str, value: String },
}

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
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// DuckDB database file; in-memory when unset
    pub database: Option<String>,

    pub query_timeout_secs: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            database: None,
            query_timeout_secs: 30,
        }
    }
}

impl WarehouseConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub timeout_secs: u64,
    /// SQL dialect named in the prompt
    pub dialect: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
            dialect: "DuckDB".to_string(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

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

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Every `*.xml` schema here is registered at startup
    pub schema_dir: Option<PathBuf>,

    /// JSON snapshot restored at startup and rewritten after each upload
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Drill sessions held at once; the least recently used is dropped beyond this
    pub max_sessions: usize,

    /// Sessions untouched this long are dropped
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1024,
            idle_timeout_secs: 3600,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub warehouse: WarehouseConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
    pub registry: RegistryConfig,
    pub sessions: SessionConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), falling back to defaults when the file is absent
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            return Self::load(path);
        }
        let mut config = Config::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("CUBEQL_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_env("CUBEQL_SERVER_PORT")? {
            self.server.port = port;
        }

        if let Ok(database) = std::env::var("CUBEQL_DATABASE") {
            self.warehouse.database = Some(database);
        }
        if let Some(secs) = parse_env("CUBEQL_QUERY_TIMEOUT_SECS")? {
            self.warehouse.query_timeout_secs = secs;
        }

        if let Ok(model) = std::env::var("CUBEQL_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(secs) = parse_env("CUBEQL_LLM_TIMEOUT_SECS")? {
            self.llm.timeout_secs = secs;
        }

        if let Ok(dir) = std::env::var("CUBEQL_SCHEMA_DIR") {
            self.registry.schema_dir = Some(PathBuf::from(dir));
        }
        if let Ok(path) = std::env::var("CUBEQL_REGISTRY_SNAPSHOT") {
            self.registry.snapshot = Some(PathBuf::from(path));
        }

        if let Some(max) = parse_env("CUBEQL_MAX_SESSIONS")? {
            self.sessions.max_sessions = max;
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

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar { name, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.warehouse.database, None);
        assert_eq!(config.warehouse.query_timeout(), Duration::from_secs(30));
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.logging.level, "info");
        assert!(config.registry.snapshot.is_none());
        assert_eq!(config.sessions.max_sessions, 1024);
        assert_eq!(config.sessions.idle_timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            r#"
warehouse:
  database: "data/retail.duckdb"
llm:
  timeout_secs: 10
"#,
        )
        .unwrap();
        assert_eq!(config.warehouse.database.as_deref(), Some("data/retail.duckdb"));
        assert_eq!(config.warehouse.query_timeout_secs, 30);
        assert_eq!(config.llm.timeout(), Duration::from_secs(10));
        assert_eq!(config.llm.dialect, "DuckDB");
        assert_eq!(config.server.port, 8080);
    }

    // Every env-dependent assertion lives in one test so parallel tests never race
    #[test]
    fn test_env_var_override() {
        let config_yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080
registry:
  schema_dir: "./schemas"
"#;
        let temp_file = std::env::temp_dir().join("cubeql_test_config.yaml");
        std::fs::write(&temp_file, config_yaml).unwrap();

        std::env::set_var("CUBEQL_SERVER_PORT", "9090");
        std::env::set_var("CUBEQL_LLM_MODEL", "gpt-4o");
        let config = Config::load(&temp_file).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.registry.schema_dir, Some(PathBuf::from("./schemas")));

        std::env::set_var("CUBEQL_SERVER_PORT", "not-a-port");
        let err = Config::load(&temp_file).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { name: "CUBEQL_SERVER_PORT", .. }));

        std::env::remove_var("CUBEQL_SERVER_PORT");
        std::env::remove_var("CUBEQL_LLM_MODEL");
        std::fs::remove_file(temp_file).ok();

        let missing = std::env::temp_dir().join("cubeql_no_such_config.yaml");
        let config = Config::load_or_default(&missing).unwrap();
        assert_eq!(config.server.port, 8080);
    }
}
