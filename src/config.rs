//! Server configuration
//!
//! Built-in defaults, then an optional TOML file named by `F1_PREDICTOR_CONFIG`,
//! then the process environment (`API_PORT`, `MODEL_PATH`, `CORS_ORIGINS`, ...).

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an optional TOML config file
pub const CONFIG_FILE_VAR: &str = "F1_PREDICTOR_CONFIG";

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub api_host: String,
    pub api_port: u16,
    /// Pipeline artifact to serve
    pub model_path: PathBuf,
    /// Pin the artifact version; loading fails on any other version
    #[serde(default)]
    pub model_version: Option<String>,
    /// Tracing filter directive (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Maximum races accepted by `/predict/batch`
    pub max_batch_size: usize,
    /// Comma-separated browser origins allowed to call the API; `*` allows any
    pub cors_origins: String,
}

impl ServerConfig {
    /// Load from defaults, the optional config file and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var(CONFIG_FILE_VAR).ok().map(PathBuf::from);
        Self::from_sources(file.as_deref(), None)
    }

    /// Build from an optional file and an explicit environment map
    ///
    /// `env = None` reads the process environment.
    pub fn from_sources(
        file: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("api_host", "0.0.0.0")?
            .set_default("api_port", 8000_i64)?
            .set_default("model_path", "models/sample_pipeline.json")?
            .set_default("log_level", "info")?
            .set_default("log_format", "pretty")?
            .set_default("max_batch_size", 64_i64)?
            .set_default("cors_origins", "*")?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        let config: ServerConfig = builder
            .add_source(Environment::default().source(env))
            .build()?
            .try_deserialize()?;

        if config.max_batch_size == 0 {
            return Err(ConfigError::Message(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    /// `cors_origins` split into trimmed, non-empty entries
    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_sources(None, env(&[])).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.model_path, PathBuf::from("models/sample_pipeline.json"));
        assert_eq!(config.model_version, None);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.max_batch_size, 64);
        assert_eq!(config.allowed_origins(), vec!["*"]);
    }

    #[test]
    fn test_cors_origins_list() {
        let config = ServerConfig::from_sources(
            None,
            env(&[("CORS_ORIGINS", "https://dash.example.com, http://localhost:3000,")]),
        )
        .unwrap();
        assert_eq!(
            config.allowed_origins(),
            vec!["https://dash.example.com", "http://localhost:3000"]
        );
    }

    #[test]
    fn test_environment_overrides() {
        let config = ServerConfig::from_sources(
            None,
            env(&[
                ("API_PORT", "9100"),
                ("MODEL_PATH", "/srv/models/ranker.json"),
                ("MODEL_VERSION", "2024.10"),
                ("LOG_FORMAT", "json"),
                ("MAX_BATCH_SIZE", "8"),
            ]),
        )
        .unwrap();

        assert_eq!(config.api_port, 9100);
        assert_eq!(config.model_path, PathBuf::from("/srv/models/ranker.json"));
        assert_eq!(config.model_version.as_deref(), Some("2024.10"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.max_batch_size, 8);
    }

    #[test]
    fn test_file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "api_host = \"127.0.0.1\"\napi_port = 8081\nlog_level = \"debug\"\n")
            .unwrap();

        let config = ServerConfig::from_sources(Some(&path), env(&[("API_PORT", "8082")])).unwrap();
        assert_eq!(config.api_host, "127.0.0.1");
        assert_eq!(config.api_port, 8082);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(ServerConfig::from_sources(None, env(&[("API_PORT", "http")])).is_err());
        assert!(ServerConfig::from_sources(None, env(&[("MAX_BATCH_SIZE", "0")])).is_err());
        assert!(ServerConfig::from_sources(None, env(&[("LOG_FORMAT", "xml")])).is_err());
    }
}
