use serde::Deserialize;

use crate::domain::TargetService;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    #[serde(alias = "memory", alias = "inmemory")]
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Base URLs of the target services
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServicesConfig {
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default)]
    pub narrative: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
}

impl ServicesConfig {
    pub fn base_url(&self, service: TargetService) -> Option<&str> {
        match service {
            TargetService::Character => self.character.as_deref(),
            TargetService::Scene => self.scene.as_deref(),
            TargetService::Item => self.item.as_deref(),
            TargetService::Narrative => self.narrative.as_deref(),
            TargetService::Intent => self.intent.as_deref(),
        }
    }
}

/// Execution engine limits
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_max_jumps")]
    pub max_jumps: usize,
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    #[serde(default)]
    pub run_timeout_ms: Option<u64>,
}

/// Prometheus metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

/// External pipeline runner
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_pipeline_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_max_jumps() -> usize {
    50
}

fn default_max_chain_depth() -> usize {
    8
}

fn default_step_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_pipeline_timeout_ms() -> u64 {
    300_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_jumps: default_max_jumps(),
            max_chain_depth: default_max_chain_depth(),
            step_timeout_ms: default_step_timeout_ms(),
            run_timeout_ms: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_pipeline_timeout_ms(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::InMemory);
        assert_eq!(config.engine.max_jumps, 50);
        assert_eq!(config.engine.max_chain_depth, 8);
        assert_eq!(config.engine.step_timeout_ms, 10_000);
        assert!(config.engine.run_timeout_ms.is_none());
        assert!(config.metrics.enabled);
        assert!(config.pipeline.url.is_none());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "storage": {"backend": "postgres", "database_url": "postgres://localhost/chains"},
            "services": {"intent": "http://intent:3000"},
            "engine": {"max_jumps": 5},
            "logging": {"level": "debug", "format": "json"}
        }))
        .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Postgres);
        assert_eq!(config.storage.max_connections, 10);
        assert_eq!(config.engine.max_jumps, 5);
        assert_eq!(config.engine.max_chain_depth, 8);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.services.base_url(TargetService::Intent),
            Some("http://intent:3000")
        );
        assert!(config.services.base_url(TargetService::Scene).is_none());
    }
}
