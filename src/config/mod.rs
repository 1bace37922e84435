//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, EngineSettings, LogFormat, LoggingConfig, MetricsConfig, PipelineConfig,
    ServerConfig, ServicesConfig, StorageBackend, StorageConfig,
};
