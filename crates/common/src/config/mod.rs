//! Configuration management for KBridge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// AWS / Bedrock access
    #[serde(default)]
    pub aws: AwsConfig,

    /// Retrieval defaults
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Model call settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AwsConfig {
    /// Backend provider: bedrock, mock
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Region used for retrieval and model calls
    #[serde(default = "default_region")]
    pub region: String,

    /// Static access key (falls back to the default credential chain)
    pub access_key_id: Option<String>,

    /// Static secret key, required together with `access_key_id`
    pub secret_access_key: Option<String>,

    /// Optional session token for temporary credentials
    pub session_token: Option<String>,

    /// Endpoint override (e.g. a VPC endpoint)
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Matches requested when the caller gives no limit
    #[serde(default = "default_result_limit")]
    pub default_result_limit: usize,

    /// Largest limit a caller may request
    #[serde(default = "default_max_result_limit")]
    pub max_result_limit: usize,

    /// Knowledge base used when a request names none
    pub knowledge_base_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Bedrock model id
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i32,

    /// Sampling temperature (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling (0.0 - 1.0)
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// System prompt override
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Install the Prometheus recorder and serve /metrics
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_provider() -> String { "bedrock".to_string() }
fn default_region() -> String { "us-west-2".to_string() }
fn default_result_limit() -> usize { 3 }
fn default_max_result_limit() -> usize { 100 }
fn default_model_id() -> String { "anthropic.claude-3-5-sonnet-20241022-v2:0".to_string() }
fn default_max_tokens() -> i32 { 4096 }
fn default_temperature() -> f32 { 0.7 }
fn default_top_p() -> f32 { 1.0 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_enabled() -> bool { true }
fn default_service_name() -> String { "kbridge".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint_url: None,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_result_limit: default_result_limit(),
            max_result_limit: default_max_result_limit(),
            knowledge_base_id: None,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            system_prompt: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: default_metrics_enabled(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            aws: AwsConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__AWS__REGION=eu-central-1
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject settings that would only fail later at request time
    pub fn validate(&self) -> Result<()> {
        match (&self.aws.access_key_id, &self.aws.secret_access_key) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(AppError::Configuration {
                    message: "aws.access_key_id and aws.secret_access_key must be set together"
                        .to_string(),
                });
            }
            _ => {}
        }

        if !matches!(self.aws.provider.as_str(), "bedrock" | "mock") {
            return Err(AppError::Configuration {
                message: format!("unknown aws.provider '{}'", self.aws.provider),
            });
        }

        if self.retrieval.default_result_limit == 0 {
            return Err(AppError::Configuration {
                message: "retrieval.default_result_limit must be positive".to_string(),
            });
        }

        if self.retrieval.default_result_limit > self.retrieval.max_result_limit {
            return Err(AppError::Configuration {
                message: "retrieval.default_result_limit exceeds retrieval.max_result_limit"
                    .to_string(),
            });
        }

        for (name, value) in [
            ("generation.temperature", self.generation.temperature),
            ("generation.top_p", self.generation.top_p),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::Configuration {
                    message: format!("{} must be within [0, 1], got {}", name, value),
                });
            }
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Knowledge base configured as the fallback, ignoring blank values
    pub fn default_knowledge_base(&self) -> Option<&str> {
        self.retrieval
            .knowledge_base_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}
