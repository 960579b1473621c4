//! Configuration module for Aegis Core.
//!
//! Loads service configuration from YAML files and environment variables.
//! The safety policy itself is a separate JSON document (see
//! `domain::PolicyDocument`); this module only knows where to find it.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

use crate::auth::ConfiguredApiKey;
use crate::engine::EvaluatorConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub policy: PolicyConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Where the active policy document is loaded from at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    pub path: String,
}

/// Which classifier adapter backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    /// Offline lexicon/regex adapter.
    Lexicon,
    /// Remote LLM-backed adapter.
    Remote,
}

/// Classifier adapter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    pub mode: ClassifierMode,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_classifier_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mode: ClassifierMode::Lexicon,
            api_key: String::new(),
            model: default_classifier_model(),
            base_url: default_base_url(),
            timeout_secs: default_classifier_timeout(),
        }
    }
}

/// Model backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    /// Use the real backend; with `false` (or a missing API key) the echo
    /// backend answers instead.
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_backend_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            model: default_backend_model(),
            base_url: default_base_url(),
            timeout_secs: default_backend_timeout(),
        }
    }
}

/// Telemetry pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_publish_interval")]
    pub publish_interval_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            queue_capacity: default_queue_capacity(),
            publish_interval_secs: default_publish_interval(),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_keys: Vec<ConfiguredApiKey>,
}

fn default_classifier_model() -> String {
    "meta-llama/llama-guard-4-12b".to_string()
}

fn default_backend_model() -> String {
    "meta-llama/llama-3.1-8b-instruct".to_string()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_classifier_timeout() -> u64 {
    10
}

fn default_backend_timeout() -> u64 {
    30
}

fn default_namespace() -> String {
    "aegis/gateway".to_string()
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_publish_interval() -> u64 {
    60
}

impl Config {
    /// Load configuration from files and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (AEGIS_*)
    /// 2. config/local.yaml (if exists)
    /// 3. config/default.yaml
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            // Start with default config
            .add_source(File::with_name("config/default").required(false))
            // Layer on local overrides
            .add_source(File::with_name("config/local").required(false))
            // Layer on environment variables with AEGIS_ prefix
            .add_source(
                Environment::with_prefix("AEGIS")
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
    use crate::engine::FailMode;

    #[test]
    fn test_defaults() {
        let classifier = ClassifierConfig::default();
        assert_eq!(classifier.mode, ClassifierMode::Lexicon);
        assert_eq!(classifier.timeout_secs, 10);

        let telemetry = TelemetryConfig::default();
        assert_eq!(telemetry.queue_capacity, 1024);
        assert!(!AuthConfig::default().enabled);
    }

    #[test]
    fn test_evaluator_config_deserializes() {
        let config: EvaluatorConfig = serde_json::from_str(
            r#"{
                "adapter_timeout_secs": 5,
                "topics_fail_mode": "closed",
                "filters_fail_mode": "open",
                "pii_fail_mode": "open"
            }"#,
        )
        .unwrap();
        assert_eq!(config.adapter_timeout_secs, 5);
        assert_eq!(config.topics_fail_mode, FailMode::Closed);
    }
}
