//! Configuration for annotation sources, selection and orchestration

use crate::filter::FilterConfig;
use crate::merge::MergeConfig;
use crate::orchestrator::{ExecutionMode, OrchestratorConfig};
use crate::policy::{PriorityOrder, ProviderMode};
use crate::sources::{CloudSourceConfig, Gazetteer, ProcessBackendConfig, LOCAL_MODEL_ID};
use serde::{Deserialize, Serialize};
use smsguard_core::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level annotator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    /// Provider mode at startup
    #[serde(default)]
    pub mode: ProviderMode,

    /// How source priorities are ranked
    #[serde(default)]
    pub priority_order: PriorityOrder,

    /// Sequential fallback or tiered concurrent execution
    #[serde(default)]
    pub execution: ExecutionMode,

    /// Per-provider timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub environment: EnvironmentConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub filter: FilterConfig,
}

/// Initial environment state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_true")]
    pub network_available: bool,

    #[serde(default = "default_true")]
    pub wifi_only_download: bool,

    /// Installed model files by source id
    #[serde(default)]
    pub model_files: HashMap<String, PathBuf>,
}

/// Per-variant source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub on_device: OnDeviceConfig,

    #[serde(default)]
    pub local_model: LocalModelConfig,

    /// Remote API; absent means no cloud source
    #[serde(default)]
    pub cloud: Option<CloudConfig>,

    /// Register the no-op `none` source
    #[serde(default = "default_true")]
    pub disabled: bool,
}

/// On-device pattern model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnDeviceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_on_device_priority")]
    pub priority: i32,

    #[serde(default)]
    pub gazetteer: Gazetteer,
}

/// Local model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModelConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_local_model_priority")]
    pub priority: i32,

    /// Model weights; the model counts as ready once this file exists
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Runner process used when no in-process backend is supplied
    #[serde(default)]
    pub runner: Option<RunnerConfig>,
}

/// Model runner executable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub command: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,
}

impl RunnerConfig {
    /// Backend configuration for the given model file
    pub fn into_backend_config(self, model_path: &Path) -> ProcessBackendConfig {
        ProcessBackendConfig {
            command: self.command,
            args: self.args,
            model_path: model_path.to_path_buf(),
        }
    }
}

/// Remote annotation API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cloud_priority")]
    pub priority: i32,

    /// Environment variable holding the bearer token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(flatten)]
    pub connection: CloudSourceConfig,
}

impl CloudConfig {
    /// Enabled cloud source at its default priority
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            enabled: true,
            priority: default_cloud_priority(),
            api_key_env: default_api_key_env(),
            connection: CloudSourceConfig::new(endpoint),
        }
    }

    /// Connection settings with the API key resolved from the environment
    /// when the file does not carry one
    pub fn resolved_connection(&self) -> CloudSourceConfig {
        let mut connection = self.connection.clone();
        if connection.api_key.is_none() {
            connection.api_key = std::env::var(&self.api_key_env)
                .ok()
                .filter(|key| !key.is_empty());
        }
        connection
    }
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            mode: ProviderMode::default(),
            priority_order: PriorityOrder::default(),
            execution: ExecutionMode::default(),
            timeout_ms: default_timeout_ms(),
            merge: MergeConfig::default(),
            environment: EnvironmentConfig::default(),
            sources: SourcesConfig::default(),
            filter: FilterConfig::default(),
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            network_available: true,
            wifi_only_download: true,
            model_files: HashMap::new(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            on_device: OnDeviceConfig::default(),
            local_model: LocalModelConfig::default(),
            cloud: None,
            disabled: true,
        }
    }
}

impl Default for OnDeviceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: default_on_device_priority(),
            gazetteer: Gazetteer::default(),
        }
    }
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: default_local_model_priority(),
            model_path: default_model_path(),
            runner: None,
        }
    }
}

impl AnnotatorConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Invalid annotator config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Check value ranges serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::config("timeout_ms must be greater than zero"));
        }
        let threshold = self.merge.overlap_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::config(format!(
                "merge.overlap_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        let toxicity = self.filter.toxicity_threshold;
        if !(0.0..=1.0).contains(&toxicity) {
            return Err(Error::config(format!(
                "filter.toxicity_threshold must be within [0, 1], got {}",
                toxicity
            )));
        }
        if let Some(cloud) = self.sources.cloud.as_ref().filter(|c| c.enabled) {
            if cloud.connection.endpoint.trim().is_empty() {
                return Err(Error::config("sources.cloud.endpoint must not be empty"));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Orchestrator settings
    pub fn to_orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            timeout: self.timeout(),
            execution: self.execution,
            merge: self.merge.clone(),
        }
    }

    /// Environment settings, including the local model file when enabled
    pub fn environment_config(&self) -> EnvironmentConfig {
        let mut environment = self.environment.clone();
        if self.sources.local_model.enabled {
            environment
                .model_files
                .entry(LOCAL_MODEL_ID.to_string())
                .or_insert_with(|| self.sources.local_model.model_path.clone());
        }
        environment
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    3_000
}

fn default_on_device_priority() -> i32 {
    200
}

fn default_local_model_priority() -> i32 {
    100
}

fn default_cloud_priority() -> i32 {
    200
}

fn default_model_path() -> PathBuf {
    PathBuf::from("./models/ner.bin")
}

fn default_api_key_env() -> String {
    "SMSGUARD_API_KEY".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnnotatorConfig::default();
        assert_eq!(config.mode, ProviderMode::Auto);
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(config.execution, ExecutionMode::Sequential);
        assert!(config.sources.on_device.enabled);
        assert!(config.sources.cloud.is_none());
        assert!(config.sources.disabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
mode: local-model
priority_order: higher_first
execution: tiered
timeout_ms: 500
merge:
  overlap_threshold: 0.5
sources:
  on_device:
    priority: 50
    gazetteer:
      people: ["Alice"]
  local_model:
    model_path: /opt/models/ner.bin
    runner:
      command: /usr/local/bin/ner-runner
      args: ["--threads", "2"]
  cloud:
    endpoint: https://api.example.com/annotate
    max_retries: 4
"#;

        let config = AnnotatorConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.mode, ProviderMode::Explicit("local-model".to_string()));
        assert_eq!(config.priority_order, PriorityOrder::HigherFirst);
        assert_eq!(config.execution, ExecutionMode::Tiered);
        assert_eq!(config.timeout_ms, 500);
        assert_eq!(config.merge.overlap_threshold, 0.5);
        assert_eq!(config.sources.on_device.priority, 50);
        assert_eq!(config.sources.on_device.gazetteer.people, vec!["Alice"]);
        assert!(config.sources.on_device.gazetteer.locations.is_empty());

        let runner = config.sources.local_model.runner.clone().unwrap();
        let backend = runner.into_backend_config(&config.sources.local_model.model_path);
        assert_eq!(backend.args, vec!["--threads", "2"]);
        assert_eq!(backend.model_path, PathBuf::from("/opt/models/ner.bin"));

        let cloud = config.sources.cloud.as_ref().unwrap();
        assert!(cloud.enabled);
        assert_eq!(cloud.priority, 200);
        assert_eq!(cloud.connection.max_retries, 4);
        assert_eq!(cloud.connection.retry_backoff_ms, 100);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AnnotatorConfig::from_yaml("timeout_ms: 0").is_err());
        assert!(AnnotatorConfig::from_yaml("merge:\n  overlap_threshold: 1.5").is_err());
        assert!(AnnotatorConfig::from_yaml("mode: ''").is_err());
        assert!(AnnotatorConfig::from_yaml("execution: parallel").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smsguard.yaml");
        std::fs::write(&path, "mode: off\n").unwrap();

        let config = AnnotatorConfig::from_file(&path).unwrap();
        assert_eq!(config.mode, ProviderMode::Off);

        assert!(matches!(
            AnnotatorConfig::from_file(dir.path().join("missing.yaml")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_environment_config_includes_local_model() {
        let config = AnnotatorConfig::default();
        let environment = config.environment_config();
        assert_eq!(
            environment.model_files.get(LOCAL_MODEL_ID),
            Some(&PathBuf::from("./models/ner.bin"))
        );

        let mut config = AnnotatorConfig::default();
        config.sources.local_model.enabled = false;
        assert!(config.environment_config().model_files.is_empty());
    }

    #[test]
    fn test_cloud_api_key_from_file_wins() {
        let yaml = r#"
sources:
  cloud:
    endpoint: http://localhost:8080/annotate
    api_key: inline-key
    api_key_env: SMSGUARD_TEST_UNSET_KEY
"#;
        let config = AnnotatorConfig::from_yaml(yaml).unwrap();
        let connection = config.sources.cloud.unwrap().resolved_connection();
        assert_eq!(connection.api_key.as_deref(), Some("inline-key"));
    }
}
