//! CLI configuration loading

use crate::Cli;
use smsguard_annotators::{AnnotatorConfig, CloudConfig, ExecutionMode};
use std::path::Path;
use tracing::info;

/// Load configuration from file and apply CLI overrides.
///
/// A missing file is not an error; built-in defaults are used instead.
pub fn load(config_path: &str, cli: &Cli) -> anyhow::Result<AnnotatorConfig> {
    let mut config = if Path::new(config_path).exists() {
        info!("Loading configuration from {}", config_path);
        AnnotatorConfig::from_file(config_path)?
    } else {
        AnnotatorConfig::default()
    };

    if let Some(mode) = &cli.mode {
        config.mode = mode.parse()?;
    }

    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }

    if cli.tiered {
        config.execution = ExecutionMode::Tiered;
    }

    if let Some(endpoint) = &cli.cloud_endpoint {
        match config.sources.cloud.as_mut() {
            Some(cloud) => {
                cloud.enabled = true;
                cloud.connection.endpoint = endpoint.clone();
            }
            None => config.sources.cloud = Some(CloudConfig::new(endpoint.clone())),
        }
    }

    if cli.offline {
        config.environment.network_available = false;
    }

    config.validate()?;
    Ok(config)
}
