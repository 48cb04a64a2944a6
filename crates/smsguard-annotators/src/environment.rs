//! Collaborator interfaces and the process-wide environment.
//!
//! The selection policy reads model readiness, user preferences and
//! connectivity through the traits below. [`Environment`] implements all
//! three with read-mostly state: it is initialised once from configuration
//! and then updated only through its setters (model download finished,
//! connectivity changed, user picked a provider). Readers always see a
//! consistent snapshot of each individual flag.

use crate::config::EnvironmentConfig;
use crate::policy::ProviderMode;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::info;

/// Model lifecycle manager (download/verification lives elsewhere)
pub trait ModelLifecycle: Send + Sync {
    /// Whether the model backing `source_id` is installed and usable
    fn is_model_ready(&self, source_id: &str) -> bool;

    /// Total bytes of installed models
    fn model_size_bytes(&self) -> u64;
}

/// User preference store
pub trait PreferencesStore: Send + Sync {
    /// Current provider mode
    fn selected_mode(&self) -> ProviderMode;

    /// Observe provider mode changes
    fn subscribe_mode(&self) -> watch::Receiver<ProviderMode>;

    /// Whether model downloads are restricted to Wi-Fi.
    ///
    /// Selection never reads this; readiness comes from
    /// [`ModelLifecycle::is_model_ready`]. It is carried for whatever schedules
    /// model downloads and is reported by the CLI `status` command.
    fn wifi_only_download(&self) -> bool;
}

/// Connectivity check
pub trait Connectivity: Send + Sync {
    fn is_network_available(&self) -> bool;
}

/// In-process implementation of the collaborator interfaces
pub struct Environment {
    mode: watch::Sender<ProviderMode>,
    wifi_only_download: AtomicBool,
    network_available: AtomicBool,
    /// Ready models by source id, with their size on disk
    models: RwLock<HashMap<String, u64>>,
}

impl Environment {
    /// Create an environment with the given initial mode
    pub fn new(mode: ProviderMode) -> Self {
        let (sender, _) = watch::channel(mode);
        Self {
            mode: sender,
            wifi_only_download: AtomicBool::new(true),
            network_available: AtomicBool::new(true),
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Initialise from configuration at startup.
    ///
    /// Each configured model file that exists on disk is marked ready.
    pub fn from_config(config: &EnvironmentConfig, mode: ProviderMode) -> Self {
        let env = Self::new(mode);
        env.set_network_available(config.network_available);
        env.set_wifi_only_download(config.wifi_only_download);

        for (source_id, path) in &config.model_files {
            match model_file_size(path) {
                Some(size) => env.mark_model_ready(source_id, size),
                None => info!(
                    source = %source_id,
                    path = %path.display(),
                    "model not installed"
                ),
            }
        }

        env
    }

    /// Change the provider mode and notify subscribers
    pub fn set_mode(&self, mode: ProviderMode) {
        info!(%mode, "provider mode changed");
        self.mode.send_replace(mode);
    }

    pub fn set_wifi_only_download(&self, wifi_only: bool) {
        self.wifi_only_download.store(wifi_only, Ordering::Release);
    }

    pub fn set_network_available(&self, available: bool) {
        let previous = self.network_available.swap(available, Ordering::AcqRel);
        if previous != available {
            info!(available, "network availability changed");
        }
    }

    /// Record a completed model download
    pub fn mark_model_ready(&self, source_id: &str, size_bytes: u64) {
        info!(source = source_id, size_bytes, "model ready");
        self.models.write().insert(source_id.to_string(), size_bytes);
    }

    /// Record a model removal
    pub fn mark_model_removed(&self, source_id: &str) {
        if self.models.write().remove(source_id).is_some() {
            info!(source = source_id, "model removed");
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(ProviderMode::default())
    }
}

impl ModelLifecycle for Environment {
    fn is_model_ready(&self, source_id: &str) -> bool {
        self.models.read().contains_key(source_id)
    }

    fn model_size_bytes(&self) -> u64 {
        self.models.read().values().sum()
    }
}

impl PreferencesStore for Environment {
    fn selected_mode(&self) -> ProviderMode {
        self.mode.borrow().clone()
    }

    fn subscribe_mode(&self) -> watch::Receiver<ProviderMode> {
        self.mode.subscribe()
    }

    fn wifi_only_download(&self) -> bool {
        self.wifi_only_download.load(Ordering::Acquire)
    }
}

impl Connectivity for Environment {
    fn is_network_available(&self) -> bool {
        self.network_available.load(Ordering::Acquire)
    }
}

fn model_file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_model_lifecycle() {
        let env = Environment::default();
        assert!(!env.is_model_ready("local-model"));
        assert_eq!(env.model_size_bytes(), 0);

        env.mark_model_ready("local-model", 4096);
        assert!(env.is_model_ready("local-model"));
        assert_eq!(env.model_size_bytes(), 4096);

        env.mark_model_removed("local-model");
        assert!(!env.is_model_ready("local-model"));
    }

    #[test]
    fn test_connectivity_updates() {
        let env = Environment::default();
        assert!(env.is_network_available());

        env.set_network_available(false);
        assert!(!env.is_network_available());
    }

    #[tokio::test]
    async fn test_mode_subscription() {
        let env = Environment::new(ProviderMode::Auto);
        let mut rx = env.subscribe_mode();

        env.set_mode(ProviderMode::Off);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ProviderMode::Off);
        assert_eq!(env.selected_mode(), ProviderMode::Off);
    }

    #[test]
    fn test_from_config_detects_model_files() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("ner.bin");
        std::fs::write(&model, vec![0u8; 128]).unwrap();

        let mut config = EnvironmentConfig::default();
        config.network_available = false;
        config.wifi_only_download = false;
        config.model_files.insert("local-model".to_string(), model);
        config
            .model_files
            .insert("other-model".to_string(), PathBuf::from("/nonexistent/model.bin"));

        let env = Environment::from_config(&config, ProviderMode::Auto);

        assert!(env.is_model_ready("local-model"));
        assert!(!env.is_model_ready("other-model"));
        assert_eq!(env.model_size_bytes(), 128);
        assert!(!env.is_network_available());
        assert!(!env.wifi_only_download());
    }
}
