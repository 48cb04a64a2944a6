//! Provider registry initialization and management

use crate::config::{AnnotatorConfig, SourcesConfig};
use crate::source::{AnnotationSource, SourceDescriptor};
use crate::sources::{
    CloudSource, DisabledSource, InferenceBackend, LocalModelSource, OnDeviceSource,
    ProcessBackend, LOCAL_MODEL_ID,
};
use serde::Serialize;
use smsguard_core::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// A registered source and its live availability flag
pub struct RegistryEntry {
    source: Arc<dyn AnnotationSource>,
    available: AtomicBool,
}

impl RegistryEntry {
    pub fn source(&self) -> &Arc<dyn AnnotationSource> {
        &self.source
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        self.source.descriptor()
    }

    /// Whether the source is installed and enabled
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }
}

/// Point-in-time view of one registry entry
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    #[serde(flatten)]
    pub descriptor: SourceDescriptor,
    pub available: bool,
}

/// Registry of known annotation sources.
///
/// The set of sources is fixed once built; only the per-source availability
/// flags change afterwards, and only through `set_available`.
#[derive(Default)]
pub struct ProviderRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source; ids must be unique
    pub fn register(&mut self, source: Arc<dyn AnnotationSource>, available: bool) -> Result<()> {
        let source_id = source.source_id().to_string();
        if self.entries.contains_key(&source_id) {
            return Err(Error::config(format!(
                "Annotation source '{}' registered twice",
                source_id
            )));
        }

        info!(
            source = %source_id,
            priority = source.descriptor().default_priority,
            requires_network = source.descriptor().requires_network,
            available,
            "registered annotation source"
        );

        self.entries.insert(
            source_id,
            RegistryEntry {
                source,
                available: AtomicBool::new(available),
            },
        );
        Ok(())
    }

    /// Builder-style registration
    pub fn with_source(mut self, source: Arc<dyn AnnotationSource>, available: bool) -> Result<Self> {
        self.register(source, available)?;
        Ok(self)
    }

    /// Update a source's availability flag
    pub fn set_available(&self, source_id: &str, available: bool) -> Result<()> {
        let entry = self
            .entries
            .get(source_id)
            .ok_or_else(|| Error::config(format!("Unknown annotation source '{}'", source_id)))?;
        let previous = entry.available.swap(available, Ordering::AcqRel);
        if previous != available {
            info!(source = source_id, available, "source availability changed");
        }
        Ok(())
    }

    pub fn get(&self, source_id: &str) -> Option<&RegistryEntry> {
        self.entries.get(source_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    /// Get the number of registered sources
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered source ids in lexical order
    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of all entries, ordered by source id
    pub fn snapshot(&self) -> Vec<RegistrySnapshot> {
        let mut snapshot: Vec<RegistrySnapshot> = self
            .entries
            .values()
            .map(|e| RegistrySnapshot {
                descriptor: e.descriptor().clone(),
                available: e.is_available(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.descriptor.source_id.cmp(&b.descriptor.source_id));
        snapshot
    }
}

/// Build the registry described by configuration.
///
/// `backend` overrides the local model runtime; without it the configured
/// runner process is used. A source that fails to initialise is logged and
/// left out rather than failing the whole registry.
pub fn build_registry_from_config(
    config: &AnnotatorConfig,
    backend: Option<Arc<dyn InferenceBackend>>,
) -> Result<ProviderRegistry> {
    let SourcesConfig {
        on_device,
        local_model,
        cloud,
        disabled,
    } = &config.sources;
    let mut registry = ProviderRegistry::new();

    if on_device.enabled {
        match OnDeviceSource::new(on_device.gazetteer.clone(), on_device.priority) {
            Ok(source) => registry.register(Arc::new(source), true)?,
            Err(e) => warn!("✗ Failed to initialise on-device source: {}", e),
        }
    }

    if local_model.enabled {
        let backend = backend.or_else(|| {
            local_model.runner.clone().map(|runner| {
                Arc::new(ProcessBackend::new(runner.into_backend_config(&local_model.model_path)))
                    as Arc<dyn InferenceBackend>
            })
        });
        match backend {
            Some(backend) => registry.register(
                Arc::new(LocalModelSource::new(backend, local_model.priority)),
                true,
            )?,
            None => warn!(
                "✗ {} enabled but no inference backend or runner configured",
                LOCAL_MODEL_ID
            ),
        }
    }

    if let Some(cloud) = cloud.as_ref().filter(|c| c.enabled) {
        match CloudSource::new(cloud.resolved_connection(), cloud.priority) {
            Ok(source) => registry.register(Arc::new(source), true)?,
            Err(e) => warn!("✗ Failed to initialise cloud source: {}", e),
        }
    }

    if *disabled {
        registry.register(Arc::new(DisabledSource::new()), true)?;
    }

    info!("Provider registry initialized with {} sources", registry.len());

    Ok(registry)
}
