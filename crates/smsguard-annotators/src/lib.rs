//! SMSGuard Annotators
//!
//! Entity annotation for SMS-like messages over several interchangeable
//! providers.
//!
//! Sources are registered once in a [`ProviderRegistry`]. For each request
//! the [`SelectionPolicy`] picks the ready sources for the configured
//! [`ProviderMode`], and the [`Orchestrator`] calls them under a timeout,
//! falls back on failure, and merges their spans:
//! - `local-model`: downloaded token-classification model (preferred when ready)
//! - `on-device`: regex and gazetteer detectors, always available
//! - `cloud`: remote annotation API, only while the network is reachable
//! - `none`: explicit opt-out
//!
//! The [`MessageFilter`] adds a toxicity score and produces a verdict with
//! a redacted copy of the message.

pub mod config;
pub mod environment;
pub mod filter;
pub mod merge;
pub mod orchestrator;
pub mod policy;
pub mod registry;
pub mod source;
pub mod sources;
pub mod toxicity;

pub use config::{
    AnnotatorConfig, CloudConfig, EnvironmentConfig, LocalModelConfig, OnDeviceConfig,
    RunnerConfig, SourcesConfig,
};
pub use environment::{Connectivity, Environment, ModelLifecycle, PreferencesStore};
pub use filter::{redact, FilterAction, FilterConfig, MessageFilter, MessageVerdict};
pub use merge::{MergeConfig, SpanBatch, SpanMerger};
pub use orchestrator::{ExecutionMode, Orchestrator, OrchestratorConfig};
pub use policy::{Candidate, PriorityOrder, ProviderMode, Readiness, SelectionPolicy};
pub use registry::{build_registry_from_config, ProviderRegistry, RegistryEntry, RegistrySnapshot};
pub use source::{AnnotationSource, SourceDescriptor};
pub use toxicity::{ToxicityScorer, ToxicitySignal};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::environment::Environment;
    pub use crate::orchestrator::{ExecutionMode, Orchestrator};
    pub use crate::policy::ProviderMode;
    pub use crate::registry::ProviderRegistry;
    pub use crate::source::{AnnotationSource, SourceDescriptor};
    pub use crate::sources::{CloudSource, DisabledSource, LocalModelSource, OnDeviceSource};
    pub use smsguard_core::prelude::*;
}
