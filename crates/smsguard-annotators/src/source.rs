//! Annotation source trait and descriptor

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smsguard_core::{AnnotationSpan, Result};

/// Trait for all annotation providers.
///
/// `annotate` may be called concurrently for different messages and must not
/// write shared state visible to other calls. Failures are reported as
/// `Error::ProviderFailure`, never as an empty success. Implementations may
/// stall; the orchestrator bounds every call with a timeout.
#[async_trait]
pub trait AnnotationSource: Send + Sync {
    /// Detect entities in `text`
    async fn annotate(&self, text: &str) -> Result<Vec<AnnotationSpan>>;

    /// Static metadata for selection and merge precedence
    fn descriptor(&self) -> &SourceDescriptor;

    /// Stable identifier used for provenance and tie-breaks
    fn source_id(&self) -> &str {
        &self.descriptor().source_id
    }
}

/// Static capability metadata of an annotation source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique identifier
    pub source_id: String,

    /// Static ranking; interpreted through `PriorityOrder`
    pub default_priority: i32,

    /// Only selectable while the network is reachable
    #[serde(default)]
    pub requires_network: bool,

    /// Only selectable once the model lifecycle reports the model ready
    #[serde(default)]
    pub requires_model: bool,

    /// Whether AUTO mode may pick this source
    #[serde(default = "default_true")]
    pub auto_select: bool,
}

impl SourceDescriptor {
    /// Create a descriptor for an offline, auto-selectable source
    pub fn new(source_id: impl Into<String>, default_priority: i32) -> Self {
        Self {
            source_id: source_id.into(),
            default_priority,
            requires_network: false,
            requires_model: false,
            auto_select: true,
        }
    }

    /// Mark the source as needing network connectivity
    pub fn with_network(mut self) -> Self {
        self.requires_network = true;
        self
    }

    /// Mark the source as needing a downloaded model
    pub fn with_model(mut self) -> Self {
        self.requires_model = true;
        self
    }

    /// Exclude the source from AUTO selection
    pub fn manual_only(mut self) -> Self {
        self.auto_select = false;
        self
    }
}

fn default_true() -> bool {
    true
}
