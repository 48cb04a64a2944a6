//! Selection policy: which sources to try, in which order.

use crate::environment::{Connectivity, ModelLifecycle};
use crate::registry::ProviderRegistry;
use crate::source::{AnnotationSource, SourceDescriptor};
use serde::{Deserialize, Serialize};
use smsguard_core::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// User-configured provider mode
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProviderMode {
    /// Every ready source, best first
    #[default]
    Auto,
    /// Exactly one named source
    Explicit(String),
    /// No annotation
    Off,
}

impl FromStr for ProviderMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Err(Error::config("provider mode must not be empty")),
            m if m.eq_ignore_ascii_case("auto") => Ok(Self::Auto),
            m if m.eq_ignore_ascii_case("off") => Ok(Self::Off),
            id => Ok(Self::Explicit(id.to_string())),
        }
    }
}

impl TryFrom<String> for ProviderMode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ProviderMode> for String {
    fn from(mode: ProviderMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Off => f.write_str("off"),
            Self::Explicit(id) => f.write_str(id),
        }
    }
}

/// How `default_priority` numbers rank sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityOrder {
    /// Lower number is tried first and wins merge conflicts
    #[default]
    LowerFirst,
    /// Higher number is tried first and wins merge conflicts
    HigherFirst,
}

impl PriorityOrder {
    /// Sort key for a priority; smaller keys rank higher
    pub fn rank(&self, priority: i32) -> i64 {
        match self {
            Self::LowerFirst => i64::from(priority),
            Self::HigherFirst => -i64::from(priority),
        }
    }
}

/// Why a source cannot be selected right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Registry flag is off (disabled or not installed)
    Unavailable,
    NetworkUnavailable,
    ModelNotReady,
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Ready => "ready",
            Self::Unavailable => "not available",
            Self::NetworkUnavailable => "network unavailable",
            Self::ModelNotReady => "model not downloaded",
        };
        f.write_str(msg)
    }
}

/// A source chosen for one request, with its merge precedence
#[derive(Clone)]
pub struct Candidate {
    pub source: Arc<dyn AnnotationSource>,
    /// Smaller ranks are tried first and win merge conflicts
    pub rank: i64,
}

impl Candidate {
    pub fn source_id(&self) -> &str {
        self.source.source_id()
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("source_id", &self.source_id())
            .field("rank", &self.rank)
            .finish()
    }
}

/// Picks the ordered candidate list for a request
pub struct SelectionPolicy {
    registry: Arc<ProviderRegistry>,
    models: Arc<dyn ModelLifecycle>,
    connectivity: Arc<dyn Connectivity>,
    order: PriorityOrder,
}

impl SelectionPolicy {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        models: Arc<dyn ModelLifecycle>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            registry,
            models,
            connectivity,
            order: PriorityOrder::default(),
        }
    }

    /// Set the priority convention
    pub fn with_priority_order(mut self, order: PriorityOrder) -> Self {
        self.order = order;
        self
    }

    pub fn priority_order(&self) -> PriorityOrder {
        self.order
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Readiness of a registered source, or `None` if unknown
    pub fn readiness(&self, source_id: &str) -> Option<Readiness> {
        let entry = self.registry.get(source_id)?;
        Some(self.check(entry.descriptor(), entry.is_available()))
    }

    fn check(&self, descriptor: &SourceDescriptor, available: bool) -> Readiness {
        if !available {
            Readiness::Unavailable
        } else if descriptor.requires_network && !self.connectivity.is_network_available() {
            Readiness::NetworkUnavailable
        } else if descriptor.requires_model && !self.models.is_model_ready(&descriptor.source_id)
        {
            Readiness::ModelNotReady
        } else {
            Readiness::Ready
        }
    }

    /// Ordered candidates for `mode`.
    ///
    /// Explicit selection of an unknown or unready source is a
    /// `ConfigurationError`; no other source is substituted.
    pub fn select(&self, mode: &ProviderMode) -> Result<Vec<Candidate>> {
        match mode {
            ProviderMode::Off => Ok(Vec::new()),
            ProviderMode::Explicit(source_id) => {
                let entry = self.registry.get(source_id).ok_or_else(|| {
                    Error::config(format!("Annotation source '{}' is not registered", source_id))
                })?;
                match self.check(entry.descriptor(), entry.is_available()) {
                    Readiness::Ready => Ok(vec![Candidate {
                        source: Arc::clone(entry.source()),
                        rank: self.order.rank(entry.descriptor().default_priority),
                    }]),
                    not_ready => Err(Error::config(format!(
                        "Annotation source '{}' is selected but {}",
                        source_id, not_ready
                    ))),
                }
            }
            ProviderMode::Auto => {
                let mut candidates: Vec<Candidate> = self
                    .registry
                    .entries()
                    .filter(|e| e.descriptor().auto_select)
                    .filter(|e| {
                        let readiness = self.check(e.descriptor(), e.is_available());
                        if readiness != Readiness::Ready {
                            debug!(source = %e.descriptor().source_id, %readiness, "skipping source");
                        }
                        readiness == Readiness::Ready
                    })
                    .map(|e| Candidate {
                        source: Arc::clone(e.source()),
                        rank: self.order.rank(e.descriptor().default_priority),
                    })
                    .collect();

                candidates.sort_by(|a, b| {
                    a.rank
                        .cmp(&b.rank)
                        .then_with(|| a.source_id().cmp(b.source_id()))
                });
                Ok(candidates)
            }
        }
    }

    /// Reject a mode that `select` could not honour right now
    pub fn validate_mode(&self, mode: &ProviderMode) -> Result<()> {
        self.select(mode).map(|_| ())
    }
}
