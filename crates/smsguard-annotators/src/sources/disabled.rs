//! No-op annotation source

use super::DISABLED_ID;
use crate::source::{AnnotationSource, SourceDescriptor};
use smsguard_core::{AnnotationSpan, Result};

/// Source that never detects anything.
///
/// Only reachable through explicit selection; AUTO mode never picks it.
pub struct DisabledSource {
    descriptor: SourceDescriptor,
}

impl DisabledSource {
    pub fn new() -> Self {
        Self {
            descriptor: SourceDescriptor::new(DISABLED_ID, i32::MAX).manual_only(),
        }
    }
}

impl Default for DisabledSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AnnotationSource for DisabledSource {
    async fn annotate(&self, _text: &str) -> Result<Vec<AnnotationSpan>> {
        Ok(Vec::new())
    }

    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }
}
