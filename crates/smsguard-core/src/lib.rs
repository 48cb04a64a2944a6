//! SMSGuard Core
//!
//! Core types shared across SMSGuard components.
//!
//! This crate provides:
//! - The annotation span model and entity types
//! - The `AnnotationResult` returned to callers, with provider failure records
//! - Error types and result handling
//! - Character/byte offset conversion for span construction

pub mod error;
pub mod offset;
pub mod types;

pub use error::{Error, Result};
pub use offset::SpanConverter;
pub use types::{
    AnnotationResult, AnnotationSpan, EntityType, FailureKind, Outcome, ProviderFailureRecord,
    SpanDefect,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::offset::SpanConverter;
    pub use crate::types::{AnnotationResult, AnnotationSpan, EntityType, Outcome};
}
