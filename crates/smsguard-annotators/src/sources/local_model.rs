//! On-device local model (larger tier)
//!
//! The model itself is an external runtime. An [`InferenceBackend`] returns
//! per-token BIO labels with byte offsets; this module decodes those into
//! entity spans. [`ProcessBackend`] drives a model runner executable over
//! stdin/stdout and is what deployments configure. Other runtimes can be
//! plugged in by implementing the trait in another crate.

use super::LOCAL_MODEL_ID;
use crate::source::{AnnotationSource, SourceDescriptor};
use serde::{Deserialize, Serialize};
use smsguard_core::{AnnotationSpan, EntityType, Error, Result, SpanConverter};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// One token-level prediction from a token-classification model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPrediction {
    /// Byte offset of the token start
    pub start: usize,
    /// Byte offset one past the token end
    pub end: usize,
    /// BIO/BIOES label such as `B-PER`, `I-LOC` or `O`
    pub label: String,
    /// Softmax probability of the label
    pub score: f32,
}

/// Pluggable runtime for the local model.
///
/// Implement this trait to run inference with an in-process runtime without
/// coupling this crate to it.
#[async_trait::async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run token classification over `text`
    async fn predict(&self, text: &str) -> Result<Vec<TokenPrediction>>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Annotation source backed by the downloaded local model
pub struct LocalModelSource {
    descriptor: SourceDescriptor,
    backend: Arc<dyn InferenceBackend>,
}

impl LocalModelSource {
    /// Create a new local model source
    pub fn new(backend: Arc<dyn InferenceBackend>, default_priority: i32) -> Self {
        Self {
            descriptor: SourceDescriptor::new(LOCAL_MODEL_ID, default_priority).with_model(),
            backend,
        }
    }
}

#[async_trait::async_trait]
impl AnnotationSource for LocalModelSource {
    async fn annotate(&self, text: &str) -> Result<Vec<AnnotationSpan>> {
        let start = Instant::now();

        let predictions = self
            .backend
            .predict(text)
            .await
            .map_err(|e| match e {
                Error::ProviderFailure { cause, .. } => Error::provider(LOCAL_MODEL_ID, cause),
                other => Error::provider(LOCAL_MODEL_ID, other),
            })?;

        let spans = decode_bio(text, &predictions, self.source_id());

        debug!(
            backend = self.backend.name(),
            tokens = predictions.len(),
            spans = spans.len(),
            latency_us = start.elapsed().as_micros() as u64,
            "local model inference complete"
        );

        Ok(spans)
    }

    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }
}

/// Open entity while decoding
struct OpenEntity {
    entity_type: EntityType,
    start: usize,
    end: usize,
    score_sum: f32,
    tokens: usize,
}

impl OpenEntity {
    fn new(entity_type: EntityType, token: &TokenPrediction) -> Self {
        Self {
            entity_type,
            start: token.start,
            end: token.end,
            score_sum: token.score,
            tokens: 1,
        }
    }

    fn extend(&mut self, token: &TokenPrediction) {
        self.end = token.end;
        self.score_sum += token.score;
        self.tokens += 1;
    }
}

/// Decode BIO/BIOES token labels into spans.
///
/// `I-` following a different type (or nothing) opens a new entity, as in
/// IOB1. Confidence is the mean token score. Tokens with offsets outside the
/// text or off char boundaries are skipped.
pub fn decode_bio(
    text: &str,
    predictions: &[TokenPrediction],
    source_id: &str,
) -> Vec<AnnotationSpan> {
    let conv = SpanConverter::new(text);
    let mut tokens: Vec<&TokenPrediction> = predictions
        .iter()
        .filter(|t| {
            let valid = t.start < t.end
                && t.end <= text.len()
                && text.is_char_boundary(t.start)
                && text.is_char_boundary(t.end);
            if !valid {
                warn!(
                    start = t.start,
                    end = t.end,
                    label = %t.label,
                    "skipping malformed token prediction"
                );
            }
            valid
        })
        .collect();
    tokens.sort_by_key(|t| (t.start, t.end));

    let mut spans = Vec::new();
    let mut open: Option<OpenEntity> = None;

    let close = |entity: Option<OpenEntity>, spans: &mut Vec<AnnotationSpan>| {
        if let Some(e) = entity {
            if let Some(span) = conv.span_from_bytes(e.start, e.end, e.entity_type, source_id) {
                let confidence = (e.score_sum / e.tokens as f32).clamp(0.0, 1.0);
                spans.push(span.with_confidence(confidence));
            }
        }
    };

    for token in tokens {
        let (prefix, entity_type) = parse_label(&token.label);
        let Some(ty) = entity_type else {
            close(open.take(), &mut spans);
            continue;
        };
        let continues = open.as_ref().is_some_and(|e| e.entity_type == ty);

        match prefix {
            'B' => {
                close(open.take(), &mut spans);
                open = Some(OpenEntity::new(ty, token));
            }
            'S' | 'U' => {
                close(open.take(), &mut spans);
                close(Some(OpenEntity::new(ty, token)), &mut spans);
            }
            'E' | 'L' => {
                if continues {
                    if let Some(entity) = open.as_mut() {
                        entity.extend(token);
                    }
                    close(open.take(), &mut spans);
                } else {
                    close(open.take(), &mut spans);
                    close(Some(OpenEntity::new(ty, token)), &mut spans);
                }
            }
            _ => {
                if continues {
                    if let Some(entity) = open.as_mut() {
                        entity.extend(token);
                    }
                } else {
                    close(open.take(), &mut spans);
                    open = Some(OpenEntity::new(ty, token));
                }
            }
        }
    }
    close(open.take(), &mut spans);

    spans
}

fn parse_label(label: &str) -> (char, Option<EntityType>) {
    let label = label.trim();
    if label.is_empty() || label.eq_ignore_ascii_case("O") {
        return ('O', None);
    }
    let mut chars = label.chars();
    let first = chars.next().map(|c| c.to_ascii_uppercase()).unwrap_or('O');
    match chars.next() {
        Some('-') | Some('_') => (first, Some(EntityType::from_label(chars.as_str()))),
        // Bare type labels ("PER") from models without a tagging scheme
        _ => ('I', Some(EntityType::from_label(label))),
    }
}

/// Configuration for a model runner process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessBackendConfig {
    /// Runner executable
    pub command: PathBuf,

    /// Extra arguments placed before the model path
    #[serde(default)]
    pub args: Vec<String>,

    /// Model weights passed as the final argument
    pub model_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RunnerOutput {
    tokens: Vec<TokenPrediction>,
}

/// Inference backend that runs a model runner executable per request.
///
/// The runner receives the message on stdin and prints
/// `{"tokens": [{"start", "end", "label", "score"}, ...]}` on stdout. The
/// child is killed if the request is dropped (timeout or cancellation).
pub struct ProcessBackend {
    config: ProcessBackendConfig,
}

impl ProcessBackend {
    pub fn new(config: ProcessBackendConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl InferenceBackend for ProcessBackend {
    async fn predict(&self, text: &str) -> Result<Vec<TokenPrediction>> {
        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .arg(&self.config.model_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::provider(
                    LOCAL_MODEL_ID,
                    format!("failed to start {}: {}", self.config.command.display(), e),
                )
            })?;

        // The runner may fill stdout/stderr before reading all input, so the
        // pipes are drained while stdin is still being written
        let stdin = child.stdin.take();
        let write_input = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            // A runner that exits early closes its end; its exit status says why
            match stdin.write_all(text.as_bytes()).await {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(Error::provider(
                    LOCAL_MODEL_ID,
                    format!("failed to write input: {}", e),
                )),
                // Dropping stdin closes the pipe so the runner sees EOF
                _ => Ok(()),
            }
        };

        let (written, output) = tokio::join!(write_input, child.wait_with_output());
        written?;
        let output =
            output.map_err(|e| Error::provider(LOCAL_MODEL_ID, format!("runner failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::provider(
                LOCAL_MODEL_ID,
                format!("runner exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let parsed: RunnerOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::provider(LOCAL_MODEL_ID, format!("invalid runner output: {}", e)))?;

        Ok(parsed.tokens)
    }

    fn name(&self) -> &str {
        "process"
    }
}
