//! Cloud model annotation source
//!
//! Wraps the remote annotation API. Transport errors, 429 and 5xx
//! responses are retried inside the source with linear backoff; the
//! orchestrator's timeout still bounds the whole exchange.

use super::CLOUD_ID;
use crate::source::{AnnotationSource, SourceDescriptor};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use smsguard_core::{AnnotationSpan, EntityType, Error, Result, SpanConverter};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Connection settings for the remote annotation API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSourceConfig {
    /// Full URL of the annotate endpoint
    pub endpoint: String,

    /// Bearer token, if the API requires one
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Retries after the first attempt on transport errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff step between retries
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Per-HTTP-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl CloudSourceConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Serialize)]
struct RemoteRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct RemoteResponse {
    #[serde(default)]
    entities: Vec<RemoteEntity>,
}

/// Entity as returned by the API (character offsets)
#[derive(Debug, Deserialize)]
struct RemoteEntity {
    start: usize,
    end: usize,
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(default)]
    confidence: Option<f32>,
}

enum RemoteError {
    Retryable(String),
    Fatal(String),
}

/// Annotation source backed by the remote annotation API
pub struct CloudSource {
    descriptor: SourceDescriptor,
    client: reqwest::Client,
    config: CloudSourceConfig,
}

impl CloudSource {
    /// Create a new cloud source
    pub fn new(config: CloudSourceConfig, default_priority: i32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            descriptor: SourceDescriptor::new(CLOUD_ID, default_priority).with_network(),
            client,
            config,
        })
    }

    async fn send_with_retry(&self, text: &str) -> Result<RemoteResponse> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(text).await {
                Ok(response) => return Ok(response),
                Err(RemoteError::Retryable(reason)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    debug!(attempt, %reason, "retrying remote annotation request");
                    let backoff = self.config.retry_backoff_ms * u64::from(attempt);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(RemoteError::Retryable(reason)) | Err(RemoteError::Fatal(reason)) => {
                    return Err(Error::provider(CLOUD_ID, reason));
                }
            }
        }
    }

    async fn send_once(&self, text: &str) -> std::result::Result<RemoteResponse, RemoteError> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&RemoteRequest { text });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() || e.is_request() {
                RemoteError::Retryable(format!("transport error: {}", e))
            } else {
                RemoteError::Fatal(format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RemoteError::Retryable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(RemoteError::Fatal(format!("HTTP {}", status)));
        }

        response
            .json::<RemoteResponse>()
            .await
            .map_err(|e| RemoteError::Fatal(format!("invalid response body: {}", e)))
    }
}

#[async_trait::async_trait]
impl AnnotationSource for CloudSource {
    async fn annotate(&self, text: &str) -> Result<Vec<AnnotationSpan>> {
        let start = Instant::now();
        let response = self.send_with_retry(text).await?;

        let conv = SpanConverter::new(text);
        let mut spans = Vec::with_capacity(response.entities.len());
        for entity in response.entities {
            let entity_type = EntityType::from_label(&entity.entity_type);
            match conv.span_from_chars(entity.start, entity.end, entity_type, self.source_id()) {
                Some(span) => spans.push(match entity.confidence {
                    Some(confidence) => span.with_confidence(confidence),
                    None => span,
                }),
                None => warn!(
                    start = entity.start,
                    end = entity.end,
                    label = %entity.entity_type,
                    "remote API returned an out-of-range entity"
                ),
            }
        }

        debug!(
            spans = spans.len(),
            latency_us = start.elapsed().as_micros() as u64,
            "remote annotation complete"
        );

        Ok(spans)
    }

    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_request_timeout_ms() -> u64 {
    10_000
}
