//! Embedding backends and vector helpers.
//!
//! `OpenAiEmbedder` is the production backend. `HashEmbedder` is a
//! deterministic local fallback so the engine stays usable (and testable)
//! without network access; its vectors only capture token overlap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::collaborators::Embedder;
use crate::error::CollaboratorError;

pub const DEFAULT_DIMENSION: usize = 384;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_ATTEMPTS: usize = 3;

// =============================================================================
// Local hashing backend
// =============================================================================

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        Ok(hash_embed(text, self.dimension))
    }
}

/// Signed feature hashing of lowercase alphanumeric tokens. Buckets come from
/// SHA-256 so stored vectors stay comparable across builds.
pub fn hash_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut vec = vec![0.0_f32; dimension];
    let mut seen = 0usize;

    for token in text.split(|c: char| !c.is_alphanumeric()) {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            continue;
        }
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let hash = u64::from_le_bytes(head);
        let idx = (hash % dimension as u64) as usize;
        let sign = if (hash & 1) == 0 { 1.0 } else { -1.0 };
        vec[idx] += sign;
        seen += 1;
    }

    if seen == 0 {
        return vec;
    }

    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vec {
            *value /= norm;
        }
    }

    vec
}

// =============================================================================
// OpenAI embeddings API
// =============================================================================

/// Async client for OpenAI-compatible `/embeddings` endpoints. Retries 429 and
/// 5xx responses with exponential backoff.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: Option<String>, timeout: Duration) -> Result<Self, String> {
        if api_key.trim().is_empty() {
            return Err("missing OpenAI API key".to_string());
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build OpenAI HTTP client: {}", e))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", OPENAI_BASE_URL),
            api_key: api_key.trim().to_string(),
            model: model.unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
        })
    }

    /// Build from `OPENAI_API_KEY`. Returns `None` when the key is not set.
    pub fn from_env(model: Option<String>, timeout: Duration) -> Option<Self> {
        let key = std::env::var("OPENAI_API_KEY").ok()?;
        match Self::new(key, model, timeout) {
            Ok(embedder) => Some(embedder),
            Err(e) => {
                log::warn!("OpenAI embedder unavailable: {}", e);
                None
            }
        }
    }

    fn retry_backoff(attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        Duration::from_millis(500 * (1 << capped))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: [text],
            };
            let result = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await;

            let err = match result {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: EmbeddingResponse = resp.json().await?;
                    return parsed
                        .data
                        .into_iter()
                        .next()
                        .map(|d| d.embedding)
                        .filter(|v| !v.is_empty())
                        .ok_or_else(|| {
                            CollaboratorError::Malformed("embedding response had no vector".into())
                        });
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    CollaboratorError::Api {
                        status: status.as_u16(),
                        message: body,
                    }
                }
                Err(e) => CollaboratorError::from(e),
            };

            attempt += 1;
            if !err.is_retryable() || attempt >= MAX_ATTEMPTS {
                return Err(err);
            }
            log::debug!("Embedding request failed (attempt {}): {}", attempt, err);
            tokio::time::sleep(Self::retry_backoff(attempt)).await;
        }
    }
}

/// OpenAI when `OPENAI_API_KEY` is set, else the local hashing backend.
pub fn embedder_from_env(model: Option<String>, timeout: Duration) -> Arc<dyn Embedder> {
    match OpenAiEmbedder::from_env(model, timeout) {
        Some(openai) => Arc::new(openai),
        None => {
            log::warn!("OPENAI_API_KEY not set, using local hash embeddings");
            Arc::new(HashEmbedder::default())
        }
    }
}

// =============================================================================
// Vector helpers
// =============================================================================

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (va, vb) in a.iter().zip(b.iter()) {
        dot += va * vb;
        norm_a += va * va;
        norm_b += vb * vb;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

pub fn f32_vec_to_blob(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn blob_to_f32_vec(blob: &[u8]) -> Result<Vec<f32>, String> {
    if blob.len() % 4 != 0 {
        return Err("invalid embedding blob length".to_string());
    }

    let mut values = Vec::with_capacity(blob.len() / 4);
    for chunk in blob.chunks_exact(4) {
        values.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(values)
}
