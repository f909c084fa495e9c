//! Embedding provider clients.
//!
//! The pipeline consumes embeddings through the [`Embedder`] capability
//! trait; this crate supplies the two implementations used in practice: an
//! HTTP client for an OpenAI-compatible `/embeddings` endpoint, and a
//! deterministic hash-based embedder for tests and offline development
//! (selected via `APP_USE_FAKE_EMBEDDINGS=1`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use cardex_core::traits::Embedder;
use cardex_core::{Error, Result};

pub mod hash;

pub use hash::HashEmbedder;

/// Connection settings for the remote embedding service.
#[derive(Debug, Clone)]
pub struct EmbedConfig {
    pub base_url: String,
    pub model: String,
    pub width: usize,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            model: "bge-base-en".to_string(),
            width: 768,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Client for an OpenAI-compatible embeddings endpoint.
///
/// Retry strategy: HTTP 429, 5xx and network errors are retried with
/// exponential backoff (1s, 2s, 4s, ... capped at 32s); other 4xx responses
/// fail immediately.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbedConfig,
}

impl HttpEmbedder {
    pub fn new(config: EmbedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::other)?;
        Ok(Self { client, config })
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.config.model,
            "input": texts,
        });

        let mut last_err = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(attempt, delay_secs = delay.as_secs(), "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&url).json(&body).send().await;
            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse =
                            response.json().await.map_err(Error::other)?;
                        return collect_rows(parsed, texts.len());
                    }
                    let text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(Error::Transient(format!(
                            "embedding service {}: {}",
                            status, text
                        )));
                        continue;
                    }
                    return Err(Error::Service(format!(
                        "embedding service {}: {}",
                        status, text
                    )));
                }
                Err(e) => {
                    last_err = Some(Error::Transient(format!("embedding request failed: {e}")));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Transient("embedding failed after retries".to_string())))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.config.model
    }

    fn width(&self) -> usize {
        self.config.width
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_embeddings(texts).await
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

/// Order rows by their reported index; services are allowed to answer
/// out of order.
fn collect_rows(mut parsed: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    if parsed.data.len() != expected {
        return Err(Error::Service(format!(
            "embedding service returned {} vectors for {} inputs",
            parsed.data.len(),
            expected
        )));
    }
    parsed.data.sort_by_key(|row| row.index);
    Ok(parsed.data.into_iter().map(|row| row.embedding).collect())
}

/// Build the embedder selected by the environment: the deterministic
/// [`HashEmbedder`] when `APP_USE_FAKE_EMBEDDINGS` is set, the HTTP client
/// otherwise.
pub fn default_embedder(config: EmbedConfig) -> Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake {
        info!(width = config.width, "using deterministic hash embedder");
        return Ok(Arc::new(HashEmbedder::new(config.width)));
    }
    Ok(Arc::new(HttpEmbedder::new(config)?))
}
