//! OpenAI-compatible embedding client.
//!
//! Blocking by design; async callers wrap calls in `spawn_blocking`. Catalog
//! and query embeddings must come from the same model and configuration or
//! the similarity space falls apart, so both pipelines share this one client
//! type.

use std::fmt;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Capability seam for producing a fixed-length embedding from text.
pub trait EmbedText: Send + Sync {
    /// Embeds one text into a fixed-dimension vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Blocking embeddings client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    max_retries: usize,
}

impl fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl OpenAiEmbedder {
    /// Builds a new embeddings client.
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        dimensions: usize,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");
        anyhow::ensure!(dimensions > 0, "embedding dimension must be positive");
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build embedding HTTP client")?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model,
            dimensions,
            max_retries: max_retries.max(1),
        })
    }

    /// Configured embedding dimension.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn request_once(&self, text: &str) -> std::result::Result<Vec<f32>, RequestFailure> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.dimensions,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(RequestFailure::from_transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RequestFailure {
                retryable: should_retry(status),
                error: anyhow::anyhow!("embedding request failed ({status}): {body}"),
            });
        }
        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|err| RequestFailure {
                retryable: false,
                error: anyhow::Error::new(err).context("failed to parse embedding response"),
            })?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| RequestFailure {
                retryable: false,
                error: anyhow::anyhow!("embedding response contained no vectors"),
            })?;
        if vector.len() != self.dimensions {
            return Err(RequestFailure {
                retryable: false,
                error: anyhow::anyhow!(
                    "embedding has {} dimensions, expected {}",
                    vector.len(),
                    self.dimensions
                ),
            });
        }
        Ok(vector)
    }
}

impl EmbedText for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 0usize;
        loop {
            match self.request_once(text) {
                Ok(vector) => return Ok(vector),
                Err(failure) if failure.retryable && attempt + 1 < self.max_retries => {
                    attempt += 1;
                    thread::sleep(retry_backoff(attempt));
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }
}

struct RequestFailure {
    retryable: bool,
    error: anyhow::Error,
}

impl RequestFailure {
    fn from_transport(err: reqwest::Error) -> Self {
        let retryable = err.is_timeout() || err.is_connect() || err.is_request() || err.is_body();
        Self {
            retryable,
            error: err.into(),
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped() {
        assert_eq!(retry_backoff(1), Duration::from_millis(1000));
        assert_eq!(retry_backoff(5), retry_backoff(9));
    }

    #[test]
    fn rejects_blank_configuration() {
        assert!(OpenAiEmbedder::new(
            "  ".into(),
            "https://api.openai.com/v1".into(),
            "text-embedding-3-small".into(),
            1536,
            Duration::from_secs(30),
            3,
        )
        .is_err());
    }
}
