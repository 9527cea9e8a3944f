//! Qdrant-backed vector index, spoken over its REST API.
//!
//! No SDK: the wire shapes are small serializable structs and the calls go
//! through a plain HTTP client. The index is a derived, rebuildable copy of
//! the relational store; each point carries the full product record as
//! payload.

use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::normalizer::ProductRecord;

/// One similarity hit returned by the index, in rank order.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Point id as stored in the index.
    pub id: String,
    /// Similarity score reported by the index.
    pub score: f32,
    /// Denormalized payload stored with the point, when requested.
    pub payload: Option<Value>,
}

impl SearchHit {
    /// The product id for this hit: taken from the payload, falling back to
    /// the point id when the payload lacks one.
    pub fn product_id(&self) -> &str {
        self.payload
            .as_ref()
            .and_then(|payload| payload.get("product_id"))
            .and_then(Value::as_str)
            .unwrap_or(&self.id)
    }
}

/// Capability seam over the vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or replaces the point keyed by `id`.
    async fn upsert_point(&self, id: Uuid, vector: &[f32], payload: &ProductRecord) -> Result<()>;

    /// Nearest-neighbour search returning hits in similarity rank order.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>>;
}

/// REST client for one Qdrant collection.
pub struct QdrantStore {
    http: reqwest::Client,
    base_url: String,
    collection: String,
}

impl fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QdrantStore")
            .field("base_url", &self.base_url)
            .field("collection", &self.collection)
            .finish()
    }
}

impl QdrantStore {
    /// Builds a client for the given cluster URL and collection.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        collection: String,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        anyhow::ensure!(
            base_url.starts_with("http://") || base_url.starts_with("https://"),
            "Qdrant URL must be an http(s) URL"
        );
        anyhow::ensure!(!collection.trim().is_empty(), "missing collection name");
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            headers.insert(
                "api-key",
                HeaderValue::from_str(key).context("invalid Qdrant API key")?,
            );
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Qdrant HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    /// Creates the collection if it does not exist. Idempotent; called once
    /// at startup.
    pub async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        anyhow::ensure!(dimensions > 0, "vector dimension must be positive");
        let url = self.collection_url();
        let probe = self
            .http
            .get(&url)
            .send()
            .await
            .context("failed to probe Qdrant collection")?;
        if probe.status().is_success() {
            return Ok(());
        }
        if probe.status() != StatusCode::NOT_FOUND {
            anyhow::bail!(
                "unexpected status {} probing collection {}",
                probe.status(),
                self.collection
            );
        }

        let body = CreateCollection {
            vectors: VectorParams {
                size: dimensions,
                distance: "Cosine",
            },
        };
        let response = self
            .http
            .put(&url)
            .json(&body)
            .send()
            .await
            .context("failed to create Qdrant collection")?;
        check_status(response, "collection create").await
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn upsert_point(&self, id: Uuid, vector: &[f32], payload: &ProductRecord) -> Result<()> {
        let url = format!("{}/points?wait=true", self.collection_url());
        let body = UpsertPoints {
            points: vec![PointStruct {
                id: id.to_string(),
                vector,
                payload,
            }],
        };
        let response = self
            .http
            .put(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to upsert point {id}"))?;
        check_status(response, "point upsert").await
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let url = format!("{}/points/search", self.collection_url());
        let body = SearchPoints {
            vector,
            limit: limit.max(1),
            with_payload: true,
        };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("similarity search request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("similarity search failed ({status}): {body}");
        }
        let parsed: SearchResponse = response
            .json()
            .await
            .context("failed to parse similarity search response")?;
        Ok(parsed
            .result
            .into_iter()
            .map(|hit| SearchHit {
                id: point_id_string(&hit.id),
                score: hit.score,
                payload: hit.payload,
            })
            .collect())
    }
}

async fn check_status(response: reqwest::Response, action: &str) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    anyhow::bail!("Qdrant {action} failed ({status}): {body}")
}

// Qdrant allows integer or string point ids; normalize both to strings.
fn point_id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: &'static str,
}

#[derive(Serialize)]
struct UpsertPoints<'a> {
    points: Vec<PointStruct<'a>>,
}

#[derive(Serialize)]
struct PointStruct<'a> {
    id: String,
    vector: &'a [f32],
    payload: &'a ProductRecord,
}

#[derive(Serialize)]
struct SearchPoints<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Value>,
}
