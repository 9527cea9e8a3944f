//! Query-side retrieval: embed the query, rank against the vector index,
//! hydrate full records from the relational store.
//!
//! The vector index decides the order; the relational store supplies the
//! content. Hits whose relational row has disappeared are dropped silently,
//! which keeps a lagging index from surfacing stale products.

use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::Context;
use lru::LruCache;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;

use crate::catalog_store::RecordStore;
use crate::embedder::EmbedText;
use crate::normalizer::ProductRecord;
use crate::vector_store::VectorIndex;

/// Errors surfaced by a search call.
#[derive(Debug)]
pub enum SearchError {
    /// The query was empty or whitespace-only.
    EmptyQuery,
    /// An embedding, index, or store call failed.
    Internal(anyhow::Error),
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyQuery => write!(f, "query must not be empty"),
            Self::Internal(err) => write!(f, "search failed: {err}"),
        }
    }
}

impl std::error::Error for SearchError {}

impl From<anyhow::Error> for SearchError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

/// Semantic product search over the paired stores.
pub struct RetrievalService<R, V, E> {
    records: R,
    vectors: V,
    embedder: Arc<E>,
    default_top_k: usize,
    query_cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl<R, V, E> RetrievalService<R, V, E>
where
    R: RecordStore,
    V: VectorIndex,
    E: EmbedText + 'static,
{
    /// Builds the service. `cache_size` of zero disables the query
    /// embedding cache.
    pub fn new(
        records: R,
        vectors: V,
        embedder: Arc<E>,
        default_top_k: usize,
        cache_size: usize,
    ) -> Self {
        let query_cache = NonZeroUsize::new(cache_size).map(|n| Mutex::new(LruCache::new(n)));
        Self {
            records,
            vectors,
            embedder,
            default_top_k: default_top_k.max(1),
            query_cache,
        }
    }

    /// Runs one search: ranked by the index, hydrated from the store,
    /// brand exclusions applied last so they never shrink the candidate set
    /// fed to the index.
    pub async fn search(
        &self,
        query: &str,
        excluded_brands: &HashSet<String>,
        top_k: Option<usize>,
    ) -> Result<Vec<ProductRecord>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let limit = top_k.unwrap_or(self.default_top_k).max(1);

        let vector = self.embed_query(query.to_string()).await?;
        let hits = self.vectors.search(&vector, limit).await?;
        let ordered_ids: Vec<String> = hits
            .iter()
            .map(|hit| hit.product_id().to_string())
            .collect();
        let mut by_id = self.records.select_by_ids(&ordered_ids).await?;

        // Reassemble in index rank order; ids without a relational row
        // drop out here, and duplicates collapse on first use.
        let results = ordered_ids
            .into_iter()
            .filter_map(|id| by_id.remove(&id))
            .filter(|record| {
                record
                    .brand
                    .as_ref()
                    .map_or(true, |brand| !excluded_brands.contains(brand))
            })
            .collect();
        Ok(results)
    }

    async fn embed_query(&self, query: String) -> Result<Vec<f32>, SearchError> {
        if let Some(cache) = &self.query_cache {
            if let Some(vector) = cache.lock().await.get(&query) {
                return Ok(vector.clone());
            }
        }
        let embedder = Arc::clone(&self.embedder);
        let text = query.clone();
        let vector = spawn_blocking(move || embedder.embed(&text))
            .await
            .context("query embedding task join error")?
            .context("failed to embed query")?;
        if let Some(cache) = &self.query_cache {
            cache.lock().await.put(query, vector.clone());
        }
        Ok(vector)
    }
}
