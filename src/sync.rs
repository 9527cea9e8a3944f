//! Catalog synchronization engine: list, fetch, normalize, persist, embed,
//! index — one product at a time.
//!
//! Idempotence comes from two layers: the existence check skips products the
//! relational store already holds (no re-fetch, no re-embed), and both store
//! writes are keyed upserts, so a concurrent run racing past the check still
//! converges on a single row and a single point.
//!
//! Ordering caveat: the relational upsert commits before the embedding and
//! vector writes. If either of those fails the product stays relationally
//! present but unindexed, and later passes will skip it as already existing.
//! Recovering such a product requires removing its relational row. This
//! window is deliberate and logged loudly rather than papered over.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::spawn_blocking;
use tokio::time::sleep;

use crate::catalog_store::RecordStore;
use crate::embedder::EmbedText;
use crate::identity::point_id;
use crate::normalizer::{normalize, ProductRecord};
use crate::soap::ProductCatalog;
use crate::supplier::SupplierProfile;
use crate::vector_store::VectorIndex;

/// Why a product was skipped without reaching the stores.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The relational store already holds this product id.
    AlreadyExists,
    /// The supplier returned no usable detail response.
    FetchFailed,
    /// The detail response could not be normalized into a valid record.
    ParseFailed,
}

/// Which stage failed after the relational write had already committed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FailStage {
    /// The embedding call failed.
    Embedding,
    /// The vector upsert failed.
    VectorWrite,
}

/// Outcome of processing one candidate product id.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Written to both stores.
    Upserted,
    /// Nothing written; see the reason.
    Skipped(SkipReason),
    /// Relational row written, vector entry missing; see the stage.
    Failed(FailStage),
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upserted => write!(f, "upserted"),
            Self::Skipped(SkipReason::AlreadyExists) => write!(f, "skipped (already exists)"),
            Self::Skipped(SkipReason::FetchFailed) => write!(f, "skipped (fetch failed)"),
            Self::Skipped(SkipReason::ParseFailed) => write!(f, "skipped (parse failed)"),
            Self::Failed(FailStage::Embedding) => write!(f, "failed (embedding)"),
            Self::Failed(FailStage::VectorWrite) => write!(f, "failed (vector write)"),
        }
    }
}

/// Per-product outcome log for one sync pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    outcomes: Vec<(String, SyncOutcome)>,
}

impl SyncReport {
    /// Records the outcome for one product id.
    pub fn push(&mut self, product_id: String, outcome: SyncOutcome) {
        self.outcomes.push((product_id, outcome));
    }

    /// All recorded outcomes in processing order.
    pub fn outcomes(&self) -> &[(String, SyncOutcome)] {
        &self.outcomes
    }

    /// Number of products written to both stores.
    pub fn upserted(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Upserted))
    }

    /// Number of products skipped before any store write.
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Skipped(_)))
    }

    /// Number of products left relationally present but unindexed.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&SyncOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    /// One-line pass summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} upserted, {} skipped, {} failed ({} candidates)",
            self.upserted(),
            self.skipped(),
            self.failed(),
            self.outcomes.len()
        )
    }
}

/// Builds the text submitted to the embedding model for a product.
///
/// Name, brand, description, comma-joined keywords, and comma-joined
/// categories, space-joined; absent fields contribute empty strings.
pub fn embedding_input(record: &ProductRecord) -> String {
    let keywords = record.keywords.join(", ");
    let categories = record
        .categories
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    [
        record.name.as_deref().unwrap_or(""),
        record.brand.as_deref().unwrap_or(""),
        &record.description,
        &keywords,
        &categories,
    ]
    .join(" ")
}

/// Drives one supplier catalog into the relational and vector stores.
pub struct CatalogSyncEngine<C, R, V, E> {
    catalog: C,
    records: R,
    vectors: V,
    embedder: Arc<E>,
    profile: &'static SupplierProfile,
    pacing: Duration,
}

impl<C, R, V, E> CatalogSyncEngine<C, R, V, E>
where
    C: ProductCatalog,
    R: RecordStore,
    V: VectorIndex,
    E: EmbedText + 'static,
{
    /// Wires the engine to its collaborators.
    ///
    /// `pacing` is an optional politeness delay inserted after each item
    /// that performed network work; it is not a correctness requirement.
    pub fn new(
        catalog: C,
        records: R,
        vectors: V,
        embedder: Arc<E>,
        profile: &'static SupplierProfile,
        pacing: Duration,
    ) -> Self {
        Self {
            catalog,
            records,
            vectors,
            embedder,
            profile,
            pacing,
        }
    }

    /// Runs one sync pass over the supplier's sellable catalog.
    ///
    /// Per-item failures become outcomes; only listing failures and
    /// relational store errors abort the pass.
    pub async fn sync(&self) -> Result<SyncReport> {
        let ids = self
            .catalog
            .list_sellable_ids()
            .await
            .context("failed to list sellable product ids")?;
        eprintln!(
            "{}: found {} unique sellable product ids",
            self.profile.supplier.label(),
            ids.len()
        );

        let mut report = SyncReport::default();
        for id in &ids {
            let outcome = self.sync_one(id).await?;
            eprintln!("{}: {id}: {outcome}", self.profile.supplier.label());
            let worked = !matches!(outcome, SyncOutcome::Skipped(SkipReason::AlreadyExists));
            report.push(id.clone(), outcome);
            if worked && !self.pacing.is_zero() {
                sleep(self.pacing).await;
            }
        }

        eprintln!(
            "{}: sync pass complete: {}",
            self.profile.supplier.label(),
            report.summary()
        );
        Ok(report)
    }

    async fn sync_one(&self, candidate_id: &str) -> Result<SyncOutcome> {
        // Relational store errors propagate: an unreadable or unwritable
        // authoritative store invalidates the whole pass.
        if self.records.exists(candidate_id).await? {
            return Ok(SyncOutcome::Skipped(SkipReason::AlreadyExists));
        }

        let Some(xml) = self.catalog.fetch_detail(candidate_id).await else {
            return Ok(SyncOutcome::Skipped(SkipReason::FetchFailed));
        };

        let record = match normalize(&xml, self.profile) {
            Ok(record) => record,
            Err(err) => {
                eprintln!("normalization failed for {candidate_id}: {err}");
                return Ok(SyncOutcome::Skipped(SkipReason::ParseFailed));
            }
        };

        self.records.upsert(&record).await?;

        let text = embedding_input(&record);
        let embedder = Arc::clone(&self.embedder);
        let embedded = spawn_blocking(move || embedder.embed(&text))
            .await
            .context("embedding task join error")?;
        let vector = match embedded {
            Ok(vector) => vector,
            Err(err) => {
                eprintln!(
                    "embedding failed for {}: {err:#}; row persisted without a vector entry",
                    record.product_id
                );
                return Ok(SyncOutcome::Failed(FailStage::Embedding));
            }
        };

        let key = point_id(&record.product_id);
        if let Err(err) = self.vectors.upsert_point(key, &vector, &record).await {
            eprintln!(
                "vector upsert failed for {}: {err:#}; row persisted without a vector entry",
                record.product_id
            );
            return Ok(SyncOutcome::Failed(FailStage::VectorWrite));
        }

        Ok(SyncOutcome::Upserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supplier::Supplier;
    use crate::vector_store::SearchHit;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    fn detail_fixture(product_id: &str) -> String {
        format!(
            r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/"><S:Body>
<ns2:GetProductResponse
    xmlns:ns2="http://www.promostandards.org/WSDL/ProductDataService/2.0.0/"
    xmlns:def="http://www.promostandards.org/WSDL/ProductDataService/2.0.0/SharedObjects/">
  <ns2:Product>
    <def:productId>{product_id}</def:productId>
    <def:productName>Test Tee</def:productName>
    <def:productBrand>BrandCo</def:productBrand>
    <def:description>A tee.</def:description>
  </ns2:Product>
</ns2:GetProductResponse>
</S:Body></S:Envelope>"#
        )
    }

    struct FakeCatalog {
        ids: HashSet<String>,
        details: HashMap<String, String>,
    }

    impl FakeCatalog {
        fn single(product_id: &str) -> Self {
            Self {
                ids: HashSet::from([product_id.to_string()]),
                details: HashMap::from([(product_id.to_string(), detail_fixture(product_id))]),
            }
        }
    }

    #[async_trait]
    impl ProductCatalog for FakeCatalog {
        async fn list_sellable_ids(&self) -> Result<HashSet<String>> {
            Ok(self.ids.clone())
        }

        async fn fetch_detail(&self, product_id: &str) -> Option<String> {
            self.details.get(product_id).cloned()
        }
    }

    #[derive(Clone, Default)]
    struct MemoryStore {
        rows: Arc<Mutex<HashMap<String, ProductRecord>>>,
    }

    impl MemoryStore {
        fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn exists(&self, product_id: &str) -> Result<bool> {
            Ok(self.rows.lock().unwrap().contains_key(product_id))
        }

        async fn upsert(&self, record: &ProductRecord) -> Result<()> {
            self.rows
                .lock()
                .unwrap()
                .insert(record.product_id.clone(), record.clone());
            Ok(())
        }

        async fn select_by_ids(&self, ids: &[String]) -> Result<HashMap<String, ProductRecord>> {
            let rows = self.rows.lock().unwrap();
            Ok(ids
                .iter()
                .filter_map(|id| rows.get(id).map(|r| (id.clone(), r.clone())))
                .collect())
        }
    }

    #[derive(Clone, Default)]
    struct MemoryIndex {
        points: Arc<Mutex<HashMap<Uuid, Value>>>,
    }

    impl MemoryIndex {
        fn len(&self) -> usize {
            self.points.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl VectorIndex for MemoryIndex {
        async fn upsert_point(
            &self,
            id: Uuid,
            _vector: &[f32],
            payload: &ProductRecord,
        ) -> Result<()> {
            self.points
                .lock()
                .unwrap()
                .insert(id, serde_json::to_value(payload)?);
            Ok(())
        }

        async fn search(&self, _vector: &[f32], _limit: usize) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }
    }

    #[derive(Clone, Default)]
    struct CountingEmbedder {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl EmbedText for CountingEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("embedding backend down");
            }
            Ok(vec![0.25; 8])
        }
    }

    fn engine(
        catalog: FakeCatalog,
        store: MemoryStore,
        index: MemoryIndex,
        embedder: CountingEmbedder,
    ) -> CatalogSyncEngine<FakeCatalog, MemoryStore, MemoryIndex, CountingEmbedder> {
        CatalogSyncEngine::new(
            catalog,
            store,
            index,
            Arc::new(embedder),
            Supplier::SanMar.profile(),
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn first_pass_upserts_into_both_stores() {
        let store = MemoryStore::default();
        let index = MemoryIndex::default();
        let embedder = CountingEmbedder::default();
        let engine = engine(FakeCatalog::single("PC54"), store.clone(), index.clone(), embedder);

        let report = engine.sync().await.unwrap();
        assert_eq!(report.upserted(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn second_pass_is_idempotent() {
        let store = MemoryStore::default();
        let index = MemoryIndex::default();
        let embedder = CountingEmbedder::default();
        let calls = embedder.calls.clone();
        let engine = engine(FakeCatalog::single("PC54"), store.clone(), index.clone(), embedder);

        engine.sync().await.unwrap();
        let second = engine.sync().await.unwrap();

        assert!(second
            .outcomes()
            .iter()
            .all(|(_, o)| *o == SyncOutcome::Skipped(SkipReason::AlreadyExists)));
        assert_eq!(store.len(), 1);
        assert_eq!(index.len(), 1);
        // No re-embedding on the second pass.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_detail_becomes_fetch_failed() {
        let catalog = FakeCatalog {
            ids: HashSet::from(["GHOST".to_string()]),
            details: HashMap::new(),
        };
        let engine = engine(
            catalog,
            MemoryStore::default(),
            MemoryIndex::default(),
            CountingEmbedder::default(),
        );
        let report = engine.sync().await.unwrap();
        assert_eq!(
            report.outcomes()[0].1,
            SyncOutcome::Skipped(SkipReason::FetchFailed)
        );
    }

    #[tokio::test]
    async fn unparseable_detail_becomes_parse_failed() {
        let catalog = FakeCatalog {
            ids: HashSet::from(["BAD".to_string()]),
            details: HashMap::from([(
                "BAD".to_string(),
                // Well-formed, but no productId inside the product element.
                detail_fixture("BAD").replace("<def:productId>BAD</def:productId>", ""),
            )]),
        };
        let store = MemoryStore::default();
        let engine = engine(
            catalog,
            store.clone(),
            MemoryIndex::default(),
            CountingEmbedder::default(),
        );
        let report = engine.sync().await.unwrap();
        assert_eq!(
            report.outcomes()[0].1,
            SyncOutcome::Skipped(SkipReason::ParseFailed)
        );
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn embedding_failure_leaves_row_without_vector_entry() {
        let store = MemoryStore::default();
        let index = MemoryIndex::default();
        let embedder = CountingEmbedder {
            fail: true,
            ..CountingEmbedder::default()
        };
        let engine = engine(FakeCatalog::single("PC54"), store.clone(), index.clone(), embedder);

        let report = engine.sync().await.unwrap();
        assert_eq!(
            report.outcomes()[0].1,
            SyncOutcome::Failed(FailStage::Embedding)
        );
        // Documented inconsistency window: relational row present, no point.
        assert_eq!(store.len(), 1);
        assert_eq!(index.len(), 0);

        // And the next pass skips it as already existing.
        let second = engine.sync().await.unwrap();
        assert_eq!(
            second.outcomes()[0].1,
            SyncOutcome::Skipped(SkipReason::AlreadyExists)
        );
    }

    #[test]
    fn embedding_input_joins_fields_with_spaces() {
        let record = ProductRecord {
            product_id: "PC54".into(),
            name: Some("Core Tee".into()),
            brand: None,
            image_url: None,
            description: "Soft cotton.".into(),
            keywords: vec!["tee".into(), "cotton".into()],
            categories: ["T-Shirts".to_string(), "Tanks".to_string()]
                .into_iter()
                .collect(),
            colors: Default::default(),
            sizes: Default::default(),
            gtin: None,
            flags: Default::default(),
        };
        // Absent brand contributes an empty slot, preserving the join shape.
        assert_eq!(
            embedding_input(&record),
            "Core Tee  Soft cotton. tee, cotton T-Shirts, Tanks"
        );
    }
}
