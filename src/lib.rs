//! Core library for the promofeed product-search pipeline.
//!
//! Supplier catalogs are pulled over PromoStandards SOAP, normalized into a
//! common product record, persisted to Postgres, embedded, and indexed in
//! Qdrant for semantic search. The `promofeed-sync` binary drives ingestion;
//! `promofeed-api` serves search and inventory lookups.

#![warn(missing_docs)]

pub mod catalog_store;
pub mod embedder;
pub mod identity;
pub mod inventory;
pub mod normalizer;
pub mod retrieval;
pub mod soap;
pub mod supplier;
pub mod sync;
pub mod vector_store;

pub use catalog_store::{ProductStore, RecordStore, TableName};
pub use embedder::{EmbedText, OpenAiEmbedder};
pub use identity::point_id;
pub use inventory::{InventoryClient, InventoryLevel};
pub use normalizer::{normalize, NormalizeError, ProductRecord};
pub use retrieval::{RetrievalService, SearchError};
pub use soap::{ProductCatalog, SoapClient, SoapCredentials};
pub use supplier::{Supplier, SupplierProfile};
pub use sync::{CatalogSyncEngine, SyncOutcome, SyncReport};
pub use vector_store::{QdrantStore, SearchHit, VectorIndex};
