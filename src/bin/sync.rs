use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use promofeed::catalog_store::{ProductStore, TableName};
use promofeed::embedder::OpenAiEmbedder;
use promofeed::soap::{SoapClient, SoapCredentials};
use promofeed::supplier::Supplier;
use promofeed::sync::CatalogSyncEngine;
use promofeed::vector_store::QdrantStore;
use tokio_postgres::NoTls;

#[derive(Parser, Debug)]
#[command(
    name = "promofeed-sync",
    about = "Pulls one supplier catalog into Postgres and Qdrant"
)]
struct SyncCli {
    /// Supplier catalog to sync.
    #[arg(long, value_enum)]
    supplier: Supplier,

    /// Supplier ProductData SOAP endpoint URL.
    #[arg(long, env = "PROMOFEED_SOAP_URL")]
    soap_url: String,

    /// Supplier account id.
    #[arg(long, env = "PROMOFEED_SOAP_ID")]
    soap_id: String,

    /// Supplier account password.
    #[arg(long, env = "PROMOFEED_SOAP_PASSWORD")]
    soap_password: String,

    /// Seconds before SOAP requests time out.
    #[arg(long, env = "PROMOFEED_SOAP_TIMEOUT_SECS", default_value_t = 60)]
    soap_timeout_secs: u64,

    /// Postgres connection string (postgres://...).
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Schema for the products table.
    #[arg(long, env = "PROMOFEED_SCHEMA", default_value = "public")]
    schema: String,

    /// Table storing normalized products.
    #[arg(long, env = "PROMOFEED_TABLE", default_value = "products")]
    table: String,

    /// Qdrant cluster URL.
    #[arg(long, env = "QDRANT_URL")]
    qdrant_url: String,

    /// Optional Qdrant API key.
    #[arg(long, env = "QDRANT_API_KEY")]
    qdrant_api_key: Option<String>,

    /// Qdrant collection holding product points.
    #[arg(long, env = "PROMOFEED_COLLECTION", default_value = "products")]
    collection: String,

    /// Seconds before Qdrant requests time out.
    #[arg(long, env = "PROMOFEED_QDRANT_TIMEOUT_SECS", default_value_t = 30)]
    qdrant_timeout_secs: u64,

    /// OpenAI API key used for product embeddings.
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: String,

    /// Embedding model identifier.
    #[arg(
        long,
        env = "PROMOFEED_OPENAI_MODEL",
        default_value = "text-embedding-3-small"
    )]
    openai_model: String,

    /// Embedding dimension; must match the Qdrant collection.
    #[arg(long, env = "PROMOFEED_OPENAI_DIMENSIONS", default_value_t = 1536)]
    openai_dimensions: usize,

    /// Base URL for OpenAI-compatible endpoints.
    #[arg(
        long,
        env = "PROMOFEED_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    openai_base_url: String,

    /// Seconds before OpenAI requests time out.
    #[arg(long, env = "PROMOFEED_OPENAI_TIMEOUT_SECS", default_value_t = 30)]
    openai_timeout_secs: u64,

    /// Retry attempts for transient embedding errors.
    #[arg(long, env = "PROMOFEED_OPENAI_MAX_RETRIES", default_value_t = 5)]
    max_retries: usize,

    /// Milliseconds to pause between products that hit the network.
    #[arg(long, default_value_t = 500)]
    pacing_ms: u64,

    /// Skip table and collection creation at startup.
    #[arg(long, default_value_t = false)]
    skip_prepare: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SyncCli::parse();
    let profile = cli.supplier.profile();

    let catalog = SoapClient::new(
        cli.soap_url,
        profile,
        SoapCredentials {
            id: cli.soap_id,
            password: cli.soap_password,
        },
        Duration::from_secs(cli.soap_timeout_secs.max(1)),
    )?;

    let (client, connection) = tokio_postgres::connect(&cli.database_url, NoTls)
        .await
        .context("failed to connect to Postgres")?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            eprintln!("postgres connection error: {err}");
        }
    });
    let table = TableName::new(cli.schema, cli.table)?;
    let records = ProductStore::new(client, table);

    let vectors = QdrantStore::new(
        cli.qdrant_url,
        cli.qdrant_api_key,
        cli.collection,
        Duration::from_secs(cli.qdrant_timeout_secs.max(1)),
    )?;

    let embedder = Arc::new(OpenAiEmbedder::new(
        cli.openai_api_key,
        cli.openai_base_url,
        cli.openai_model,
        cli.openai_dimensions,
        Duration::from_secs(cli.openai_timeout_secs.max(1)),
        cli.max_retries.max(1),
    )?);

    if !cli.skip_prepare {
        records.ensure_table().await?;
        vectors.ensure_collection(cli.openai_dimensions).await?;
    }

    let engine = CatalogSyncEngine::new(
        catalog,
        records,
        vectors,
        embedder,
        profile,
        Duration::from_millis(cli.pacing_ms),
    );
    let report = engine.sync().await?;
    println!("{}: {}", profile.supplier.label(), report.summary());
    Ok(())
}
