use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use promofeed::catalog_store::{ProductStore, TableName};
use promofeed::embedder::OpenAiEmbedder;
use promofeed::inventory::{InventoryClient, InventoryLevel};
use promofeed::normalizer::ProductRecord;
use promofeed::retrieval::{RetrievalService, SearchError};
use promofeed::soap::SoapCredentials;
use promofeed::vector_store::QdrantStore;
use serde::{Deserialize, Serialize};
use tokio_postgres::NoTls;

#[derive(Parser, Debug)]
#[command(
    name = "promofeed-api",
    about = "HTTP API for semantic product search and inventory lookups"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "PROMOFEED_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

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

    /// OpenAI API key used for query embeddings.
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

    /// Default top-k when the client does not override it.
    #[arg(long, default_value_t = 10)]
    default_top_k: usize,

    /// Max cached query embeddings kept in-memory (0 disables caching).
    #[arg(long, default_value_t = 1024)]
    embedding_cache_size: usize,

    /// Supplier Inventory SOAP endpoint; lookups are disabled when unset.
    #[arg(long, env = "PROMOFEED_INVENTORY_URL")]
    inventory_url: Option<String>,

    /// Supplier account id for inventory lookups.
    #[arg(long, env = "PROMOFEED_SOAP_ID")]
    soap_id: Option<String>,

    /// Supplier account password for inventory lookups.
    #[arg(long, env = "PROMOFEED_SOAP_PASSWORD")]
    soap_password: Option<String>,

    /// Seconds before inventory requests time out.
    #[arg(long, env = "PROMOFEED_SOAP_TIMEOUT_SECS", default_value_t = 60)]
    soap_timeout_secs: u64,
}

#[derive(Clone)]
struct AppState {
    retrieval: Arc<RetrievalService<ProductStore, QdrantStore, OpenAiEmbedder>>,
    inventory: Option<Arc<InventoryClient>>,
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    excluded_brands: Vec<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    products: Vec<ProductRecord>,
    meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
struct ResponseMeta {
    count: usize,
    latency_ms: f64,
}

#[derive(Debug, Deserialize)]
struct InventoryRequest {
    product_id: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

#[derive(Debug, Serialize)]
struct InventoryResponse {
    product_id: String,
    levels: Vec<InventoryLevel>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ApiCli::parse();

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

    let retrieval = Arc::new(RetrievalService::new(
        records,
        vectors,
        embedder,
        cli.default_top_k,
        cli.embedding_cache_size,
    ));

    let inventory = match (cli.inventory_url, cli.soap_id, cli.soap_password) {
        (Some(url), Some(id), Some(password)) => Some(Arc::new(InventoryClient::new(
            url,
            SoapCredentials { id, password },
            Duration::from_secs(cli.soap_timeout_secs.max(1)),
        )?)),
        (None, _, _) => None,
        _ => anyhow::bail!("inventory lookups need both --soap-id and --soap-password"),
    };

    let state = AppState {
        retrieval,
        inventory,
    };
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/search", post(search_handler))
        .route("/v1/inventory", post(inventory_handler))
        .with_state(state);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    println!("promofeed-api listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn search_handler(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, Json<ErrorBody>)> {
    let start = Instant::now();
    let excluded: HashSet<String> = request.excluded_brands.into_iter().collect();
    let products = state
        .retrieval
        .search(&request.query, &excluded, request.top_k)
        .await
        .map_err(search_error)?;
    let response = SearchResponse {
        meta: ResponseMeta {
            count: products.len(),
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
        },
        products,
    };
    Ok(Json(response))
}

async fn inventory_handler(
    State(state): State<AppState>,
    Json(request): Json<InventoryRequest>,
) -> Result<Json<InventoryResponse>, (StatusCode, Json<ErrorBody>)> {
    if request.product_id.trim().is_empty() {
        return Err(bad_request("product_id must not be empty"));
    }
    let Some(inventory) = &state.inventory else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                message: "inventory lookups are not configured".to_string(),
            }),
        ));
    };
    let levels = inventory
        .check_inventory(
            &request.product_id,
            request.color.as_deref(),
            request.size.as_deref(),
        )
        .await
        .map_err(internal_error)?;
    Ok(Json(InventoryResponse {
        product_id: request.product_id,
        levels,
    }))
}

fn search_error(err: SearchError) -> (StatusCode, Json<ErrorBody>) {
    match err {
        SearchError::EmptyQuery => bad_request("query text must not be empty"),
        SearchError::Internal(err) => internal_error(err),
    }
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

// Backend details stay in the server log; clients get a generic message.
fn internal_error(err: anyhow::Error) -> (StatusCode, Json<ErrorBody>) {
    eprintln!("request failed: {err:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            message: "internal error".to_string(),
        }),
    )
}
