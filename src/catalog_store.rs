//! Postgres-backed product store: the authoritative side of the pipeline.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_postgres::types::Json;
use tokio_postgres::{Client, Row};

use crate::normalizer::ProductRecord;

/// Capability seam over the relational store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Whether a product row already exists for this id.
    async fn exists(&self, product_id: &str) -> Result<bool>;

    /// Inserts or fully replaces the row keyed by `product_id`.
    async fn upsert(&self, record: &ProductRecord) -> Result<()>;

    /// Batch lookup; the returned map only contains ids that resolved.
    async fn select_by_ids(&self, ids: &[String]) -> Result<HashMap<String, ProductRecord>>;
}

/// Fully-qualified Postgres table name (schema + table).
#[derive(Debug, Clone)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    /// Builds a new table identifier.
    pub fn new<S, T>(schema: S, table: T) -> Result<Self>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let schema = schema.into();
        let table = table.into();
        anyhow::ensure!(!schema.trim().is_empty(), "schema name is required");
        anyhow::ensure!(!table.trim().is_empty(), "table name is required");
        Ok(Self { schema, table })
    }

    /// Fully-qualified table reference with quoted identifiers.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

fn quote_ident(input: &str) -> String {
    let escaped = input.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

/// Product rows keyed by `product_id`, with whole-row-replacement upserts.
pub struct ProductStore {
    client: Client,
    table: TableName,
}

impl ProductStore {
    /// Wraps an established Postgres connection.
    pub fn new(client: Client, table: TableName) -> Self {
        Self { client, table }
    }

    /// Creates the products table if it does not exist. Idempotent; called
    /// once at startup.
    pub async fn ensure_table(&self) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                product_id TEXT PRIMARY KEY,
                name TEXT,
                brand TEXT,
                image_url TEXT,
                description TEXT NOT NULL,
                keywords TEXT[] NOT NULL,
                categories TEXT[] NOT NULL,
                colors TEXT[] NOT NULL,
                sizes TEXT[] NOT NULL,
                gtin TEXT,
                flags JSONB NOT NULL
            )",
            self.table.qualified()
        );
        self.client
            .execute(&ddl, &[])
            .await
            .context("failed to create products table")?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for ProductStore {
    async fn exists(&self, product_id: &str) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE product_id = $1 LIMIT 1",
            self.table.qualified()
        );
        let rows = self
            .client
            .query(&sql, &[&product_id])
            .await
            .with_context(|| format!("existence check failed for {product_id}"))?;
        Ok(!rows.is_empty())
    }

    async fn upsert(&self, record: &ProductRecord) -> Result<()> {
        let sql = upsert_sql(&self.table);
        let keywords = &record.keywords;
        let categories: Vec<&str> = record.categories.iter().map(String::as_str).collect();
        let colors: Vec<&str> = record.colors.iter().map(String::as_str).collect();
        let sizes: Vec<&str> = record.sizes.iter().map(String::as_str).collect();
        let flags = Json(&record.flags);
        self.client
            .execute(
                &sql,
                &[
                    &record.product_id,
                    &record.name,
                    &record.brand,
                    &record.image_url,
                    &record.description,
                    keywords,
                    &categories,
                    &colors,
                    &sizes,
                    &record.gtin,
                    &flags,
                ],
            )
            .await
            .with_context(|| format!("failed to upsert product {}", record.product_id))?;
        Ok(())
    }

    async fn select_by_ids(&self, ids: &[String]) -> Result<HashMap<String, ProductRecord>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT product_id, name, brand, image_url, description, \
                    keywords, categories, colors, sizes, gtin, flags \
             FROM {} WHERE product_id = ANY($1)",
            self.table.qualified()
        );
        let rows = self
            .client
            .query(&sql, &[&ids])
            .await
            .context("batch product lookup failed")?;
        let mut records = HashMap::with_capacity(rows.len());
        for row in rows {
            let record = record_from_row(&row)?;
            records.insert(record.product_id.clone(), record);
        }
        Ok(records)
    }
}

fn upsert_sql(table: &TableName) -> String {
    format!(
        "INSERT INTO {} \
            (product_id, name, brand, image_url, description, \
             keywords, categories, colors, sizes, gtin, flags) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
        ON CONFLICT (product_id) DO UPDATE SET \
            name = EXCLUDED.name, \
            brand = EXCLUDED.brand, \
            image_url = EXCLUDED.image_url, \
            description = EXCLUDED.description, \
            keywords = EXCLUDED.keywords, \
            categories = EXCLUDED.categories, \
            colors = EXCLUDED.colors, \
            sizes = EXCLUDED.sizes, \
            gtin = EXCLUDED.gtin, \
            flags = EXCLUDED.flags",
        table.qualified()
    )
}

fn record_from_row(row: &Row) -> Result<ProductRecord> {
    let keywords: Vec<String> = row.get("keywords");
    let categories: Vec<String> = row.get("categories");
    let colors: Vec<String> = row.get("colors");
    let sizes: Vec<String> = row.get("sizes");
    let Json(flags): Json<BTreeMap<String, bool>> = row.get("flags");
    Ok(ProductRecord {
        product_id: row.get("product_id"),
        name: row.get("name"),
        brand: row.get("brand"),
        image_url: row.get("image_url"),
        description: row.get("description"),
        keywords,
        categories: to_set(categories),
        colors: to_set(colors),
        sizes: to_set(sizes),
        gtin: row.get("gtin"),
        flags,
    })
}

fn to_set(values: Vec<String>) -> BTreeSet<String> {
    values.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_quoted() {
        let table = TableName::new("public", "products").unwrap();
        assert_eq!(table.qualified(), "\"public\".\"products\"");
        assert!(TableName::new("  ", "products").is_err());
    }

    #[test]
    fn upsert_replaces_every_column_on_conflict() {
        let table = TableName::new("public", "products").unwrap();
        let sql = upsert_sql(&table);
        assert!(sql.contains("ON CONFLICT (product_id) DO UPDATE SET"));
        for column in [
            "name", "brand", "image_url", "description", "keywords", "categories", "colors",
            "sizes", "gtin", "flags",
        ] {
            assert!(
                sql.contains(&format!("{column} = EXCLUDED.{column}")),
                "missing replacement for {column}"
            );
        }
    }
}
