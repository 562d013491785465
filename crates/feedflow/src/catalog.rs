//! Catalog upsert collaborator: applies validated feed items to the
//! `product` table. Matches by SKU when one is present, falling back to a
//! case- and whitespace-insensitive name match, and reports per-item errors
//! without aborting the batch.

use crate::feed::FeedItem;
use sqlx::{Sqlite, SqlitePool, Transaction};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub sku: Option<String>,
    pub name: String,
    pub price_cents: i64,
    pub stock: i64,
    pub active: i64,
    pub submitter_id: Option<i64>,
}

#[derive(Clone)]
pub struct CatalogRepo {
    pool: SqlitePool,
}

impl CatalogRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply a validated batch inside one transaction. Returns the number of
    /// items applied and one message per item that could not be applied.
    pub async fn upsert_batch(
        &self,
        items: &[FeedItem],
        submitter_id: i64,
    ) -> anyhow::Result<(u64, Vec<String>)> {
        let mut tx = self.pool.begin().await?;

        let mut applied = 0u64;
        let mut errors = Vec::new();

        for (idx, item) in items.iter().enumerate() {
            match upsert_one(&mut tx, item, submitter_id).await {
                Ok(()) => applied += 1,
                Err(e) => errors.push(format!("Item {idx} error: {e}")),
            }
        }

        tx.commit().await?;
        Ok((applied, errors))
    }

    pub async fn get_by_name(&self, name: &str) -> anyhow::Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM product WHERE lower(trim(name)) = lower(trim(?1))",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    pub async fn count(&self) -> anyhow::Result<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM product")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

async fn upsert_one(
    tx: &mut Transaction<'_, Sqlite>,
    item: &FeedItem,
    submitter_id: i64,
) -> anyhow::Result<()> {
    let mut product_id: Option<i64> = None;

    if !item.sku.is_empty() {
        product_id = sqlx::query_scalar::<_, i64>("SELECT id FROM product WHERE sku = ?1")
            .bind(&item.sku)
            .fetch_optional(&mut **tx)
            .await?;
    }

    if product_id.is_none() {
        product_id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM product WHERE lower(trim(name)) = lower(trim(?1))",
        )
        .bind(&item.name)
        .fetch_optional(&mut **tx)
        .await?;
    }

    match product_id {
        Some(id) => {
            sqlx::query(
                "UPDATE product SET price_cents = ?1, stock = ?2, active = 1 WHERE id = ?3",
            )
            .bind(item.price_cents)
            .bind(item.stock)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        }
        None => {
            let sku = if item.sku.is_empty() {
                None
            } else {
                Some(item.sku.as_str())
            };
            sqlx::query(
                r#"
                INSERT INTO product (sku, name, price_cents, stock, active, submitter_id)
                VALUES (?1, ?2, ?3, ?4, 1, ?5)
                "#,
            )
            .bind(sku)
            .bind(&item.name)
            .bind(item.price_cents)
            .bind(item.stock)
            .bind(submitter_id)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}
