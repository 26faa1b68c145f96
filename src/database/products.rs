//! PostgreSQL catalog queries.

use async_trait::async_trait;
use uuid::Uuid;

use crate::database::models::{FromRow, NewProduct, Product, ProductChanges, ProductFilter};
use crate::database::query::UpdateBuilder;
use crate::database::store::{PgStore, ProductStore, StoreResult};

const PRODUCT_COLUMNS: &str =
    "id, name, description, price, stock, category, image_url, is_active, created_at, updated_at";

#[async_trait]
impl ProductStore for PgStore {
    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<(Vec<Product>, i64)> {
        let client = self.client().await?;

        // A NULL category matches every row.
        let rows = client
            .query(
                "SELECT id, name, description, price, stock, category, image_url, is_active, created_at, updated_at
                 FROM products
                 WHERE is_active AND ($1::TEXT IS NULL OR category = $1)
                 ORDER BY created_at DESC, name
                 LIMIT $2 OFFSET $3",
                &[&filter.category, &filter.limit, &filter.offset()],
            )
            .await?;
        let total: i64 = client
            .query_one(
                "SELECT COUNT(*) FROM products WHERE is_active AND ($1::TEXT IS NULL OR category = $1)",
                &[&filter.category],
            )
            .await?
            .try_get(0)?;

        let products = rows.iter().map(Product::from_row).collect::<StoreResult<Vec<_>>>()?;
        Ok((products, total))
    }

    async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, name, description, price, stock, category, image_url, is_active, created_at, updated_at
                 FROM products WHERE id = $1",
                &[&id],
            )
            .await?;
        row.as_ref().map(Product::from_row).transpose()
    }

    async fn insert_product(&self, product: &NewProduct) -> StoreResult<Product> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO products (name, description, price, stock, category, image_url)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id, name, description, price, stock, category, image_url, is_active, created_at, updated_at",
                &[
                    &product.name,
                    &product.description,
                    &product.price,
                    &product.stock,
                    &product.category,
                    &product.image_url,
                ],
            )
            .await?;
        Product::from_row(&row)
    }

    async fn update_product(&self, id: Uuid, changes: &ProductChanges) -> StoreResult<Option<Product>> {
        let mut builder = UpdateBuilder::new("products");
        builder
            .set_opt("name", &changes.name)
            .set_opt("description", &changes.description)
            .set_opt("price", &changes.price)
            .set_opt("stock", &changes.stock)
            .set_opt("category", &changes.category)
            .set_opt("image_url", &changes.image_url)
            .set_opt("is_active", &changes.is_active)
            .set_raw("updated_at", "NOW()");

        let Some(stmt) = builder.build("id", &id, PRODUCT_COLUMNS) else {
            return self.find_product(id).await;
        };

        let client = self.client().await?;
        let row = client.query_opt(&stmt.sql, &stmt.params).await?;
        row.as_ref().map(Product::from_row).transpose()
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<bool> {
        let client = self.client().await?;
        let deleted = client.execute("DELETE FROM products WHERE id = $1", &[&id]).await?;
        Ok(deleted > 0)
    }
}
