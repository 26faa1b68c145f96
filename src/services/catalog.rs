//! Catalog Service
//!
//! Thin validation layer over the product store.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::{NewProduct, Product, ProductChanges, ProductFilter};
use crate::database::store::{ProductStore, StoreError, constraints};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Validation(String),
    #[error("Product not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CatalogError {
    fn from_store(err: StoreError) -> Self {
        if err.is_unique_violation(constraints::PRODUCTS_NAME) {
            return CatalogError::Conflict("A product with this name already exists".to_string());
        }
        if let StoreError::ForeignKeyViolation { .. } = err {
            return CatalogError::Conflict("Product is referenced by existing orders".to_string());
        }
        CatalogError::Store(err)
    }
}

/// One page of the catalog
#[derive(Debug)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

fn validate_price(price: Decimal) -> Result<(), CatalogError> {
    if price < Decimal::ZERO || price.normalize().scale() > 2 || price >= Decimal::from(10_000_000_000i64) {
        return Err(CatalogError::Validation(
            "Price must be a non-negative amount with at most 2 decimal places".to_string(),
        ));
    }
    Ok(())
}

fn validate_stock(stock: i32) -> Result<(), CatalogError> {
    if stock < 0 {
        return Err(CatalogError::Validation("Stock cannot be negative".to_string()));
    }
    Ok(())
}

fn non_blank(field: &Option<String>, message: &str) -> Result<(), CatalogError> {
    match field {
        Some(value) if value.trim().is_empty() => Err(CatalogError::Validation(message.to_string())),
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct CatalogService {
    products: Arc<dyn ProductStore>,
}

impl CatalogService {
    pub fn new(products: Arc<dyn ProductStore>) -> Self {
        Self { products }
    }

    /// Active products, newest first. `page` starts at 1.
    pub async fn list(
        &self,
        page: Option<i64>,
        limit: Option<i64>,
        category: Option<String>,
    ) -> Result<ProductPage, CatalogError> {
        let filter = ProductFilter {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            category: category.filter(|c| !c.trim().is_empty()),
        };
        let (products, total) = self.products.list_products(&filter).await?;
        Ok(ProductPage {
            products,
            total,
            page: filter.page,
            limit: filter.limit,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Product, CatalogError> {
        self.products.find_product(id).await?.ok_or(CatalogError::NotFound)
    }

    pub async fn create(&self, mut product: NewProduct) -> Result<Product, CatalogError> {
        product.name = product.name.trim().to_string();
        product.category = product.category.trim().to_string();
        if product.name.is_empty() || product.category.is_empty() {
            return Err(CatalogError::Validation(
                "Name, price, stock, and category are required".to_string(),
            ));
        }
        validate_price(product.price)?;
        validate_stock(product.stock)?;

        let product = self
            .products
            .insert_product(&product)
            .await
            .map_err(CatalogError::from_store)?;
        tracing::info!(product_id = %product.id, name = %product.name, "Product created");
        Ok(product)
    }

    pub async fn update(&self, id: Uuid, changes: ProductChanges) -> Result<Product, CatalogError> {
        if changes.is_empty() {
            return Err(CatalogError::Validation("No fields to update".to_string()));
        }
        non_blank(&changes.name, "Name cannot be empty")?;
        non_blank(&changes.category, "Category cannot be empty")?;
        if let Some(price) = changes.price {
            validate_price(price)?;
        }
        if let Some(stock) = changes.stock {
            validate_stock(stock)?;
        }

        self.products
            .update_product(id, &changes)
            .await
            .map_err(CatalogError::from_store)?
            .ok_or(CatalogError::NotFound)
    }

    pub async fn set_image(&self, id: Uuid, image_url: String) -> Result<Product, CatalogError> {
        let changes = ProductChanges {
            image_url: Some(image_url),
            ..ProductChanges::default()
        };
        self.products
            .update_product(id, &changes)
            .await?
            .ok_or(CatalogError::NotFound)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), CatalogError> {
        let deleted = self
            .products
            .delete_product(id)
            .await
            .map_err(CatalogError::from_store)?;
        if !deleted {
            return Err(CatalogError::NotFound);
        }
        tracing::info!(product_id = %id, "Product deleted");
        Ok(())
    }
}
