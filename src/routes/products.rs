//! Catalog routes

use std::path::Path as FsPath;

use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::models::{NewProduct, Product, ProductChanges};
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

const IMAGE_FIELD: &str = "image";
const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<Product>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// `GET /api/products`
pub async fn list_products(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<ProductListResponse>> {
    let Query(query) = query.map_err(|_| ApiError::validation("Invalid query parameters"))?;
    let page = state.catalog.list(query.page, query.limit, query.category).await?;
    Ok(Json(ProductListResponse {
        products: page.products,
        total: page.total,
        page: page.page,
        limit: page.limit,
    }))
}

/// `GET /api/products/{id}`
pub async fn get_product(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Product>> {
    let Path(id) = id?;
    Ok(Json(state.catalog.get(id).await?))
}

/// `POST /api/products`
pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    let Json(payload) = payload?;
    let product = state.catalog.create(payload).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// `PUT /api/products/{id}`
pub async fn update_product(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ProductChanges>, JsonRejection>,
) -> ApiResult<Json<Product>> {
    let Path(id) = id?;
    let Json(changes) = payload?;
    Ok(Json(state.catalog.update(id, changes).await?))
}

/// `DELETE /api/products/{id}`
pub async fn delete_product(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.catalog.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn image_extension(file_name: Option<&str>, content_type: Option<&str>) -> Option<&'static str> {
    let from_name = file_name
        .and_then(|name| FsPath::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let from_type = content_type.and_then(|ct| ct.strip_prefix("image/")).map(str::to_ascii_lowercase);

    from_name
        .or(from_type)
        .and_then(|ext| ALLOWED_EXTENSIONS.iter().find(|allowed| **allowed == ext).copied())
}

/// `POST /api/products/{id}/image`
///
/// Stores the multipart `image` field under the upload directory with a
/// generated name and points the product's `image_url` at it.
pub async fn upload_product_image(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    mut multipart: Multipart,
) -> ApiResult<Json<Product>> {
    let Path(id) = id?;

    // Fail before touching the filesystem.
    state.catalog.get(id).await?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::validation("Invalid multipart body"))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let extension = image_extension(field.file_name(), field.content_type())
            .ok_or_else(|| ApiError::validation("Image must be a jpg, png, webp or gif file"))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|_| ApiError::validation("Invalid multipart body"))?;
        upload = Some((extension, bytes));
        break;
    }

    let Some((extension, bytes)) = upload.filter(|(_, bytes)| !bytes.is_empty()) else {
        return Err(ApiError::validation("Image file is required"));
    };

    let file_name = format!("{}.{}", Uuid::new_v4(), extension);
    let upload_dir = state.upload_path.as_path();
    tokio::fs::create_dir_all(upload_dir).await.map_err(ApiError::internal)?;
    tokio::fs::write(upload_dir.join(&file_name), &bytes)
        .await
        .map_err(ApiError::internal)?;

    tracing::info!(product_id = %id, file = %file_name, size = bytes.len(), "Stored product image");

    let product = state.catalog.set_image(id, format!("/uploads/{file_name}")).await?;
    Ok(Json(product))
}
