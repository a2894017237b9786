//! Brand handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use mailcast_common::types::BrandId;
use mailcast_storage::models::{Brand, CreateBrand, UpdateBrand};
use mailcast_storage::repository::BrandRepository;
use std::sync::Arc;
use tracing::info;

use crate::auth::{AppState, AuthContext};
use crate::error::{ApiError, ApiResult, ErrorResponse};

fn repo(state: &AppState) -> BrandRepository {
    BrandRepository::new(state.db_pool.pool().clone())
}

/// List brands, default first
#[utoipa::path(
    get,
    path = "/api/v1/brands",
    tag = "brands",
    responses((status = 200, description = "Brands", body = [Brand])),
    security(("bearer" = []))
)]
pub async fn list_brands(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Brand>>> {
    Ok(Json(repo(&state).list_for_user(auth.user_id).await?))
}

/// Create a brand
#[utoipa::path(
    post,
    path = "/api/v1/brands",
    tag = "brands",
    request_body = CreateBrand,
    responses(
        (status = 201, description = "Brand created", body = Brand),
        (status = 422, description = "Invalid input", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn create_brand(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<CreateBrand>,
) -> ApiResult<(StatusCode, Json<Brand>)> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }

    let brand = repo(&state).create(auth.user_id, input).await?;
    info!(brand_id = %brand.id, is_default = brand.is_default, "Created brand");
    Ok((StatusCode::CREATED, Json(brand)))
}

/// Get a brand
#[utoipa::path(
    get,
    path = "/api/v1/brands/{id}",
    tag = "brands",
    params(("id" = Uuid, Path, description = "Brand ID")),
    responses(
        (status = 200, description = "Brand", body = Brand),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_brand(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BrandId>,
) -> ApiResult<Json<Brand>> {
    repo(&state)
        .get_for_user(auth.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Brand"))
}

/// Update a brand
#[utoipa::path(
    put,
    path = "/api/v1/brands/{id}",
    tag = "brands",
    params(("id" = Uuid, Path, description = "Brand ID")),
    request_body = UpdateBrand,
    responses((status = 200, description = "Brand updated", body = Brand)),
    security(("bearer" = []))
)]
pub async fn update_brand(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BrandId>,
    Json(input): Json<UpdateBrand>,
) -> ApiResult<Json<Brand>> {
    if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::validation("name cannot be empty"));
    }

    repo(&state)
        .update(auth.user_id, id, input)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Brand"))
}

/// Make a brand the default, clearing the previous one
#[utoipa::path(
    post,
    path = "/api/v1/brands/{id}/default",
    tag = "brands",
    params(("id" = Uuid, Path, description = "Brand ID")),
    responses((status = 200, description = "Brand is now the default", body = Brand)),
    security(("bearer" = []))
)]
pub async fn set_default_brand(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BrandId>,
) -> ApiResult<Json<Brand>> {
    let brand = repo(&state)
        .set_default(auth.user_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Brand"))?;

    info!(brand_id = %brand.id, "Default brand changed");
    Ok(Json(brand))
}

/// Delete a brand
#[utoipa::path(
    delete,
    path = "/api/v1/brands/{id}",
    tag = "brands",
    params(("id" = Uuid, Path, description = "Brand ID")),
    responses((status = 204, description = "Brand deleted")),
    security(("bearer" = []))
)]
pub async fn delete_brand(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BrandId>,
) -> ApiResult<StatusCode> {
    if !repo(&state).delete(auth.user_id, id).await? {
        return Err(ApiError::not_found("Brand"));
    }
    Ok(StatusCode::NO_CONTENT)
}
