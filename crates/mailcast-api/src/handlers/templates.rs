//! Template handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use mailcast_common::types::{BrandId, TemplateId, UserId};
use mailcast_storage::models::{CreateTemplate, Template, UpdateTemplate};
use mailcast_storage::repository::{BrandRepository, TemplateRepository};
use std::sync::Arc;
use tracing::info;

use crate::auth::{AppState, AuthContext};
use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::handlers::Pagination;

fn repo(state: &AppState) -> TemplateRepository {
    TemplateRepository::new(state.db_pool.pool().clone())
}

async fn check_brand(state: &AppState, user_id: UserId, brand_id: Option<BrandId>) -> ApiResult<()> {
    if let Some(id) = brand_id {
        BrandRepository::new(state.db_pool.pool().clone())
            .get_for_user(user_id, id)
            .await?
            .ok_or_else(|| ApiError::validation("Unknown brand_id"))?;
    }
    Ok(())
}

/// List templates, most recently edited first
#[utoipa::path(
    get,
    path = "/api/v1/templates",
    tag = "templates",
    params(Pagination),
    responses((status = 200, description = "Templates", body = [Template])),
    security(("bearer" = []))
)]
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Template>>> {
    let templates = repo(&state)
        .list_for_user(auth.user_id, page.limit(), page.offset())
        .await?;
    Ok(Json(templates))
}

/// Create a template
#[utoipa::path(
    post,
    path = "/api/v1/templates",
    tag = "templates",
    request_body = CreateTemplate,
    responses(
        (status = 201, description = "Template created", body = Template),
        (status = 422, description = "Invalid input", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<CreateTemplate>,
) -> ApiResult<(StatusCode, Json<Template>)> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }
    if input.html_body.is_none() && input.text_body.is_none() {
        return Err(ApiError::validation(
            "At least one of html_body or text_body is required",
        ));
    }
    check_brand(&state, auth.user_id, input.brand_id).await?;

    let template = repo(&state).create(auth.user_id, input).await?;
    info!(template_id = %template.id, "Created template");
    Ok((StatusCode::CREATED, Json(template)))
}

/// Get a template
#[utoipa::path(
    get,
    path = "/api/v1/templates/{id}",
    tag = "templates",
    params(("id" = Uuid, Path, description = "Template ID")),
    responses(
        (status = 200, description = "Template", body = Template),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TemplateId>,
) -> ApiResult<Json<Template>> {
    repo(&state)
        .get_for_user(auth.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Template"))
}

/// Update a template
#[utoipa::path(
    put,
    path = "/api/v1/templates/{id}",
    tag = "templates",
    params(("id" = Uuid, Path, description = "Template ID")),
    request_body = UpdateTemplate,
    responses((status = 200, description = "Template updated", body = Template)),
    security(("bearer" = []))
)]
pub async fn update_template(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TemplateId>,
    Json(input): Json<UpdateTemplate>,
) -> ApiResult<Json<Template>> {
    if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::validation("name cannot be empty"));
    }
    check_brand(&state, auth.user_id, input.brand_id).await?;

    repo(&state)
        .update(auth.user_id, id, input)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Template"))
}

/// Delete a template
#[utoipa::path(
    delete,
    path = "/api/v1/templates/{id}",
    tag = "templates",
    params(("id" = Uuid, Path, description = "Template ID")),
    responses((status = 204, description = "Template deleted")),
    security(("bearer" = []))
)]
pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TemplateId>,
) -> ApiResult<StatusCode> {
    if !repo(&state).delete(auth.user_id, id).await? {
        return Err(ApiError::not_found("Template"));
    }
    Ok(StatusCode::NO_CONTENT)
}
