//! Webhook endpoint handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use mailcast_common::types::WebhookId;
use mailcast_core::webhooks::validate_webhook_url;
use mailcast_storage::models::{CreateWebhook, Webhook};
use mailcast_storage::repository::WebhookRepository;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{AppState, AuthContext};
use crate::error::{ApiError, ApiResult, ErrorResponse};

/// A newly registered endpoint with its signing secret.
///
/// The secret is only ever returned here.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedWebhook {
    pub webhook: Webhook,
    pub secret: String,
}

fn repo(state: &AppState) -> WebhookRepository {
    WebhookRepository::new(state.db_pool.pool().clone())
}

/// Random 256-bit signing secret, hex encoded
fn generate_secret() -> String {
    let mut hasher = Sha256::new();
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    hex::encode(hasher.finalize())
}

/// List webhook endpoints
#[utoipa::path(
    get,
    path = "/api/v1/webhooks",
    tag = "webhooks",
    responses((status = 200, description = "Webhook endpoints", body = [Webhook])),
    security(("bearer" = []))
)]
pub async fn list_webhooks(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Webhook>>> {
    Ok(Json(repo(&state).list_for_user(auth.user_id).await?))
}

/// Register a webhook endpoint
#[utoipa::path(
    post,
    path = "/api/v1/webhooks",
    tag = "webhooks",
    request_body = CreateWebhook,
    responses(
        (status = 201, description = "Endpoint registered", body = CreatedWebhook),
        (status = 422, description = "URL rejected", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn create_webhook(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<CreateWebhook>,
) -> ApiResult<(StatusCode, Json<CreatedWebhook>)> {
    validate_webhook_url(&input.url, state.allow_private_webhooks)
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let secret = generate_secret();
    let webhook = repo(&state).create(auth.user_id, input, &secret).await?;

    info!(webhook_id = %webhook.id, url = %webhook.url, "Registered webhook");

    Ok((StatusCode::CREATED, Json(CreatedWebhook { webhook, secret })))
}

/// Delete a webhook endpoint
#[utoipa::path(
    delete,
    path = "/api/v1/webhooks/{id}",
    tag = "webhooks",
    params(("id" = Uuid, Path, description = "Webhook ID")),
    responses((status = 204, description = "Endpoint deleted")),
    security(("bearer" = []))
)]
pub async fn delete_webhook(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<WebhookId>,
) -> ApiResult<StatusCode> {
    if !repo(&state).delete(auth.user_id, id).await? {
        return Err(ApiError::not_found("Webhook"));
    }
    Ok(StatusCode::NO_CONTENT)
}
