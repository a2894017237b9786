//! Sender address handlers
//!
//! SMTP passwords are write-only: they are accepted on create and never
//! serialized back.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use mailcast_common::types::SenderAddressId;
use mailcast_storage::models::{CreateSenderAddress, SenderAddress};
use mailcast_storage::repository::SenderAddressRepository;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::auth::{AppState, AuthContext};
use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::handlers::is_email_like;

/// Request body for enabling or disabling a sender
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSenderStatus {
    pub is_active: bool,
}

fn repo(state: &AppState) -> SenderAddressRepository {
    SenderAddressRepository::new(state.db_pool.pool().clone())
}

fn validate(input: &CreateSenderAddress) -> ApiResult<()> {
    if !is_email_like(&input.email) {
        return Err(ApiError::validation("A valid email is required"));
    }
    if input.smtp_host.trim().is_empty() {
        return Err(ApiError::validation("smtp_host is required"));
    }
    if !(1..=65535).contains(&input.smtp_port) {
        return Err(ApiError::validation("smtp_port must be between 1 and 65535"));
    }
    Ok(())
}

/// List sender addresses, default first
#[utoipa::path(
    get,
    path = "/api/v1/senders",
    tag = "senders",
    responses((status = 200, description = "Sender addresses", body = [SenderAddress])),
    security(("bearer" = []))
)]
pub async fn list_senders(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<SenderAddress>>> {
    Ok(Json(repo(&state).list_for_user(auth.user_id).await?))
}

/// Register a sender address
#[utoipa::path(
    post,
    path = "/api/v1/senders",
    tag = "senders",
    request_body = CreateSenderAddress,
    responses(
        (status = 201, description = "Sender created", body = SenderAddress),
        (status = 422, description = "Invalid input", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn create_sender(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<CreateSenderAddress>,
) -> ApiResult<(StatusCode, Json<SenderAddress>)> {
    validate(&input)?;

    let sender = repo(&state).create(auth.user_id, input).await?;
    info!(
        sender_id = %sender.id,
        smtp_host = %sender.smtp_host,
        is_default = sender.is_default,
        "Registered sender address"
    );
    Ok((StatusCode::CREATED, Json(sender)))
}

/// Get a sender address
#[utoipa::path(
    get,
    path = "/api/v1/senders/{id}",
    tag = "senders",
    params(("id" = Uuid, Path, description = "Sender address ID")),
    responses(
        (status = 200, description = "Sender address", body = SenderAddress),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_sender(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<SenderAddressId>,
) -> ApiResult<Json<SenderAddress>> {
    repo(&state)
        .get_for_user(auth.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Sender address"))
}

/// Enable or disable a sender address
#[utoipa::path(
    patch,
    path = "/api/v1/senders/{id}",
    tag = "senders",
    params(("id" = Uuid, Path, description = "Sender address ID")),
    request_body = UpdateSenderStatus,
    responses((status = 200, description = "Sender updated", body = SenderAddress)),
    security(("bearer" = []))
)]
pub async fn update_sender_status(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<SenderAddressId>,
    Json(input): Json<UpdateSenderStatus>,
) -> ApiResult<Json<SenderAddress>> {
    let sender = repo(&state)
        .set_active(auth.user_id, id, input.is_active)
        .await?
        .ok_or_else(|| ApiError::not_found("Sender address"))?;

    info!(sender_id = %sender.id, is_active = sender.is_active, "Sender status changed");
    Ok(Json(sender))
}

/// Make a sender the default, clearing the previous one
#[utoipa::path(
    post,
    path = "/api/v1/senders/{id}/default",
    tag = "senders",
    params(("id" = Uuid, Path, description = "Sender address ID")),
    responses((status = 200, description = "Sender is now the default", body = SenderAddress)),
    security(("bearer" = []))
)]
pub async fn set_default_sender(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<SenderAddressId>,
) -> ApiResult<Json<SenderAddress>> {
    repo(&state)
        .set_default(auth.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Sender address"))
}

/// Delete a sender address
#[utoipa::path(
    delete,
    path = "/api/v1/senders/{id}",
    tag = "senders",
    params(("id" = Uuid, Path, description = "Sender address ID")),
    responses((status = 204, description = "Sender deleted")),
    security(("bearer" = []))
)]
pub async fn delete_sender(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<SenderAddressId>,
) -> ApiResult<StatusCode> {
    if !repo(&state).delete(auth.user_id, id).await? {
        return Err(ApiError::not_found("Sender address"));
    }
    Ok(StatusCode::NO_CONTENT)
}
